use crate::{
    cache::Packages,
    error::{BridgeError, BridgeResult},
    package::PackageRecord,
    version::vercmp,
};
use log::debug;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tristate {
    #[default]
    Any,
    Yes,
    No,
}

/// Filters requested by the front-end, e.g. `installed;~free;newest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterSet {
    pub installed: Tristate,
    pub free: Tristate,
    pub newest: bool,
}

impl FilterSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn installed() -> Self {
        Self {
            installed: Tristate::Yes,
            ..Default::default()
        }
    }

    pub fn not_installed() -> Self {
        Self {
            installed: Tristate::No,
            ..Default::default()
        }
    }

    pub fn with_newest(mut self) -> Self {
        self.newest = true;
        self
    }

    pub fn with_free(mut self, free: Tristate) -> Self {
        self.free = free;
        self
    }

    pub fn excludes_installed(&self) -> bool {
        self.installed == Tristate::No
    }

    /// Install state first, then license, then newest, which has to see the
    /// already narrowed candidates.
    pub fn apply<'a>(&self, pkgs: Packages<'a>) -> Packages<'a> {
        let mut pkgs = pkgs;
        match self.installed {
            Tristate::Yes => pkgs = Box::new(pkgs.filter(|p| p.is_installed())),
            Tristate::No => pkgs = Box::new(pkgs.filter(|p| !p.is_installed())),
            Tristate::Any => {}
        }
        match self.free {
            Tristate::Yes => pkgs = Box::new(pkgs.filter(|p| p.is_free())),
            Tristate::No => pkgs = Box::new(pkgs.filter(|p| !p.is_free())),
            Tristate::Any => {}
        }
        if self.newest {
            pkgs = Box::new(newest_only(pkgs).into_iter());
        }
        pkgs
    }
}

impl FromStr for FilterSet {
    type Err = BridgeError;

    fn from_str(s: &str) -> BridgeResult<Self> {
        let mut filters = FilterSet::none();
        for token in s.split(';').map(str::trim).filter(|t| !t.is_empty()) {
            match token {
                "none" => {}
                "installed" => filters.installed = Tristate::Yes,
                "~installed" => filters.installed = Tristate::No,
                "free" => filters.free = Tristate::Yes,
                "~free" => filters.free = Tristate::No,
                "newest" => filters.newest = true,
                "~newest" => filters.newest = false,
                other if other.contains(char::is_whitespace) => {
                    return Err(BridgeError::InvalidInput(format!("bad filter '{}'", other)));
                }
                other => debug!("Ignoring unsupported filter '{}'", other),
            }
        }
        Ok(filters)
    }
}

/// Keeps, per package name, the records carrying the highest version. Ties
/// are all kept; names stay in first-seen order.
pub fn newest_only<'a, I>(pkgs: I) -> Vec<&'a PackageRecord>
where
    I: IntoIterator<Item = &'a PackageRecord>,
{
    let mut order: Vec<&'a str> = Vec::new();
    let mut retained: HashMap<&'a str, Vec<&'a PackageRecord>> = HashMap::new();

    for pkg in pkgs {
        match retained.get_mut(pkg.name.as_str()) {
            None => {
                order.push(pkg.name.as_str());
                retained.insert(pkg.name.as_str(), vec![pkg]);
            }
            Some(kept) => match vercmp(&pkg.version, &kept[0].version) {
                Ordering::Less => {}
                Ordering::Equal => kept.push(pkg),
                Ordering::Greater => {
                    kept.clear();
                    kept.push(pkg);
                }
            },
        }
    }

    order
        .into_iter()
        .flat_map(|name| retained.remove(name).unwrap_or_default())
        .collect()
}
