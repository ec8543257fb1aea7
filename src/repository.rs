use crate::package::{PackageRecord, LOCAL_REPOSITORY};
use log::warn;
use regex::Regex;
use std::collections::HashMap;

/// One package database: the local one or a sync database.
#[derive(Debug, Clone)]
pub struct Repository {
    name: String,
    position: usize,
    packages: Vec<PackageRecord>,
    by_name: HashMap<String, usize>,
}

impl Repository {
    /// Builds a repository from its records. Every record is stamped with the
    /// repository name; a repeated package name keeps the first record.
    pub fn new(name: &str, packages: Vec<PackageRecord>) -> Self {
        let mut kept = Vec::with_capacity(packages.len());
        let mut by_name = HashMap::with_capacity(packages.len());
        for mut pkg in packages {
            if by_name.contains_key(&pkg.name) {
                warn!(
                    "Duplicate entry for {} in repository {}, ignoring {}",
                    pkg.name, name, pkg.version
                );
                continue;
            }
            pkg.repository = name.to_string();
            by_name.insert(pkg.name.clone(), kept.len());
            kept.push(pkg);
        }
        Self {
            name: name.to_string(),
            position: 0,
            packages: kept,
            by_name,
        }
    }

    pub fn local(packages: Vec<PackageRecord>) -> Self {
        Self::new(LOCAL_REPOSITORY, packages)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_local(&self) -> bool {
        self.name == LOCAL_REPOSITORY
    }

    /// Configured traversal position, used to restore order on re-enable.
    pub fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    pub fn packages(&self) -> &[PackageRecord] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.by_name.get(name).map(|&idx| &self.packages[idx])
    }

    /// Members of any of the named groups, in database order.
    pub fn in_groups(&self, groups: Vec<String>) -> impl Iterator<Item = &PackageRecord> + '_ {
        self.packages
            .iter()
            .filter(move |pkg| pkg.groups.iter().any(|g| groups.contains(g)))
    }

    /// Packages whose name or description matches the pattern.
    pub fn search(&self, pattern: Regex) -> impl Iterator<Item = &PackageRecord> + '_ {
        self.packages
            .iter()
            .filter(move |pkg| pattern.is_match(&pkg.name) || pattern.is_match(&pkg.description))
    }
}
