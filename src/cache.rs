//! Aggregated view over the local database and the sync databases.
//!
//! Every query returns a lazy [`Packages`] iterator. Results coming from the
//! local database shadow identical `(name, version)` pairs from the sync
//! databases that follow it in scan order.

use crate::{
    dependency::{satisfies, Constraint, DependencyExpr, Operator},
    engine::PackageEngine,
    error::{BridgeError, BridgeResult},
    package::{PackageId, PackageRecord},
    repository::Repository,
    version::is_newer,
};
use log::{debug, info};
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

pub type Packages<'a> = Box<dyn Iterator<Item = &'a PackageRecord> + 'a>;

/// Drops remote records whose `(name, version)` was already yielded by the
/// local database.
pub struct Dedup<'a, I> {
    inner: I,
    seen: HashSet<(&'a str, &'a str)>,
}

impl<'a, I> Dedup<'a, I>
where
    I: Iterator<Item = &'a PackageRecord>,
{
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            seen: HashSet::new(),
        }
    }
}

impl<'a, I> Iterator for Dedup<'a, I>
where
    I: Iterator<Item = &'a PackageRecord>,
{
    type Item = &'a PackageRecord;

    fn next(&mut self) -> Option<Self::Item> {
        for pkg in self.inner.by_ref() {
            let key = (pkg.name.as_str(), pkg.version.as_str());
            if self.seen.contains(&key) {
                continue;
            }
            if pkg.is_installed() {
                self.seen.insert(key);
            }
            return Some(pkg);
        }
        None
    }
}

/// A key that is not a valid regex is matched literally.
fn key_pattern(key: &str) -> String {
    match Regex::new(key) {
        Ok(_) => key.to_string(),
        Err(e) => {
            debug!("'{}' is not a valid regex ({}), matching literally", key, e);
            regex::escape(key)
        }
    }
}

fn build_pattern<S: AsRef<str>>(keys: &[S]) -> BridgeResult<Regex> {
    let alternatives: Vec<String> = keys
        .iter()
        .map(|k| format!("(?:{})", key_pattern(k.as_ref())))
        .collect();
    Ok(RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()?)
}

fn owned_keys<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    keys.iter().map(|k| k.as_ref().to_string()).collect()
}

/// An ordered selection of repositories to query.
#[derive(Debug, Clone)]
pub struct CacheView<'a> {
    repos: Vec<&'a Repository>,
}

impl<'a> CacheView<'a> {
    pub fn repositories(&self) -> &[&'a Repository] {
        &self.repos
    }

    pub fn all(&self) -> Packages<'a> {
        let repos = self.repos.clone();
        Box::new(Dedup::new(
            repos.into_iter().flat_map(|repo| repo.packages().iter()),
        ))
    }

    pub fn get(&self, key: &str) -> Packages<'a> {
        let repos = self.repos.clone();
        let key = key.to_string();
        Box::new(Dedup::new(
            repos.into_iter().filter_map(move |repo| repo.get(&key)),
        ))
    }

    pub fn pkgs(&self, key: &str, constraints: &[Constraint]) -> Packages<'a> {
        let constraints = constraints.to_vec();
        Box::new(
            self.get(key)
                .filter(move |pkg| satisfies(&pkg.version, &constraints)),
        )
    }

    pub fn first(&self, key: &str, constraints: &[Constraint]) -> Option<&'a PackageRecord> {
        self.pkgs(key, constraints).next()
    }

    /// Name and description search; any key may match.
    pub fn search<S: AsRef<str>>(&self, keys: &[S]) -> BridgeResult<Packages<'a>> {
        let pattern = build_pattern(keys)?;
        let repos = self.repos.clone();
        Ok(Box::new(Dedup::new(
            repos
                .into_iter()
                .flat_map(move |repo| repo.search(pattern.clone())),
        )))
    }

    /// Name search; every key must match.
    pub fn match_names<S: AsRef<str>>(&self, keys: &[S]) -> BridgeResult<Packages<'a>> {
        let patterns = keys
            .iter()
            .map(|k| build_pattern(&[k.as_ref()]))
            .collect::<BridgeResult<Vec<_>>>()?;
        Ok(Box::new(self.all().filter(move |pkg| {
            patterns.iter().all(|p| p.is_match(&pkg.name))
        })))
    }

    pub fn groups<S: AsRef<str>>(&self, names: &[S]) -> Packages<'a> {
        let names = owned_keys(names);
        let repos = self.repos.clone();
        Box::new(Dedup::new(
            repos
                .into_iter()
                .flat_map(move |repo| repo.in_groups(names.clone())),
        ))
    }

    /// Packages providing every one of `keys`.
    pub fn provide<S: AsRef<str>>(&self, keys: &[S]) -> Packages<'a> {
        let keys = owned_keys(keys);
        Box::new(self.all().filter(move |pkg| {
            keys.iter().all(|key| {
                pkg.provides
                    .iter()
                    .any(|p| p == key || DependencyExpr::parse(p).name == *key)
            })
        }))
    }
}

/// The repository index: enabled repositories in scan order, local first,
/// plus the repositories disabled at runtime.
#[derive(Debug, Clone)]
pub struct PackageCache {
    repos: Vec<Repository>,
    disabled: Vec<Repository>,
}

impl PackageCache {
    pub fn new(local: Repository, remotes: Vec<Repository>) -> Self {
        let mut repos = Vec::with_capacity(remotes.len() + 1);
        repos.push(local);
        repos.extend(remotes);
        for (position, repo) in repos.iter_mut().enumerate() {
            repo.set_position(position);
        }
        info!(
            "Package cache loaded: {} repositories, {} packages",
            repos.len(),
            repos.iter().map(|r| r.len()).sum::<usize>()
        );
        Self {
            repos,
            disabled: Vec::new(),
        }
    }

    /// Replaces the repository contents, keeping disabled repositories disabled.
    pub fn reload(&mut self, local: Repository, remotes: Vec<Repository>) {
        let disabled: Vec<String> = self.disabled.iter().map(|r| r.name().to_string()).collect();
        *self = PackageCache::new(local, remotes);
        for name in disabled {
            // repositories dropped from the configuration simply vanish
            let _ = self.enable(&name, false);
        }
    }

    pub fn view(&self) -> CacheView<'_> {
        CacheView {
            repos: self.repos.iter().collect(),
        }
    }

    pub fn local(&self) -> CacheView<'_> {
        CacheView {
            repos: self.repos.iter().filter(|r| r.is_local()).collect(),
        }
    }

    pub fn online(&self) -> CacheView<'_> {
        CacheView {
            repos: self.repos.iter().filter(|r| !r.is_local()).collect(),
        }
    }

    /// Only the named repository; empty when it is unknown or disabled.
    pub fn repo(&self, name: &str) -> CacheView<'_> {
        CacheView {
            repos: self.repos.iter().filter(|r| r.name() == name).collect(),
        }
    }

    pub fn all(&self) -> Packages<'_> {
        self.view().all()
    }

    pub fn get(&self, key: &str) -> Packages<'_> {
        self.view().get(key)
    }

    pub fn first(&self, key: &str, constraints: &[Constraint]) -> Option<&PackageRecord> {
        self.view().first(key, constraints)
    }

    pub fn search<S: AsRef<str>>(&self, keys: &[S]) -> BridgeResult<Packages<'_>> {
        self.view().search(keys)
    }

    pub fn match_names<S: AsRef<str>>(&self, keys: &[S]) -> BridgeResult<Packages<'_>> {
        self.view().match_names(keys)
    }

    pub fn groups<S: AsRef<str>>(&self, names: &[S]) -> Packages<'_> {
        self.view().groups(names)
    }

    pub fn provide<S: AsRef<str>>(&self, keys: &[S]) -> Packages<'_> {
        self.view().provide(keys)
    }

    /// The strictly newest copy of `pkg` in the enabled sync databases, or
    /// `pkg` itself when nothing beats it.
    pub fn newest<'a>(&'a self, pkg: &'a PackageRecord) -> &'a PackageRecord {
        let mut best = pkg;
        for repo in self.repos.iter().filter(|r| !r.is_local()) {
            if let Some(candidate) = repo.get(&pkg.name) {
                if is_newer(&candidate.version, &best.version) {
                    best = candidate;
                }
            }
        }
        best
    }

    pub fn newest_by_name(&self, key: &str) -> Option<&PackageRecord> {
        self.first(key, &[]).map(|pkg| self.newest(pkg))
    }

    /// Resolves an identity inside its own repository.
    pub fn lookup(&self, id: &PackageId) -> Option<&PackageRecord> {
        self.repo(&id.repository)
            .get(&id.name)
            .find(|pkg| pkg.version == id.version && pkg.arch == id.arch)
    }

    /// Names of installed packages with a dependency satisfied by `pkg`,
    /// either by name or through one of its provides.
    pub fn required_by_names(&self, pkg: &PackageRecord) -> Vec<String> {
        let Some(local) = self.repos.iter().find(|r| r.is_local()) else {
            return Vec::new();
        };
        let provided: Vec<DependencyExpr> =
            pkg.provides.iter().map(|p| DependencyExpr::parse(p)).collect();

        let mut names: Vec<String> = local
            .packages()
            .iter()
            .filter(|candidate| candidate.name != pkg.name)
            .filter(|candidate| {
                candidate.depends.iter().any(|raw| {
                    let dep = DependencyExpr::parse(raw);
                    dep.matches(&pkg.name, &pkg.version)
                        || provided.iter().any(|p| provision_satisfies(p, &dep))
                })
            })
            .map(|candidate| candidate.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Moves a repository between the enabled and disabled lists. A
    /// re-enabled repository goes back to its configured position.
    pub fn enable(&mut self, name: &str, enabled: bool) -> BridgeResult<()> {
        let (from, to) = if enabled {
            (&mut self.disabled, &mut self.repos)
        } else {
            (&mut self.repos, &mut self.disabled)
        };
        match from.iter().position(|r| r.name() == name) {
            Some(idx) => {
                let repo = from.remove(idx);
                let at = to
                    .iter()
                    .position(|r| r.position() > repo.position())
                    .unwrap_or(to.len());
                to.insert(at, repo);
                info!(
                    "Repository {} {}",
                    name,
                    if enabled { "enabled" } else { "disabled" }
                );
                Ok(())
            }
            None if to.iter().any(|r| r.name() == name) => {
                debug!("Repository {} already in requested state", name);
                Ok(())
            }
            None => Err(BridgeError::RepositoryNotFound(name.to_string())),
        }
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        if self.repos.iter().any(|r| r.name() == name) {
            Some(true)
        } else if self.disabled.iter().any(|r| r.name() == name) {
            Some(false)
        } else {
            None
        }
    }

    /// Every sync repository with its enabled state.
    pub fn remote_repositories(&self) -> Vec<(&str, bool)> {
        self.repos
            .iter()
            .map(|r| (r, true))
            .chain(self.disabled.iter().map(|r| (r, false)))
            .filter(|(r, _)| !r.is_local())
            .map(|(r, enabled)| (r.name(), enabled))
            .collect()
    }

    pub fn disabled_names(&self) -> Vec<String> {
        self.disabled.iter().map(|r| r.name().to_string()).collect()
    }

    /// Asks the engine to resynchronize every enabled sync repository.
    pub fn refresh(&self, force: bool, engine: &mut dyn PackageEngine) -> BridgeResult<()> {
        for repo in self.repos.iter().filter(|r| !r.is_local()) {
            info!("Refreshing repository {} (force: {})", repo.name(), force);
            engine.refresh_repository(repo.name(), force)?;
        }
        Ok(())
    }
}

fn provision_satisfies(provision: &DependencyExpr, dep: &DependencyExpr) -> bool {
    if provision.name != dep.name {
        return false;
    }
    match (&dep.constraint, &provision.constraint) {
        (None, _) => true,
        (Some(wanted), Some(given)) if given.op == Operator::Equal => wanted.matches(&given.version),
        _ => false,
    }
}
