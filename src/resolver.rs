//! Forward and reverse dependency closures over the package cache.

use crate::{
    cache::PackageCache,
    dependency::group_by_name,
    package::{PackageId, PackageRecord},
};
use log::debug;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    DependsOn,
    RequiredBy,
}

#[derive(Debug, Clone, Copy)]
pub struct DependencyResolver<'a> {
    cache: &'a PackageCache,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(cache: &'a PackageCache) -> Self {
        Self { cache }
    }

    /// Packages `pkg` depends on; only the first hop unless `recursive`.
    pub fn depends_on(&self, pkg: &PackageRecord, recursive: bool) -> Vec<&'a PackageRecord> {
        self.closure(pkg, Relation::DependsOn, recursive)
    }

    /// Installed packages depending on `pkg`; only the first hop unless
    /// `recursive`.
    pub fn required_by(&self, pkg: &PackageRecord, recursive: bool) -> Vec<&'a PackageRecord> {
        self.closure(pkg, Relation::RequiredBy, recursive)
    }

    fn expressions(&self, pkg: &PackageRecord, relation: Relation) -> Vec<String> {
        match relation {
            Relation::DependsOn => pkg.depends.clone(),
            Relation::RequiredBy => self.cache.required_by_names(pkg),
        }
    }

    /// Worklist expansion. The seed is not marked visited up front, so a
    /// cycle brings it back exactly once.
    pub fn closure(
        &self,
        seed: &PackageRecord,
        relation: Relation,
        recursive: bool,
    ) -> Vec<&'a PackageRecord> {
        let mut visited: HashSet<PackageId> = HashSet::new();
        let mut found: Vec<PackageId> = Vec::new();
        let mut exprs = self.expressions(seed, relation);

        loop {
            let mut frontier: Vec<&'a PackageRecord> = Vec::new();
            for (name, constraints) in group_by_name(&exprs) {
                let Some(pkg) = self.cache.first(&name, &constraints) else {
                    debug!("Unresolved {:?} entry {} of {}", relation, name, seed.name);
                    continue;
                };
                let id = pkg.id();
                if visited.insert(id.clone()) {
                    found.push(id);
                    frontier.push(pkg);
                }
            }
            if !recursive || frontier.is_empty() {
                break;
            }
            exprs = frontier
                .iter()
                .flat_map(|pkg| self.expressions(pkg, relation))
                .collect();
        }

        found.iter().filter_map(|id| self.cache.lookup(id)).collect()
    }
}
