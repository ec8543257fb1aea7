//! Install / remove / update / download planning.
//!
//! A request is resolved up front: one identity that does not resolve aborts
//! the whole request before anything is reported or committed. After that,
//! simulate mode only reports what would happen, and commit mode hands the
//! target set to the engine.

use crate::{
    cache::PackageCache,
    engine::{run_download, run_transaction, PackageEngine, TargetAction, TransactionOptions},
    error::{BridgeError, BridgeResult},
    package::{InstallReason, PackageId, PackageRecord},
    resolver::DependencyResolver,
    utils::require_writable,
    version::is_newer,
};
use log::{debug, info};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Install,
    Remove,
    Update,
    Download,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionKind::Install => "install",
            TransactionKind::Remove => "remove",
            TransactionKind::Update => "update",
            TransactionKind::Download => "download",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionFlags {
    pub simulate: bool,
    pub only_trusted: bool,
    pub allow_deps: bool,
    pub autoremove: bool,
}

impl TransactionFlags {
    pub fn simulate() -> Self {
        Self {
            simulate: true,
            ..Default::default()
        }
    }

    pub fn with_allow_deps(mut self, allow_deps: bool) -> Self {
        self.allow_deps = allow_deps;
        self
    }

    pub fn with_autoremove(mut self, autoremove: bool) -> Self {
        self.autoremove = autoremove;
        self
    }

    /// Whether a removal also takes the dependencies it leaves orphaned.
    pub fn removes_orphans(&self) -> bool {
        self.allow_deps || self.autoremove
    }
}

/// Parses the front-end's `;`-separated transaction flags.
impl FromStr for TransactionFlags {
    type Err = BridgeError;

    fn from_str(s: &str) -> BridgeResult<Self> {
        let mut flags = TransactionFlags::default();
        for token in s.split(';').map(str::trim).filter(|t| !t.is_empty()) {
            match token {
                "none" => {}
                "simulate" => flags.simulate = true,
                "only-trusted" => flags.only_trusted = true,
                "only-download" | "allow-reinstall" | "allow-downgrade" | "just-reinstall" => {
                    debug!("Ignoring transaction flag '{}'", token)
                }
                other => {
                    return Err(BridgeError::InvalidInput(format!(
                        "unknown transaction flag '{}'",
                        other
                    )))
                }
            }
        }
        Ok(flags)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub kind: TransactionKind,
    pub ids: Vec<PackageId>,
    pub flags: TransactionFlags,
    pub directory: Option<PathBuf>,
}

impl TransactionRequest {
    pub fn new(kind: TransactionKind, ids: Vec<PackageId>, flags: TransactionFlags) -> Self {
        Self {
            kind,
            ids,
            flags,
            directory: None,
        }
    }

    pub fn download(ids: Vec<PackageId>, directory: Option<PathBuf>) -> Self {
        Self {
            kind: TransactionKind::Download,
            ids,
            flags: TransactionFlags::default(),
            directory,
        }
    }
}

/// Info tag attached to a reported package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageInfo {
    Installed,
    Available,
    Normal,
    Installing,
    Removing,
    Updating,
}

impl PackageInfo {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageInfo::Installed => "installed",
            PackageInfo::Available => "available",
            PackageInfo::Normal => "normal",
            PackageInfo::Installing => "installing",
            PackageInfo::Removing => "removing",
            PackageInfo::Updating => "updating",
        }
    }

    pub fn of(pkg: &PackageRecord) -> Self {
        if pkg.is_installed() {
            PackageInfo::Installed
        } else {
            PackageInfo::Available
        }
    }
}

#[derive(Debug, Default)]
pub struct TransactionReport<'a> {
    /// Non-fatal per-target problems, reported before anything else.
    pub notices: Vec<BridgeError>,
    pub packages: Vec<(&'a PackageRecord, PackageInfo)>,
    pub files: Vec<(PackageId, PathBuf)>,
    pub committed: bool,
}

impl<'a> TransactionReport<'a> {
    fn push_unique(&mut self, seen: &mut HashSet<PackageId>, pkg: &'a PackageRecord, info: PackageInfo) {
        if seen.insert(pkg.id()) {
            self.packages.push((pkg, info));
        }
    }
}

pub struct TransactionPlanner<'a> {
    cache: &'a PackageCache,
    resolver: DependencyResolver<'a>,
}

impl<'a> TransactionPlanner<'a> {
    pub fn new(cache: &'a PackageCache) -> Self {
        Self {
            cache,
            resolver: DependencyResolver::new(cache),
        }
    }

    pub fn execute(
        &self,
        request: &TransactionRequest,
        engine: &mut dyn PackageEngine,
    ) -> BridgeResult<TransactionReport<'a>> {
        info!(
            "{} transaction for {} package(s), simulate: {}",
            request.kind,
            request.ids.len(),
            request.flags.simulate
        );
        let targets = self.resolve_targets(request)?;
        match request.kind {
            TransactionKind::Install => self.install(targets, request.flags, engine),
            TransactionKind::Remove => self.remove(targets, request.flags, engine),
            TransactionKind::Update => self.update(targets, request.flags, engine),
            TransactionKind::Download => {
                self.download(targets, request.directory.as_deref(), engine)
            }
        }
    }

    /// Resolves every identity, keeping the first occurrence of a repeated one.
    fn resolve_targets(&self, request: &TransactionRequest) -> BridgeResult<Vec<&'a PackageRecord>> {
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(request.ids.len());
        for id in &request.ids {
            if request.kind == TransactionKind::Download && id.is_local() {
                return Err(BridgeError::PackageNotFound(id.to_string()));
            }
            let pkg = self
                .cache
                .lookup(id)
                .ok_or_else(|| BridgeError::PackageNotFound(id.to_string()))?;
            if seen.insert(id) {
                targets.push(pkg);
            } else {
                debug!("Ignoring repeated target {}", id);
            }
        }
        Ok(targets)
    }

    fn install(
        &self,
        targets: Vec<&'a PackageRecord>,
        flags: TransactionFlags,
        engine: &mut dyn PackageEngine,
    ) -> BridgeResult<TransactionReport<'a>> {
        let mut report = TransactionReport::default();
        let local = self.cache.local();
        let mut remaining = Vec::with_capacity(targets.len());
        for pkg in targets {
            if local.first(&pkg.name, &[]).is_some() {
                report.notices.push(BridgeError::AlreadyInstalled(pkg.id().to_string()));
            } else {
                remaining.push(pkg);
            }
        }

        if flags.simulate {
            let mut seen = HashSet::new();
            for pkg in &remaining {
                let closure = std::iter::once(*pkg).chain(self.resolver.depends_on(pkg, true));
                for dep in closure.filter(|p| !p.is_installed()) {
                    report.push_unique(&mut seen, dep, PackageInfo::Installing);
                }
            }
            return Ok(report);
        }

        self.commit(
            &mut report,
            engine,
            TransactionOptions::install().only_trusted(flags.only_trusted),
            &remaining,
            TargetAction::Add,
        )?;
        Ok(report)
    }

    fn remove(
        &self,
        targets: Vec<&'a PackageRecord>,
        flags: TransactionFlags,
        engine: &mut dyn PackageEngine,
    ) -> BridgeResult<TransactionReport<'a>> {
        let mut report = TransactionReport::default();
        let mut remaining = Vec::with_capacity(targets.len());
        for pkg in targets {
            if pkg.is_installed() {
                remaining.push(pkg);
            } else {
                report.notices.push(BridgeError::NotInstalled(pkg.id().to_string()));
            }
        }

        if flags.simulate {
            let mut seen = HashSet::new();
            let mut collected: Vec<&'a PackageRecord> = Vec::new();
            for pkg in &remaining {
                for p in std::iter::once(*pkg).chain(self.resolver.required_by(pkg, true)) {
                    if seen.insert(p.id()) {
                        collected.push(p);
                    }
                }
            }
            if flags.removes_orphans() {
                let orphans = self.orphans(&collected);
                for orphan in orphans {
                    if seen.insert(orphan.id()) {
                        collected.push(orphan);
                    }
                }
            }
            report.packages = collected
                .into_iter()
                .filter(|p| p.is_installed())
                .map(|p| (p, PackageInfo::Removing))
                .collect();
            return Ok(report);
        }

        self.commit(
            &mut report,
            engine,
            TransactionOptions::remove(flags.removes_orphans()).only_trusted(flags.only_trusted),
            &remaining,
            TargetAction::Remove,
        )?;
        Ok(report)
    }

    /// Direct dependencies of `removing` that were pulled in as dependencies
    /// and that nothing outside `removing` still needs.
    fn orphans(&self, removing: &[&'a PackageRecord]) -> Vec<&'a PackageRecord> {
        let names: HashSet<&str> = removing.iter().map(|p| p.name.as_str()).collect();
        let mut orphans = Vec::new();
        for pkg in removing {
            for dep in self.resolver.depends_on(pkg, false) {
                if !dep.is_installed() || dep.reason != InstallReason::Dependency {
                    continue;
                }
                let still_needed = self
                    .cache
                    .required_by_names(dep)
                    .iter()
                    .any(|name| !names.contains(name.as_str()));
                if !still_needed {
                    debug!("{} would be left orphaned", dep.name);
                    orphans.push(dep);
                }
            }
        }
        orphans
    }

    fn update(
        &self,
        targets: Vec<&'a PackageRecord>,
        flags: TransactionFlags,
        engine: &mut dyn PackageEngine,
    ) -> BridgeResult<TransactionReport<'a>> {
        let mut report = TransactionReport::default();
        let mut seen = HashSet::new();

        if flags.simulate {
            for pkg in targets {
                let current = self.installed_copy(pkg);
                let candidate = self.cache.newest(current);
                if is_newer(&candidate.version, &current.version) {
                    report.push_unique(&mut seen, candidate, PackageInfo::Updating);
                }
            }
            return Ok(report);
        }

        let newest: Vec<&'a PackageRecord> = targets
            .into_iter()
            .map(|pkg| self.cache.newest(self.installed_copy(pkg)))
            .filter(|pkg| seen.insert(pkg.id()))
            .collect();
        self.commit(
            &mut report,
            engine,
            TransactionOptions::update().only_trusted(flags.only_trusted),
            &newest,
            TargetAction::Add,
        )?;
        Ok(report)
    }

    /// The installed record of the target's name, or the target itself when
    /// nothing of that name is installed.
    fn installed_copy(&self, pkg: &'a PackageRecord) -> &'a PackageRecord {
        self.cache.local().first(&pkg.name, &[]).unwrap_or(pkg)
    }

    fn download(
        &self,
        targets: Vec<&'a PackageRecord>,
        directory: Option<&Path>,
        engine: &mut dyn PackageEngine,
    ) -> BridgeResult<TransactionReport<'a>> {
        let directory = match directory {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?,
        };
        require_writable(&directory)?;
        let absolute = std::path::absolute(&directory)?;

        run_download(engine, TransactionOptions::download(), &targets, &directory)?;

        let mut report = TransactionReport {
            committed: true,
            ..Default::default()
        };
        report.files = targets
            .iter()
            .map(|pkg| (pkg.id(), absolute.join(pkg.file_name())))
            .collect();
        Ok(report)
    }

    fn commit(
        &self,
        report: &mut TransactionReport<'a>,
        engine: &mut dyn PackageEngine,
        options: TransactionOptions,
        targets: &[&'a PackageRecord],
        action: TargetAction,
    ) -> BridgeResult<()> {
        if targets.is_empty() {
            debug!("Nothing left to {}", action);
            return Ok(());
        }
        run_transaction(engine, options, targets, action)?;
        report.committed = true;
        Ok(())
    }
}
