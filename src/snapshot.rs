//! A [`PackageEngine`] over JSON snapshots of the package databases.
//!
//! Layout under the database directory: `local.json` for installed packages
//! and `sync/<repo>.json` per sync database, each an array of records.
//! Refresh copies `<mirror>/<repo>.json`; downloads copy archives out of the
//! pool directory. Nothing is unpacked.

use crate::{
    config::Config,
    dependency::DependencyExpr,
    engine::{PackageEngine, TargetAction, TransactionHandle, TransactionOptions},
    error::{BridgeError, BridgeResult},
    package::{InstallReason, PackageRecord, LOCAL_REPOSITORY},
    repository::Repository,
    utils::ensure_directory,
};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SnapshotEngine {
    database_dir: PathBuf,
    mirror_dir: PathBuf,
    pool_dir: PathBuf,
    cache_dir: PathBuf,
    repositories: Vec<String>,
}

impl SnapshotEngine {
    pub fn new(
        database_dir: PathBuf,
        mirror_dir: PathBuf,
        pool_dir: PathBuf,
        cache_dir: PathBuf,
        repositories: Vec<String>,
    ) -> Self {
        Self {
            database_dir,
            mirror_dir,
            pool_dir,
            cache_dir,
            repositories,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.database_dir.clone(),
            config.mirror_dir.clone(),
            config.pool_dir.clone(),
            config.cache_dir.clone(),
            config.repositories.clone(),
        )
    }

    fn local_path(&self) -> PathBuf {
        self.database_dir.join("local.json")
    }

    fn sync_path(&self, repository: &str) -> PathBuf {
        self.database_dir.join("sync").join(format!("{}.json", repository))
    }

    fn read_local(&self) -> BridgeResult<Vec<PackageRecord>> {
        read_records(&self.local_path())
    }

    fn read_sync(&self) -> BridgeResult<Vec<PackageRecord>> {
        let mut records = Vec::new();
        for repo in &self.repositories {
            let mut pkgs = read_records(&self.sync_path(repo))?;
            for pkg in &mut pkgs {
                pkg.repository = repo.clone();
            }
            records.extend(pkgs);
        }
        Ok(records)
    }
}

fn read_records(path: &Path) -> BridgeResult<Vec<PackageRecord>> {
    if !path.exists() {
        debug!("No database at {}, treating as empty", path.display());
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_records(path: &Path, records: &[PackageRecord]) -> BridgeResult<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(records)?)?;
    Ok(())
}

fn is_newer_file(source: &Path, target: &Path) -> BridgeResult<bool> {
    if !target.exists() {
        return Ok(true);
    }
    let source = std::fs::metadata(source)?.modified()?;
    let target = std::fs::metadata(target)?.modified()?;
    Ok(source > target)
}

fn depends_on_any(pkg: &PackageRecord, names: &HashSet<String>) -> bool {
    pkg.depends
        .iter()
        .any(|raw| names.contains(&DependencyExpr::parse(raw).name))
}

impl PackageEngine for SnapshotEngine {
    fn load_repositories(&self) -> BridgeResult<(Repository, Vec<Repository>)> {
        let local = Repository::local(self.read_local()?);
        let mut remotes = Vec::with_capacity(self.repositories.len());
        for repo in &self.repositories {
            remotes.push(Repository::new(repo, read_records(&self.sync_path(repo))?));
        }
        Ok((local, remotes))
    }

    fn refresh_repository(&mut self, name: &str, force: bool) -> BridgeResult<()> {
        let mirror = self.mirror_dir.join(format!("{}.json", name));
        if !mirror.exists() {
            return Err(BridgeError::Engine(format!(
                "no mirror copy of '{}' at {}",
                name,
                mirror.display()
            )));
        }
        let target = self.sync_path(name);
        if !force && !is_newer_file(&mirror, &target)? {
            debug!("Repository {} is up to date", name);
            return Ok(());
        }
        if let Some(parent) = target.parent() {
            ensure_directory(parent)?;
        }
        std::fs::copy(&mirror, &target)?;
        info!("Synchronized {} from {}", name, mirror.display());
        Ok(())
    }

    fn begin_transaction(
        &mut self,
        options: TransactionOptions,
    ) -> BridgeResult<Box<dyn TransactionHandle + '_>> {
        let id = Uuid::new_v4();
        debug!("[{}] transaction started with {:?}", id, options);
        Ok(Box::new(SnapshotTransaction {
            engine: self,
            id,
            options,
            targets: Vec::new(),
            prepared: false,
        }))
    }

    fn cache_directory(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    fn set_cache_directory(&mut self, path: &Path) {
        self.cache_dir = path.to_path_buf();
    }
}

struct SnapshotTransaction<'e> {
    engine: &'e SnapshotEngine,
    id: Uuid,
    options: TransactionOptions,
    targets: Vec<(PackageRecord, TargetAction)>,
    prepared: bool,
}

impl SnapshotTransaction<'_> {
    fn archive(&self, pkg: &PackageRecord) -> PathBuf {
        self.engine.pool_dir.join(pkg.file_name())
    }

    fn download(&self) -> BridgeResult<()> {
        ensure_directory(&self.engine.cache_dir)?;
        for (pkg, _) in &self.targets {
            let target = self.engine.cache_dir.join(pkg.file_name());
            std::fs::copy(self.archive(pkg), &target)?;
            info!("[{}] downloaded {}", self.id, target.display());
        }
        Ok(())
    }

    fn install(&self, local: &mut Vec<PackageRecord>) -> BridgeResult<()> {
        let sync = self.engine.read_sync()?;
        let mut queue: Vec<(PackageRecord, InstallReason)> = self
            .targets
            .iter()
            .map(|(pkg, _)| (pkg.clone(), InstallReason::Explicit))
            .collect();

        while let Some((pkg, reason)) = queue.pop() {
            let installed = local.iter().position(|p| p.name == pkg.name);
            if let Some(idx) = installed {
                if self.options.needed && local[idx].version == pkg.version {
                    debug!("[{}] {} is up to date, skipping", self.id, pkg.name);
                    continue;
                }
            }

            for raw in &pkg.depends {
                let dep = DependencyExpr::parse(raw);
                let satisfied = local.iter().any(|p| dep.matches(&p.name, &p.version))
                    || queue.iter().any(|(p, _)| p.name == dep.name);
                if satisfied {
                    continue;
                }
                match sync.iter().find(|p| dep.matches(&p.name, &p.version)) {
                    Some(found) => queue.push((found.clone(), InstallReason::Dependency)),
                    None => warn!("[{}] {} has unsatisfied dependency {}", self.id, pkg.name, dep),
                }
            }

            let mut record = pkg;
            // an upgrade keeps the original reason
            record.reason = installed.map(|idx| local[idx].reason).unwrap_or(reason);
            record.repository = LOCAL_REPOSITORY.to_string();
            record.install_date = Some(Utc::now());
            info!("[{}] installing {} {}", self.id, record.name, record.version);
            match installed {
                Some(idx) => local[idx] = record,
                None => local.push(record),
            }
        }
        Ok(())
    }

    fn remove(&self, local: &mut Vec<PackageRecord>) {
        let mut removing: HashSet<String> =
            self.targets.iter().map(|(pkg, _)| pkg.name.clone()).collect();

        if self.options.cascade {
            loop {
                let dependents: Vec<String> = local
                    .iter()
                    .filter(|p| !removing.contains(&p.name) && depends_on_any(p, &removing))
                    .map(|p| p.name.clone())
                    .collect();
                if dependents.is_empty() {
                    break;
                }
                removing.extend(dependents);
            }
        }

        if self.options.recurse {
            loop {
                let wanted: HashSet<String> = local
                    .iter()
                    .filter(|p| removing.contains(&p.name))
                    .flat_map(|p| p.depends.iter().map(|raw| DependencyExpr::parse(raw).name))
                    .collect();
                let orphans: Vec<String> = local
                    .iter()
                    .filter(|p| {
                        !removing.contains(&p.name)
                            && wanted.contains(&p.name)
                            && p.reason == InstallReason::Dependency
                            && !local.iter().any(|other| {
                                !removing.contains(&other.name)
                                    && other.name != p.name
                                    && depends_on_any(other, &HashSet::from([p.name.clone()]))
                            })
                    })
                    .map(|p| p.name.clone())
                    .collect();
                if orphans.is_empty() {
                    break;
                }
                removing.extend(orphans);
            }
        }

        local.retain(|p| {
            let keep = !removing.contains(&p.name);
            if !keep {
                info!("[{}] removing {} {}", self.id, p.name, p.version);
            }
            keep
        });
    }
}

impl TransactionHandle for SnapshotTransaction<'_> {
    fn add_target(&mut self, pkg: &PackageRecord, action: TargetAction) -> BridgeResult<()> {
        debug!("[{}] {} {}", self.id, action, pkg.id());
        self.targets.push((pkg.clone(), action));
        Ok(())
    }

    fn prepare(&mut self) -> BridgeResult<()> {
        let local = self.engine.read_local()?;
        for (pkg, action) in &self.targets {
            match action {
                TargetAction::Remove => {
                    if !local.iter().any(|p| p.name == pkg.name) {
                        return Err(BridgeError::TransactionError(format!(
                            "{} is not installed",
                            pkg.name
                        )));
                    }
                }
                TargetAction::Add if self.options.download_only => {
                    if !self.archive(pkg).exists() {
                        return Err(BridgeError::TransactionError(format!(
                            "no archive for {} in {}",
                            pkg.id(),
                            self.engine.pool_dir.display()
                        )));
                    }
                }
                TargetAction::Add => {
                    if pkg.is_installed() && !self.options.needed {
                        return Err(BridgeError::TransactionError(format!(
                            "{} is already installed",
                            pkg.name
                        )));
                    }
                }
            }
        }
        self.prepared = true;
        Ok(())
    }

    fn commit(&mut self) -> BridgeResult<()> {
        if !self.prepared {
            return Err(BridgeError::TransactionError(
                "transaction was not prepared".into(),
            ));
        }
        if self.options.download_only {
            return self.download();
        }

        let mut local = self.engine.read_local()?;
        let removing = self
            .targets
            .iter()
            .any(|(_, action)| *action == TargetAction::Remove);
        if removing {
            self.remove(&mut local);
        } else {
            self.install(&mut local)?;
        }
        write_records(&self.engine.local_path(), &local)?;
        info!("[{}] committed, {} packages installed", self.id, local.len());
        Ok(())
    }

    fn release(&mut self) {
        debug!("[{}] released", self.id);
        self.targets.clear();
        self.prepared = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{run_download, run_transaction};

    fn pkg(name: &str, version: &str) -> PackageRecord {
        PackageRecord::new(name, version, "x86_64", "")
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        engine: SnapshotEngine,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let engine = SnapshotEngine::new(
            root.join("db"),
            root.join("mirror"),
            root.join("pool"),
            root.join("cache"),
            vec!["core".to_string(), "extra".to_string()],
        );
        write_records(
            &engine.local_path(),
            &[
                pkg("glibc", "2.38-1"),
                pkg("app", "1.0-1").with_depends(&["libfoo"]),
                pkg("libfoo", "1.0-1").with_reason(InstallReason::Dependency),
            ],
        )
        .unwrap();
        write_records(
            &engine.sync_path("core"),
            &[pkg("glibc", "2.39-1"), pkg("zlib", "1.3-1")],
        )
        .unwrap();
        write_records(
            &engine.sync_path("extra"),
            &[pkg("vim", "9.1-1").with_depends(&["zlib>=1.2", "glibc"])],
        )
        .unwrap();
        Fixture {
            _dir: dir,
            root,
            engine,
        }
    }

    fn installed(engine: &SnapshotEngine) -> Vec<(String, String, InstallReason)> {
        let mut pkgs: Vec<_> = engine
            .read_local()
            .unwrap()
            .into_iter()
            .map(|p| (p.name, p.version, p.reason))
            .collect();
        pkgs.sort_by(|a, b| a.0.cmp(&b.0));
        pkgs
    }

    #[test]
    fn test_load_repositories() {
        let fx = fixture();
        let (local, remotes) = fx.engine.load_repositories().unwrap();
        assert!(local.is_local());
        assert_eq!(local.len(), 3);
        let names: Vec<&str> = remotes.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["core", "extra"]);
        assert_eq!(remotes[1].get("vim").unwrap().repository, "extra");
    }

    #[test]
    fn test_install_pulls_dependencies() {
        let mut fx = fixture();
        let (_, remotes) = fx.engine.load_repositories().unwrap();
        let vim = remotes[1].get("vim").unwrap().clone();
        run_transaction(
            &mut fx.engine,
            TransactionOptions::install(),
            &[&vim],
            TargetAction::Add,
        )
        .unwrap();

        let local = fx.engine.read_local().unwrap();
        let vim = local.iter().find(|p| p.name == "vim").unwrap();
        assert!(vim.install_date.is_some());
        assert_eq!(vim.reason, InstallReason::Explicit);
        let zlib = local.iter().find(|p| p.name == "zlib").unwrap();
        assert_eq!(zlib.reason, InstallReason::Dependency);
        // glibc 2.38 already satisfies the unversioned dependency
        assert_eq!(local.iter().find(|p| p.name == "glibc").unwrap().version, "2.38-1");
    }

    #[test]
    fn test_update_replaces_version_and_needed_skips() {
        let mut fx = fixture();
        let (local, remotes) = fx.engine.load_repositories().unwrap();
        let glibc = remotes[0].get("glibc").unwrap().clone();
        let app = local.get("app").unwrap().clone();
        run_transaction(
            &mut fx.engine,
            TransactionOptions::update(),
            &[&glibc, &app],
            TargetAction::Add,
        )
        .unwrap();
        let after = installed(&fx.engine);
        assert!(after.contains(&("glibc".to_string(), "2.39-1".to_string(), InstallReason::Explicit)));
        assert_eq!(after.len(), 3);
    }

    #[test]
    fn test_remove_with_recurse_takes_orphans() {
        let mut fx = fixture();
        let (local, _) = fx.engine.load_repositories().unwrap();
        let app = local.get("app").unwrap().clone();

        run_transaction(
            &mut fx.engine,
            TransactionOptions::remove(true),
            &[&app],
            TargetAction::Remove,
        )
        .unwrap();
        let names: Vec<String> = installed(&fx.engine).into_iter().map(|p| p.0).collect();
        assert_eq!(names, vec!["glibc"]);
    }

    #[test]
    fn test_remove_cascade_takes_dependents() {
        let mut fx = fixture();
        let (local, _) = fx.engine.load_repositories().unwrap();
        let libfoo = local.get("libfoo").unwrap().clone();
        run_transaction(
            &mut fx.engine,
            TransactionOptions::remove(false),
            &[&libfoo],
            TargetAction::Remove,
        )
        .unwrap();
        let names: Vec<String> = installed(&fx.engine).into_iter().map(|p| p.0).collect();
        assert_eq!(names, vec!["glibc"]);
    }

    #[test]
    fn test_remove_missing_package_fails_in_prepare() {
        let mut fx = fixture();
        let ghost = PackageRecord::new("ghost", "1-1", "x86_64", "local");
        let err = run_transaction(
            &mut fx.engine,
            TransactionOptions::remove(false),
            &[&ghost],
            TargetAction::Remove,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::TransactionError(_)));
        assert_eq!(installed(&fx.engine).len(), 3);
    }

    #[test]
    fn test_download_copies_archive() {
        let mut fx = fixture();
        let zlib = PackageRecord::new("zlib", "1.3-1", "x86_64", "core");
        ensure_directory(&fx.root.join("pool")).unwrap();
        std::fs::write(fx.root.join("pool").join(zlib.file_name()), b"archive").unwrap();
        let out = fx.root.join("out");
        run_download(&mut fx.engine, TransactionOptions::download(), &[&zlib], &out).unwrap();
        assert_eq!(
            std::fs::read(out.join("zlib-1.3-1-x86_64.pkg.tar.zst")).unwrap(),
            b"archive"
        );
        assert_eq!(fx.engine.cache_directory(), fx.root.join("cache"));

        let vim = PackageRecord::new("vim", "9.1-1", "x86_64", "extra");
        assert!(run_download(&mut fx.engine, TransactionOptions::download(), &[&vim], &out).is_err());
    }

    #[test]
    fn test_refresh_copies_mirror() {
        let mut fx = fixture();
        assert!(matches!(
            fx.engine.refresh_repository("core", false),
            Err(BridgeError::Engine(_))
        ));
        write_records(&fx.root.join("mirror/core.json"), &[pkg("glibc", "2.40-1")]).unwrap();
        fx.engine.refresh_repository("core", true).unwrap();
        let (_, remotes) = fx.engine.load_repositories().unwrap();
        assert_eq!(remotes[0].get("glibc").unwrap().version, "2.40-1");
        assert!(remotes[0].get("zlib").is_none());
    }
}
