//! Front-end command surface.
//!
//! Every command runs through [`Backend::command`], which announces the
//! status and cancel policy, runs the body, turns a failure into a single
//! error signal and always closes with `finished`.

use crate::{
    cache::{PackageCache, Packages},
    config::{Blacklist, Config, GroupMap},
    engine::PackageEngine,
    error::{BridgeError, BridgeResult},
    filter::FilterSet,
    package::{PackageId, PackageRecord},
    resolver::DependencyResolver,
    transaction::{
        PackageInfo, TransactionFlags, TransactionKind, TransactionPlanner, TransactionRequest,
    },
    utils::format_date,
    version::is_newer,
};
use log::{debug, error, info, warn};
use regex::{Regex, RegexBuilder};
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Query,
    Info,
    Running,
    Install,
    Remove,
    Update,
    Download,
    RefreshCache,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Query => "query",
            Status::Info => "info",
            Status::Running => "running",
            Status::Install => "install",
            Status::Remove => "remove",
            Status::Update => "update",
            Status::Download => "download",
            Status::RefreshCache => "refresh-cache",
        }
    }
}

/// Status and cancel policy announced before a command body runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub status: Status,
    pub allow_cancel: bool,
}

impl Stage {
    pub const QUERY: Stage = Stage {
        status: Status::Query,
        allow_cancel: true,
    };
    pub const INFO: Stage = Stage {
        status: Status::Info,
        allow_cancel: true,
    };
    pub const RUNNING: Stage = Stage {
        status: Status::Running,
        allow_cancel: false,
    };
    pub const REFRESH: Stage = Stage {
        status: Status::RefreshCache,
        allow_cancel: false,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Details {
    pub id: PackageId,
    pub license: String,
    pub group: String,
    pub description: String,
    pub url: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDetail {
    pub id: PackageId,
    /// Installed identities being replaced, `&`-separated.
    pub updates: String,
    pub vendor_url: String,
    pub state: &'static str,
    pub issued: String,
    pub updated: String,
}

/// Sink for the signals sent back to the front-end.
pub trait Reporter {
    fn status(&mut self, status: Status);
    fn allow_cancel(&mut self, allow: bool);
    fn package(&mut self, pkg: &PackageRecord, info: PackageInfo);
    fn details(&mut self, details: &Details);
    fn files(&mut self, id: &PackageId, files: &[String]);
    fn update_detail(&mut self, detail: &UpdateDetail);
    fn repo_detail(&mut self, name: &str, description: &str, enabled: bool);
    fn error(&mut self, error: &BridgeError);
    fn finished(&mut self);
}

/// Writes the tab-separated line protocol of a spawned PackageKit backend.
pub struct LineReporter<W: Write> {
    out: W,
}

impl<W: Write> LineReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, fields: &[&str]) {
        let line = fields
            .iter()
            .map(|f| f.replace(['\t', '\n'], " "))
            .collect::<Vec<_>>()
            .join("\t");
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            warn!("Failed to write '{}' signal: {}", fields[0], e);
        }
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

impl<W: Write> Reporter for LineReporter<W> {
    fn status(&mut self, status: Status) {
        self.emit(&["status", status.as_str()]);
    }

    fn allow_cancel(&mut self, allow: bool) {
        self.emit(&["allow-cancel", bool_str(allow)]);
    }

    fn package(&mut self, pkg: &PackageRecord, info: PackageInfo) {
        self.emit(&["package", info.as_str(), &pkg.id().to_string(), &pkg.description]);
    }

    fn details(&mut self, details: &Details) {
        self.emit(&[
            "details",
            &details.id.to_string(),
            &details.license,
            &details.group,
            &details.description,
            &details.url,
            &details.size.to_string(),
        ]);
    }

    fn files(&mut self, id: &PackageId, files: &[String]) {
        self.emit(&["files", &id.to_string(), &files.join(";")]);
    }

    fn update_detail(&mut self, detail: &UpdateDetail) {
        self.emit(&[
            "updatedetail",
            &detail.id.to_string(),
            &detail.updates,
            "",
            &detail.vendor_url,
            "",
            "",
            "none",
            "",
            "",
            detail.state,
            &detail.issued,
            &detail.updated,
        ]);
    }

    fn repo_detail(&mut self, name: &str, description: &str, enabled: bool) {
        self.emit(&["repo-detail", name, description, bool_str(enabled)]);
    }

    fn error(&mut self, error: &BridgeError) {
        self.emit(&["error", error.code(), &error.to_string()]);
    }

    fn finished(&mut self) {
        self.emit(&["finished"]);
    }
}

fn report_packages<R: Reporter>(reporter: &mut R, pkgs: Packages<'_>) {
    for pkg in pkgs {
        reporter.package(pkg, PackageInfo::of(pkg));
    }
}

fn parse_id(raw: &str) -> BridgeResult<PackageId> {
    raw.parse()
}

/// Transaction targets: a malformed identity is reported as not found.
fn parse_targets<S: AsRef<str>>(ids: &[S]) -> BridgeResult<Vec<PackageId>> {
    ids.iter()
        .map(|raw| {
            parse_id(raw.as_ref())
                .map_err(|_| BridgeError::PackageNotFound(raw.as_ref().to_string()))
        })
        .collect()
}

fn lookup<'a>(cache: &'a PackageCache, raw: &str) -> BridgeResult<&'a PackageRecord> {
    let id = parse_id(raw)?;
    cache
        .lookup(&id)
        .ok_or_else(|| BridgeError::InternalLookupFailure(raw.to_string()))
}

/// Anchored file pattern; leading `/` is dropped since file lists are
/// stored relative to the root.
fn file_pattern(key: &str) -> BridgeResult<Regex> {
    let key = key.strip_prefix('/').unwrap_or(key);
    match RegexBuilder::new(&format!("^(?:{})", key)).build() {
        Ok(re) => Ok(re),
        Err(_) => Ok(Regex::new(&format!("^{}", regex::escape(key)))?),
    }
}

pub struct Backend<E: PackageEngine, R: Reporter> {
    engine: E,
    reporter: R,
    cache: PackageCache,
    config: Config,
    groups: GroupMap,
}

impl<E: PackageEngine, R: Reporter> Backend<E, R> {
    /// Loads the databases and disables the blacklisted repositories.
    pub fn new(engine: E, reporter: R, config: Config, groups: GroupMap) -> BridgeResult<Self> {
        let (local, remotes) = engine.load_repositories()?;
        let mut cache = PackageCache::new(local, remotes);
        for repo in Blacklist::load(&config.blacklist_file)?.blocked {
            if let Err(e) = cache.enable(&repo, false) {
                warn!("Ignoring blacklist entry: {}", e);
            }
        }
        Ok(Self {
            engine,
            reporter,
            cache,
            config,
            groups,
        })
    }

    pub fn cache(&self) -> &PackageCache {
        &self.cache
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn into_parts(self) -> (E, R) {
        (self.engine, self.reporter)
    }

    fn reload(&mut self) -> BridgeResult<()> {
        let (local, remotes) = self.engine.load_repositories()?;
        self.cache.reload(local, remotes);
        Ok(())
    }

    pub fn command<F>(&mut self, stage: Stage, body: F) -> BridgeResult<()>
    where
        F: FnOnce(&mut Self) -> BridgeResult<()>,
    {
        self.reporter.status(stage.status);
        self.reporter.allow_cancel(stage.allow_cancel);
        let result = body(self);
        if let Err(ref e) = result {
            if e.is_user_error() {
                warn!("Command rejected: {}", e);
            } else {
                error!("Command failed: {}", e);
            }
            self.reporter.error(e);
        }
        self.reporter.finished();
        result
    }

    pub fn search_name<S: AsRef<str>>(&mut self, filters: &FilterSet, keys: &[S]) -> BridgeResult<()> {
        self.command(Stage::QUERY, |this| {
            let pkgs = this.cache.match_names(keys)?;
            report_packages(&mut this.reporter, filters.apply(pkgs));
            Ok(())
        })
    }

    pub fn search_details<S: AsRef<str>>(&mut self, filters: &FilterSet, keys: &[S]) -> BridgeResult<()> {
        self.command(Stage::QUERY, |this| {
            let pkgs = this.cache.search(keys)?;
            report_packages(&mut this.reporter, filters.apply(pkgs));
            Ok(())
        })
    }

    pub fn search_group<S: AsRef<str>>(&mut self, filters: &FilterSet, groups: &[S]) -> BridgeResult<()> {
        self.command(Stage::QUERY, |this| {
            let expanded = this.groups.expand(groups);
            debug!("Searching groups {:?}", expanded);
            report_packages(&mut this.reporter, filters.apply(this.cache.groups(&expanded)));
            Ok(())
        })
    }

    /// Installed packages owning a file matching every key.
    pub fn search_file<S: AsRef<str>>(&mut self, filters: &FilterSet, files: &[S]) -> BridgeResult<()> {
        self.command(Stage::QUERY, |this| {
            if filters.excludes_installed() {
                return Err(BridgeError::CannotGetFileList(
                    "search-file isn't available with ~installed filter".into(),
                ));
            }
            let patterns = files
                .iter()
                .map(|f| file_pattern(f.as_ref()))
                .collect::<BridgeResult<Vec<_>>>()?;
            let pkgs: Packages<'_> = Box::new(this.cache.local().all().filter(move |pkg| {
                patterns
                    .iter()
                    .all(|re| pkg.files.iter().any(|f| re.is_match(f)))
            }));
            report_packages(&mut this.reporter, filters.apply(pkgs));
            Ok(())
        })
    }

    pub fn get_packages(&mut self, filters: &FilterSet) -> BridgeResult<()> {
        self.command(Stage::QUERY, |this| {
            report_packages(&mut this.reporter, filters.apply(this.cache.all()));
            Ok(())
        })
    }

    pub fn resolve<S: AsRef<str>>(&mut self, filters: &FilterSet, names: &[S]) -> BridgeResult<()> {
        self.command(Stage::QUERY, |this| {
            let pkgs: Vec<&PackageRecord> = names
                .iter()
                .flat_map(|name| this.cache.get(name.as_ref()))
                .collect();
            report_packages(&mut this.reporter, filters.apply(Box::new(pkgs.into_iter())));
            Ok(())
        })
    }

    pub fn depends_on<S: AsRef<str>>(
        &mut self,
        filters: &FilterSet,
        ids: &[S],
        recursive: bool,
    ) -> BridgeResult<()> {
        self.command(Stage::INFO, |this| {
            let resolver = DependencyResolver::new(&this.cache);
            for raw in ids {
                let pkg = lookup(&this.cache, raw.as_ref())?;
                let deps = resolver.depends_on(pkg, recursive);
                report_packages(&mut this.reporter, filters.apply(Box::new(deps.into_iter())));
            }
            Ok(())
        })
    }

    pub fn required_by<S: AsRef<str>>(
        &mut self,
        filters: &FilterSet,
        ids: &[S],
        recursive: bool,
    ) -> BridgeResult<()> {
        self.command(Stage::INFO, |this| {
            let resolver = DependencyResolver::new(&this.cache);
            for raw in ids {
                let pkg = lookup(&this.cache, raw.as_ref())?;
                let rdeps = resolver.required_by(pkg, recursive);
                report_packages(&mut this.reporter, filters.apply(Box::new(rdeps.into_iter())));
            }
            Ok(())
        })
    }

    pub fn what_provides<S: AsRef<str>>(&mut self, filters: &FilterSet, values: &[S]) -> BridgeResult<()> {
        self.command(Stage::QUERY, |this| {
            report_packages(&mut this.reporter, filters.apply(this.cache.provide(values)));
            Ok(())
        })
    }

    pub fn get_details<S: AsRef<str>>(&mut self, ids: &[S]) -> BridgeResult<()> {
        self.command(Stage::INFO, |this| {
            for raw in ids {
                let pkg = lookup(&this.cache, raw.as_ref())?;
                let details = Details {
                    id: pkg.id(),
                    license: pkg.licenses.join(" "),
                    group: this.groups.classify(&pkg.groups).to_string(),
                    description: pkg.description.clone(),
                    url: pkg.url.clone(),
                    size: pkg.installed_size,
                };
                this.reporter.details(&details);
            }
            Ok(())
        })
    }

    /// File lists are only known for installed packages.
    pub fn get_files<S: AsRef<str>>(&mut self, ids: &[S]) -> BridgeResult<()> {
        self.command(Stage::INFO, |this| {
            for raw in ids {
                let id = parse_id(raw.as_ref())?;
                let pkg = this
                    .cache
                    .local()
                    .get(&id.name)
                    .find(|pkg| pkg.version == id.version)
                    .ok_or_else(|| BridgeError::InternalLookupFailure(raw.as_ref().to_string()))?;
                this.reporter.files(&id, &pkg.files);
            }
            Ok(())
        })
    }

    pub fn get_updates(&mut self, filters: &FilterSet) -> BridgeResult<()> {
        self.command(Stage::INFO, |this| {
            let cache = &this.cache;
            let candidates: Packages<'_> = Box::new(cache.local().all().filter_map(move |pkg| {
                let candidate = cache.newest(pkg);
                is_newer(&candidate.version, &pkg.version).then_some(candidate)
            }));
            for pkg in filters.apply(candidates) {
                this.reporter.package(pkg, PackageInfo::Normal);
            }
            Ok(())
        })
    }

    pub fn get_update_detail<S: AsRef<str>>(&mut self, ids: &[S]) -> BridgeResult<()> {
        self.command(Stage::INFO, |this| {
            for raw in ids {
                let id = parse_id(raw.as_ref())?;
                let pkg = this
                    .cache
                    .online()
                    .get(&id.name)
                    .find(|pkg| pkg.version == id.version)
                    .ok_or_else(|| BridgeError::InternalLookupFailure(raw.as_ref().to_string()))?;
                let installed: Vec<&PackageRecord> = this.cache.local().get(&pkg.name).collect();
                let updated = installed.iter().filter_map(|p| p.install_date.as_ref()).max();
                let detail = UpdateDetail {
                    id: pkg.id(),
                    updates: installed
                        .iter()
                        .map(|p| p.id().to_string())
                        .collect::<Vec<_>>()
                        .join("&"),
                    vendor_url: pkg.url.clone(),
                    state: if pkg.repository.contains("testing") {
                        "testing"
                    } else {
                        "stable"
                    },
                    issued: format_date(pkg.build_date.as_ref()),
                    updated: format_date(updated),
                };
                this.reporter.update_detail(&detail);
            }
            Ok(())
        })
    }

    pub fn refresh_cache(&mut self, force: bool) -> BridgeResult<()> {
        self.command(Stage::REFRESH, |this| {
            this.cache.refresh(force, &mut this.engine)?;
            this.reload()
        })
    }

    fn transact(&mut self, status: Status, request: TransactionRequest) -> BridgeResult<()> {
        self.reporter.status(status);
        let committed = {
            let report =
                TransactionPlanner::new(&self.cache).execute(&request, &mut self.engine)?;
            for notice in &report.notices {
                warn!("{}", notice);
                self.reporter.error(notice);
            }
            for (pkg, info) in &report.packages {
                self.reporter.package(pkg, *info);
            }
            for (id, path) in &report.files {
                self.reporter.files(id, &[path.display().to_string()]);
            }
            report.committed
        };
        if committed {
            info!("{} transaction committed, reloading databases", request.kind);
            self.reload()?;
        }
        Ok(())
    }

    pub fn install_packages<S: AsRef<str>>(&mut self, flags: TransactionFlags, ids: &[S]) -> BridgeResult<()> {
        self.command(Stage::RUNNING, |this| {
            let request = TransactionRequest::new(TransactionKind::Install, parse_targets(ids)?, flags);
            this.transact(Status::Install, request)
        })
    }

    pub fn remove_packages<S: AsRef<str>>(&mut self, flags: TransactionFlags, ids: &[S]) -> BridgeResult<()> {
        self.command(Stage::RUNNING, |this| {
            let request = TransactionRequest::new(TransactionKind::Remove, parse_targets(ids)?, flags);
            this.transact(Status::Remove, request)
        })
    }

    pub fn update_packages<S: AsRef<str>>(&mut self, flags: TransactionFlags, ids: &[S]) -> BridgeResult<()> {
        self.command(Stage::RUNNING, |this| {
            let request = TransactionRequest::new(TransactionKind::Update, parse_targets(ids)?, flags);
            this.transact(Status::Update, request)
        })
    }

    pub fn download_packages<S: AsRef<str>>(
        &mut self,
        directory: Option<PathBuf>,
        ids: &[S],
    ) -> BridgeResult<()> {
        self.command(Stage::RUNNING, |this| {
            let request = TransactionRequest::download(parse_targets(ids)?, directory);
            this.transact(Status::Download, request)
        })
    }

    pub fn repo_enable(&mut self, repo: &str, enable: bool) -> BridgeResult<()> {
        self.command(Stage::INFO, |this| {
            if !enable && this.config.is_protected(repo) {
                return Err(BridgeError::RepositoryProtected(repo.to_string()));
            }
            this.cache.enable(repo, enable)?;
            let blacklist = Blacklist {
                blocked: this.cache.disabled_names(),
            };
            blacklist.save(&this.config.blacklist_file)
        })
    }

    pub fn get_repo_list(&mut self) -> BridgeResult<()> {
        self.command(Stage::INFO, |this| {
            let mut repos = this.cache.remote_repositories();
            repos.sort();
            for (name, enabled) in repos {
                this.reporter.repo_detail(name, name, enabled);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Call, RecordingEngine};
    use crate::package::InstallReason;
    use chrono::{TimeZone, Utc};

    type TestBackend = Backend<RecordingEngine, LineReporter<Vec<u8>>>;

    fn pkg(name: &str, version: &str) -> PackageRecord {
        PackageRecord::new(name, version, "x86_64", "")
    }

    fn engine() -> RecordingEngine {
        RecordingEngine {
            local: vec![
                pkg("glibc", "2.38-1")
                    .with_description("GNU C Library")
                    .with_groups(&["base"])
                    .with_licenses(&["GPL", "LGPL"])
                    .with_files(&["usr/lib/libc.so.6", "usr/bin/ldd"]),
                pkg("bash", "5.2-1")
                    .with_depends(&["glibc"])
                    .with_provides(&["sh"])
                    .with_files(&["usr/bin/bash", "usr/bin/sh"]),
                pkg("baz", "1.0-1").with_reason(InstallReason::Dependency),
            ],
            remotes: vec![
                (
                    "core".to_string(),
                    vec![
                        {
                            let mut glibc = pkg("glibc", "2.39-1").with_description("GNU C Library");
                            glibc.build_date = Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
                            glibc.url = "https://gnu.org".to_string();
                            glibc
                        },
                        pkg("zsh", "5.9-1").with_depends(&["glibc"]).with_groups(&["shells"]),
                    ],
                ),
                (
                    "testing".to_string(),
                    vec![pkg("bash", "5.3-1").with_depends(&["glibc"])],
                ),
            ],
            ..Default::default()
        }
    }

    fn backend(dir: &tempfile::TempDir) -> TestBackend {
        let config = Config {
            repositories: vec!["core".to_string(), "testing".to_string()],
            blacklist_file: dir.path().join("blacklist.json"),
            ..Config::default()
        };
        Backend::new(
            engine(),
            LineReporter::new(Vec::new()),
            config,
            GroupMap::default(),
        )
        .unwrap()
    }

    fn lines(backend: &TestBackend) -> Vec<String> {
        String::from_utf8(backend.reporter().get_ref().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn body(backend: &TestBackend) -> Vec<String> {
        let all = lines(backend);
        all[2..all.len() - 1].to_vec()
    }

    #[test]
    fn test_command_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(&dir);
        backend.get_packages(&FilterSet::installed()).unwrap();
        let out = lines(&backend);
        assert_eq!(out[0], "status\tquery");
        assert_eq!(out[1], "allow-cancel\ttrue");
        assert_eq!(out.last().unwrap(), "finished");
        assert_eq!(
            body(&backend),
            vec![
                "package\tinstalled\tglibc;2.38-1;x86_64;local\tGNU C Library",
                "package\tinstalled\tbash;5.2-1;x86_64;local\t",
                "package\tinstalled\tbaz;1.0-1;x86_64;local\t",
            ]
        );
    }

    #[test]
    fn test_failure_emits_one_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(&dir);
        assert!(backend.depends_on(&FilterSet::none(), &["nope"], false).is_err());
        assert_eq!(
            body(&backend),
            vec!["error\tinternal-error\tCould not find 'nope'"]
        );
        assert_eq!(lines(&backend).last().unwrap(), "finished");
    }

    #[test]
    fn test_search_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(&dir);
        backend
            .search_details(&"~installed".parse().unwrap(), &["gnu c"])
            .unwrap();
        assert_eq!(
            body(&backend),
            vec!["package\tavailable\tglibc;2.39-1;x86_64;core\tGNU C Library"]
        );

        let mut backend = self::backend(&dir);
        backend.search_group(&FilterSet::none(), &["system"]).unwrap();
        assert_eq!(body(&backend).len(), 1);
        assert!(body(&backend)[0].contains("glibc;2.38-1;x86_64;local"));

        let mut backend = self::backend(&dir);
        backend.search_name(&FilterSet::none().with_newest(), &["^bash$"]).unwrap();
        assert_eq!(
            body(&backend),
            vec!["package\tavailable\tbash;5.3-1;x86_64;testing\t"]
        );
    }

    #[test]
    fn test_search_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(&dir);
        backend.search_file(&FilterSet::none(), &["/usr/bin/s"]).unwrap();
        assert_eq!(body(&backend).len(), 1);
        assert!(body(&backend)[0].contains("bash;5.2-1"));

        let mut backend = self::backend(&dir);
        let err = backend
            .search_file(&FilterSet::not_installed(), &["usr/bin/bash"])
            .unwrap_err();
        assert!(matches!(err, BridgeError::CannotGetFileList(_)));
        assert!(body(&backend)[0].starts_with("error\tcannot-get-filelist"));
    }

    #[test]
    fn test_resolve_and_provides() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(&dir);
        backend.resolve(&FilterSet::none(), &["bash", "zsh"]).unwrap();
        let ids: Vec<String> = body(&backend)
            .iter()
            .map(|l| l.split('\t').nth(2).unwrap().to_string())
            .collect();
        assert_eq!(
            ids,
            vec![
                "bash;5.2-1;x86_64;local",
                "bash;5.3-1;x86_64;testing",
                "zsh;5.9-1;x86_64;core"
            ]
        );

        let mut backend = self::backend(&dir);
        backend.what_provides(&FilterSet::none(), &["sh"]).unwrap();
        assert_eq!(body(&backend).len(), 1);
    }

    #[test]
    fn test_dependency_queries() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(&dir);
        backend
            .depends_on(&FilterSet::none(), &["zsh;5.9-1;x86_64;core"], true)
            .unwrap();
        assert_eq!(
            body(&backend),
            vec!["package\tinstalled\tglibc;2.38-1;x86_64;local\tGNU C Library"]
        );

        let mut backend = self::backend(&dir);
        backend
            .required_by(&FilterSet::none(), &["glibc;2.38-1;x86_64;local"], false)
            .unwrap();
        assert_eq!(body(&backend), vec!["package\tinstalled\tbash;5.2-1;x86_64;local\t"]);
    }

    #[test]
    fn test_details_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(&dir);
        backend
            .get_details(&["glibc;2.38-1;x86_64;local", "zsh;5.9-1;x86_64;core"])
            .unwrap();
        assert_eq!(
            body(&backend),
            vec![
                "details\tglibc;2.38-1;x86_64;local\tGPL LGPL\tsystem\tGNU C Library\t\t0",
                "details\tzsh;5.9-1;x86_64;core\t\tunknown\t\t\t0",
            ]
        );

        let mut backend = self::backend(&dir);
        backend.get_files(&["bash;5.2-1;x86_64;local"]).unwrap();
        assert_eq!(
            body(&backend),
            vec!["files\tbash;5.2-1;x86_64;local\tusr/bin/bash;usr/bin/sh"]
        );

        let mut backend = self::backend(&dir);
        assert!(backend.get_files(&["zsh;5.9-1;x86_64;core"]).is_err());
    }

    #[test]
    fn test_updates() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(&dir);
        backend.get_updates(&FilterSet::none()).unwrap();
        assert_eq!(
            body(&backend),
            vec![
                "package\tnormal\tglibc;2.39-1;x86_64;core\tGNU C Library",
                "package\tnormal\tbash;5.3-1;x86_64;testing\t",
            ]
        );

        let mut backend = self::backend(&dir);
        backend
            .get_update_detail(&["glibc;2.39-1;x86_64;core", "bash;5.3-1;x86_64;testing"])
            .unwrap();
        let out = body(&backend);
        let glibc: Vec<&str> = out[0].split('\t').collect();
        assert_eq!(glibc[1], "glibc;2.39-1;x86_64;core");
        assert_eq!(glibc[2], "glibc;2.38-1;x86_64;local");
        assert_eq!(glibc[4], "https://gnu.org");
        assert_eq!(glibc[10], "stable");
        assert_eq!(glibc[11], "2024-03-01T00:00:00Z");
        assert_eq!(out[1].split('\t').nth(10), Some("testing"));
    }

    #[test]
    fn test_install_simulate_reports_notice_and_packages() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(&dir);
        backend
            .install_packages(
                TransactionFlags::simulate(),
                &["glibc;2.39-1;x86_64;core", "zsh;5.9-1;x86_64;core"],
            )
            .unwrap();
        assert_eq!(
            body(&backend),
            vec![
                "status\tinstall",
                "error\tpackage-already-installed\tPackage 'glibc;2.39-1;x86_64;core' is already installed",
                "package\tinstalling\tzsh;5.9-1;x86_64;core\t",
            ]
        );
        assert!(backend.engine().calls().is_empty());
    }

    #[test]
    fn test_commit_reloads_and_malformed_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(&dir);
        backend
            .remove_packages(TransactionFlags::default(), &["baz;1.0-1;x86_64;local"])
            .unwrap();
        let calls = backend.engine().calls();
        assert!(calls.contains(&Call::Commit));
        assert_eq!(calls.last(), Some(&Call::Release));

        let mut backend = self::backend(&dir);
        let err = backend
            .install_packages(TransactionFlags::default(), &["zsh;5.9-1"])
            .unwrap_err();
        assert!(matches!(err, BridgeError::PackageNotFound(ref s) if s == "zsh;5.9-1"));
    }

    #[test]
    fn test_repo_enable_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(&dir);
        let err = backend.repo_enable("core", false).unwrap_err();
        assert!(matches!(err, BridgeError::RepositoryProtected(_)));
        assert!(backend.repo_enable("local", false).is_err());

        backend.repo_enable("testing", false).unwrap();
        let saved = Blacklist::load(&dir.path().join("blacklist.json")).unwrap();
        assert_eq!(saved.blocked, vec!["testing"]);

        // a new backend starts with the blacklisted repository disabled
        let mut backend = self::backend(&dir);
        assert_eq!(backend.cache().is_enabled("testing"), Some(false));
        backend.get_repo_list().unwrap();
        assert_eq!(
            body(&backend),
            vec!["repo-detail\tcore\tcore\ttrue", "repo-detail\ttesting\ttesting\tfalse"]
        );

        let mut backend = self::backend(&dir);
        backend.repo_enable("testing", true).unwrap();
        assert!(Blacklist::load(&dir.path().join("blacklist.json"))
            .unwrap()
            .blocked
            .is_empty());
    }

    #[test]
    fn test_refresh_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(&dir);
        backend.refresh_cache(true).unwrap();
        assert_eq!(
            backend.engine().calls(),
            vec![
                Call::Refresh("core".to_string(), true),
                Call::Refresh("testing".to_string(), true),
            ]
        );
        assert_eq!(lines(&backend)[0], "status\trefresh-cache");
        assert_eq!(lines(&backend)[1], "allow-cancel\tfalse");
    }
}
