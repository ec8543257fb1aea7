//! The package-database engine as seen from the bridge: a source of
//! repositories and a transaction factory.

use crate::{
    error::BridgeResult,
    package::PackageRecord,
    repository::Repository,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Flags handed to the engine when a transaction starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOptions {
    pub force: bool,
    pub needed: bool,
    pub cascade: bool,
    pub unneeded: bool,
    pub recurse: bool,
    pub download_only: bool,
    pub only_trusted: bool,
}

impl TransactionOptions {
    pub fn install() -> Self {
        Self {
            force: true,
            needed: true,
            ..Default::default()
        }
    }

    pub fn remove(recurse: bool) -> Self {
        Self {
            cascade: true,
            unneeded: true,
            recurse,
            ..Default::default()
        }
    }

    pub fn update() -> Self {
        Self {
            needed: true,
            ..Default::default()
        }
    }

    pub fn download() -> Self {
        Self {
            force: true,
            download_only: true,
            ..Default::default()
        }
    }

    pub fn only_trusted(mut self, only_trusted: bool) -> Self {
        self.only_trusted = only_trusted;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetAction {
    Add,
    Remove,
}

impl fmt::Display for TargetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAction::Add => write!(f, "add"),
            TargetAction::Remove => write!(f, "remove"),
        }
    }
}

/// One open transaction. `release` is called exactly once, whatever happened
/// before it.
pub trait TransactionHandle {
    fn add_target(&mut self, pkg: &PackageRecord, action: TargetAction) -> BridgeResult<()>;
    fn prepare(&mut self) -> BridgeResult<()>;
    fn commit(&mut self) -> BridgeResult<()>;
    fn release(&mut self);
}

pub trait PackageEngine {
    /// The local database followed by the sync databases in configured order.
    fn load_repositories(&self) -> BridgeResult<(Repository, Vec<Repository>)>;

    fn refresh_repository(&mut self, name: &str, force: bool) -> BridgeResult<()>;

    fn begin_transaction(
        &mut self,
        options: TransactionOptions,
    ) -> BridgeResult<Box<dyn TransactionHandle + '_>>;

    fn cache_directory(&self) -> PathBuf;

    fn set_cache_directory(&mut self, path: &Path);
}

/// Runs one transaction over `targets`: begin, add every target, prepare,
/// commit. The handle is released on every path.
pub fn run_transaction(
    engine: &mut dyn PackageEngine,
    options: TransactionOptions,
    targets: &[&PackageRecord],
    action: TargetAction,
) -> BridgeResult<()> {
    debug!(
        "Starting transaction ({}) for {} package(s) with {:?}",
        action,
        targets.len(),
        options
    );
    let mut handle = engine.begin_transaction(options)?;
    let result = drive(handle.as_mut(), targets, action);
    if let Err(ref e) = result {
        warn!("Transaction failed: {}", e);
    }
    handle.release();
    result
}

fn drive(
    handle: &mut dyn TransactionHandle,
    targets: &[&PackageRecord],
    action: TargetAction,
) -> BridgeResult<()> {
    for pkg in targets {
        handle.add_target(pkg, action)?;
    }
    handle.prepare()?;
    handle.commit()
}

/// Same as [`run_transaction`] but with the engine's cache directory pointed
/// at `directory` for the duration of the call.
pub fn run_download(
    engine: &mut dyn PackageEngine,
    options: TransactionOptions,
    targets: &[&PackageRecord],
    directory: &Path,
) -> BridgeResult<()> {
    let previous = engine.cache_directory();
    engine.set_cache_directory(directory);
    let result = run_transaction(engine, options, targets, TargetAction::Add);
    engine.set_cache_directory(&previous);
    result
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory engine recording every call, shared by the module tests.

    use super::*;
    use crate::error::BridgeError;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Refresh(String, bool),
        Begin(TransactionOptions),
        Add(String, TargetAction),
        Prepare,
        Commit,
        Release,
        CacheDir(PathBuf),
    }

    #[derive(Default)]
    pub struct RecordingEngine {
        pub local: Vec<PackageRecord>,
        pub remotes: Vec<(String, Vec<PackageRecord>)>,
        pub calls: Rc<RefCell<Vec<Call>>>,
        pub fail_prepare: bool,
        pub cache_dir: PathBuf,
    }

    impl RecordingEngine {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }
    }

    struct RecordingHandle {
        calls: Rc<RefCell<Vec<Call>>>,
        fail_prepare: bool,
    }

    impl TransactionHandle for RecordingHandle {
        fn add_target(&mut self, pkg: &PackageRecord, action: TargetAction) -> BridgeResult<()> {
            self.calls
                .borrow_mut()
                .push(Call::Add(pkg.id().to_string(), action));
            Ok(())
        }

        fn prepare(&mut self) -> BridgeResult<()> {
            self.calls.borrow_mut().push(Call::Prepare);
            if self.fail_prepare {
                return Err(BridgeError::TransactionError("conflicting files".into()));
            }
            Ok(())
        }

        fn commit(&mut self) -> BridgeResult<()> {
            self.calls.borrow_mut().push(Call::Commit);
            Ok(())
        }

        fn release(&mut self) {
            self.calls.borrow_mut().push(Call::Release);
        }
    }

    impl PackageEngine for RecordingEngine {
        fn load_repositories(&self) -> BridgeResult<(Repository, Vec<Repository>)> {
            Ok((
                Repository::local(self.local.clone()),
                self.remotes
                    .iter()
                    .map(|(name, pkgs)| Repository::new(name, pkgs.clone()))
                    .collect(),
            ))
        }

        fn refresh_repository(&mut self, name: &str, force: bool) -> BridgeResult<()> {
            self.calls
                .borrow_mut()
                .push(Call::Refresh(name.to_string(), force));
            Ok(())
        }

        fn begin_transaction(
            &mut self,
            options: TransactionOptions,
        ) -> BridgeResult<Box<dyn TransactionHandle + '_>> {
            self.calls.borrow_mut().push(Call::Begin(options));
            Ok(Box::new(RecordingHandle {
                calls: Rc::clone(&self.calls),
                fail_prepare: self.fail_prepare,
            }))
        }

        fn cache_directory(&self) -> PathBuf {
            self.cache_dir.clone()
        }

        fn set_cache_directory(&mut self, path: &Path) {
            self.calls
                .borrow_mut()
                .push(Call::CacheDir(path.to_path_buf()));
            self.cache_dir = path.to_path_buf();
        }
    }
}
