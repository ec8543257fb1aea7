pub mod backend;
pub mod cache;
pub mod config;
pub mod dependency;
pub mod engine;
pub mod error;
pub mod filter;
pub mod package;
pub mod repository;
pub mod resolver;
pub mod snapshot;
pub mod transaction;
pub mod utils;
pub mod version;

pub use backend::{Backend, LineReporter, Reporter, Stage, Status};
pub use cache::{CacheView, PackageCache, Packages};
pub use config::{Blacklist, Config, GroupMap};
pub use dependency::{Constraint, DependencyExpr, Operator};
pub use engine::{PackageEngine, TargetAction, TransactionHandle, TransactionOptions};
pub use error::{BridgeError, BridgeResult};
pub use filter::FilterSet;
pub use package::{InstallReason, PackageId, PackageRecord, LOCAL_REPOSITORY};
pub use repository::Repository;
pub use resolver::DependencyResolver;
pub use snapshot::SnapshotEngine;
pub use transaction::{
    PackageInfo, TransactionFlags, TransactionKind, TransactionPlanner, TransactionReport,
    TransactionRequest,
};
pub use version::{is_newer, vercmp};

pub const PACBRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

use lazy_static::lazy_static;
use std::path::PathBuf;

lazy_static! {
    pub static ref PACBRIDGE_HOME: PathBuf = {
        if let Ok(home) = std::env::var("PACBRIDGE_HOME") {
            PathBuf::from(home)
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".pacbridge")
        } else {
            PathBuf::from("/tmp/.pacbridge")
        }
    };
    pub static ref PACBRIDGE_CONFIG: PathBuf = {
        if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(config_home).join("pacbridge")
        } else {
            PACBRIDGE_HOME.join("config")
        }
    };
    pub static ref PACBRIDGE_CACHE: PathBuf = {
        if let Ok(cache_home) = std::env::var("XDG_CACHE_HOME") {
            PathBuf::from(cache_home).join("pacbridge")
        } else {
            PACBRIDGE_HOME.join("cache")
        }
    };
    pub static ref PACBRIDGE_DATA: PathBuf = {
        if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
            PathBuf::from(data_home).join("pacbridge")
        } else {
            PACBRIDGE_HOME.join("data")
        }
    };
}
