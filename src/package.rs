use crate::error::{BridgeError, BridgeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the repository holding installed packages.
pub const LOCAL_REPOSITORY: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstallReason {
    #[default]
    Explicit,
    Dependency,
}

/// Identity of one package record, encoded on the wire as
/// `name;version;arch;repository`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    pub name: String,
    pub version: String,
    pub arch: String,
    pub repository: String,
}

impl PackageId {
    pub fn new(name: &str, version: &str, arch: &str, repository: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            arch: arch.to_string(),
            repository: repository.to_string(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.repository == LOCAL_REPOSITORY
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{};{}",
            self.name, self.version, self.arch, self.repository
        )
    }
}

impl FromStr for PackageId {
    type Err = BridgeError;

    fn from_str(s: &str) -> BridgeResult<Self> {
        let fields: Vec<&str> = s.split(';').collect();
        match fields.as_slice() {
            [name, version, arch, repository] if !name.is_empty() && !version.is_empty() => {
                Ok(PackageId::new(name, version, arch, repository))
            }
            _ => Err(BridgeError::InternalLookupFailure(s.to_string())),
        }
    }
}

/// Metadata of one package as found in one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub arch: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub installed_size: u64,
    #[serde(default)]
    pub build_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub install_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub reason: InstallReason,
}

impl PackageRecord {
    pub fn new(name: &str, version: &str, arch: &str, repository: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            arch: arch.to_string(),
            repository: repository.to_string(),
            description: String::new(),
            licenses: Vec::new(),
            url: String::new(),
            filename: String::new(),
            installed_size: 0,
            build_date: None,
            install_date: None,
            depends: Vec::new(),
            provides: Vec::new(),
            groups: Vec::new(),
            files: Vec::new(),
            reason: InstallReason::Explicit,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_depends(mut self, depends: &[&str]) -> Self {
        self.depends = depends.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_provides(mut self, provides: &[&str]) -> Self {
        self.provides = provides.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn with_licenses(mut self, licenses: &[&str]) -> Self {
        self.licenses = licenses.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_files(mut self, files: &[&str]) -> Self {
        self.files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_reason(mut self, reason: InstallReason) -> Self {
        self.reason = reason;
        self
    }

    pub fn id(&self) -> PackageId {
        PackageId::new(&self.name, &self.version, &self.arch, &self.repository)
    }

    pub fn is_installed(&self) -> bool {
        self.repository == LOCAL_REPOSITORY
    }

    /// Free unless one of the licenses is a custom one.
    pub fn is_free(&self) -> bool {
        !self.licenses.iter().any(|l| l.contains("custom"))
    }

    /// Archive file name; falls back to the usual
    /// `name-version-arch.pkg.tar.zst` when the database has none.
    pub fn file_name(&self) -> String {
        if self.filename.is_empty() {
            format!("{}-{}-{}.pkg.tar.zst", self.name, self.version, self.arch)
        } else {
            self.filename.clone()
        }
    }
}
