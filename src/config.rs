use crate::{
    error::{BridgeError, BridgeResult},
    package::LOCAL_REPOSITORY,
    PACBRIDGE_CACHE, PACBRIDGE_CONFIG, PACBRIDGE_DATA,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sync databases in scan order.
    #[serde(default = "default_repositories")]
    pub repositories: Vec<String>,

    /// Repository that may never be disabled, besides `local`.
    #[serde(default = "default_primary_repository")]
    pub primary_repository: String,

    #[serde(default = "default_database_dir")]
    pub database_dir: PathBuf,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Where package archives are picked up from on download.
    #[serde(default = "default_pool_dir")]
    pub pool_dir: PathBuf,

    /// Upstream copies of the sync databases used by refresh.
    #[serde(default = "default_mirror_dir")]
    pub mirror_dir: PathBuf,

    #[serde(default = "default_groups_file")]
    pub groups_file: PathBuf,

    #[serde(default = "default_blacklist_file")]
    pub blacklist_file: PathBuf,

    #[serde(default = "default_arch")]
    pub arch: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repositories: default_repositories(),
            primary_repository: default_primary_repository(),
            database_dir: default_database_dir(),
            cache_dir: default_cache_dir(),
            pool_dir: default_pool_dir(),
            mirror_dir: default_mirror_dir(),
            groups_file: default_groups_file(),
            blacklist_file: default_blacklist_file(),
            arch: default_arch(),
        }
    }
}

impl Config {
    pub fn load(config_path: Option<&str>) -> BridgeResult<Self> {
        let config_path = if let Some(path) = config_path {
            PathBuf::from(path)
        } else {
            PACBRIDGE_CONFIG.join("pacbridge.toml")
        };

        if config_path.exists() && config_path.is_file() {
            debug!("Loading configuration from {}", config_path.display());
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            info!("Writing default configuration to {}", config_path.display());
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> BridgeResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if let Some(name) = self.repositories.iter().find(|r| r.as_str() == LOCAL_REPOSITORY) {
            return Err(BridgeError::ConfigError(format!(
                "'{}' is reserved for installed packages",
                name
            )));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.repositories.iter().find(|r| !seen.insert(r.as_str())) {
            return Err(BridgeError::ConfigError(format!(
                "repository '{}' listed twice",
                dup
            )));
        }
        Ok(())
    }

    /// Repositories that refuse to be disabled.
    pub fn is_protected(&self, repository: &str) -> bool {
        repository == LOCAL_REPOSITORY || repository == self.primary_repository
    }
}

/// Front-end group name to the distribution groups it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupMap(BTreeMap<String, Vec<String>>);

impl Default for GroupMap {
    fn default() -> Self {
        let entries: [(&str, &[&str]); 6] = [
            ("desktop-gnome", &["gnome", "gnome-extra"]),
            ("desktop-kde", &["plasma", "kde-applications"]),
            ("desktop-xfce", &["xfce4", "xfce4-goodies"]),
            ("fonts", &["fonts"]),
            ("programming", &["base-devel"]),
            ("system", &["base"]),
        ];
        GroupMap(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|g| g.to_string()).collect()))
                .collect(),
        )
    }
}

impl GroupMap {
    /// Reads the map, falling back to the built-in one when the file is
    /// absent.
    pub fn load(path: &Path) -> BridgeResult<Self> {
        if !path.exists() {
            debug!("No group map at {}, using defaults", path.display());
            return Ok(GroupMap::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Union of the distribution groups behind `groups`; unknown names are
    /// skipped.
    pub fn expand<S: AsRef<str>>(&self, groups: &[S]) -> Vec<String> {
        let mut expanded: Vec<String> = Vec::new();
        for group in groups {
            if let Some(members) = self.0.get(group.as_ref()) {
                for member in members {
                    if !expanded.contains(member) {
                        expanded.push(member.clone());
                    }
                }
            }
        }
        expanded
    }

    /// First front-end group covering every group of the package.
    pub fn classify(&self, groups: &[String]) -> &str {
        if groups.is_empty() {
            return "unknown";
        }
        self.0
            .iter()
            .find(|(_, members)| groups.iter().all(|g| members.contains(g)))
            .map(|(name, _)| name.as_str())
            .unwrap_or("unknown")
    }
}

/// Repositories disabled at runtime, persisted as `{"blocked": [..]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blacklist {
    #[serde(default)]
    pub blocked: Vec<String>,
}

impl Blacklist {
    pub fn load(path: &Path) -> BridgeResult<Self> {
        if !path.exists() {
            return Ok(Blacklist::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> BridgeResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Blacklist saved: {:?}", self.blocked);
        Ok(())
    }
}

fn default_repositories() -> Vec<String> {
    vec!["core".to_string(), "extra".to_string(), "multilib".to_string()]
}

fn default_primary_repository() -> String {
    "core".to_string()
}

fn default_database_dir() -> PathBuf {
    PACBRIDGE_DATA.join("db")
}

fn default_cache_dir() -> PathBuf {
    PACBRIDGE_CACHE.join("pkg")
}

fn default_pool_dir() -> PathBuf {
    PACBRIDGE_DATA.join("pool")
}

fn default_mirror_dir() -> PathBuf {
    PACBRIDGE_DATA.join("mirror")
}

fn default_groups_file() -> PathBuf {
    PACBRIDGE_CONFIG.join("groups.json")
}

fn default_blacklist_file() -> PathBuf {
    PACBRIDGE_DATA.join("blacklist.json")
}

fn default_arch() -> String {
    crate::utils::get_system_arch()
}
