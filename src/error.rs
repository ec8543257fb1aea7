use thiserror::Error;

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Package '{0}' not found")]
    PackageNotFound(String),

    #[error("Package '{0}' is already installed")]
    AlreadyInstalled(String),

    #[error("Package '{0}' is not installed")]
    NotInstalled(String),

    #[error("Repository '{0}' can't be disabled")]
    RepositoryProtected(String),

    #[error("Repository '{0}' not found")]
    RepositoryNotFound(String),

    #[error("Directory '{0}' isn't writable")]
    FilesystemUnwritable(String),

    #[error("Could not find '{0}'")]
    InternalLookupFailure(String),

    #[error("Cannot get file list: {0}")]
    CannotGetFileList(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Package engine error: {0}")]
    Engine(String),
}

impl BridgeError {
    /// Error code understood by the front-end.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::PackageNotFound(_) => "package-not-found",
            BridgeError::AlreadyInstalled(_) => "package-already-installed",
            BridgeError::NotInstalled(_) => "package-not-installed",
            BridgeError::RepositoryProtected(_) => "cannot-disable-repository",
            BridgeError::RepositoryNotFound(_) => "repo-not-found",
            BridgeError::CannotGetFileList(_) => "cannot-get-filelist",
            BridgeError::TransactionError(_) => "transaction-error",
            BridgeError::ConfigError(_) | BridgeError::Toml(_) | BridgeError::TomlSer(_) => {
                "failed-config-parsing"
            }
            _ => "internal-error",
        }
    }

    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            BridgeError::PackageNotFound(_)
                | BridgeError::AlreadyInstalled(_)
                | BridgeError::NotInstalled(_)
                | BridgeError::RepositoryProtected(_)
                | BridgeError::RepositoryNotFound(_)
                | BridgeError::InvalidInput(_)
                | BridgeError::Regex(_)
        )
    }
}
