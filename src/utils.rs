use crate::error::{BridgeError, BridgeResult};
use chrono::{DateTime, SecondsFormat, Utc};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Whether the current process may write into `path`.
pub fn is_writable(path: &Path) -> bool {
    let Ok(raw) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(raw.as_ptr(), libc::W_OK) == 0 }
}

pub fn require_writable(path: &Path) -> BridgeResult<()> {
    if !is_writable(path) {
        return Err(BridgeError::FilesystemUnwritable(
            path.display().to_string(),
        ));
    }
    Ok(())
}

pub fn ensure_directory(path: &Path) -> BridgeResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

pub fn get_system_arch() -> String {
    std::env::consts::ARCH.to_string()
}

/// RFC 3339 timestamp as sent to the front-end, empty when unknown.
pub fn format_date(date: Option<&DateTime<Utc>>) -> String {
    date.map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}
