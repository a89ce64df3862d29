use anyhow::Result;
use std::path::{Path, PathBuf};

const KEYROLL_DIR: &str = ".keyroll";
const CONFIG_FILE: &str = "config.toml";
const LOGS_DIR: &str = "logs";

/// Environment variable to override the keyroll state directory.
const KEYROLL_DIR_ENV: &str = "KEYROLL_DIR";

/// Resolve the keyroll state directory.
/// Priority: KEYROLL_DIR env var > ~/.keyroll/
pub fn resolve_keyroll_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(KEYROLL_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|h| h.join(KEYROLL_DIR))
        .ok_or_else(|| anyhow::anyhow!("Failed to determine home directory"))
}

/// Ensure the keyroll directory exists and return its path.
pub fn ensure_keyroll_dir() -> Result<PathBuf> {
    let dir = resolve_keyroll_dir()?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Get the default config file path: ~/.keyroll/config.toml
pub fn config_path() -> Result<PathBuf> {
    Ok(resolve_keyroll_dir()?.join(CONFIG_FILE))
}

/// Ensure the log directory exists: ~/.keyroll/logs
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let dir = ensure_keyroll_dir()?.join(LOGS_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
