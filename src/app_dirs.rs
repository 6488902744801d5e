//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/shellkit/` | `~/.config/shellkit/` |
//! | Cache | `~/Library/Caches/shellkit/` | `~/.cache/shellkit/` |
//!
//! Overrides: `SHELLKIT_CONFIG_DIR` for [`config_dir`], `SHELLKIT_CACHE_DIR`
//! for [`cache_dir`].

use std::path::PathBuf;

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/shellkit/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SHELLKIT_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("shellkit"))
        .unwrap_or_else(|| PathBuf::from("/tmp/shellkit-config"))
}

/// Application cache directory.
///
/// Holds downloaded update artifacts, which are expendable.
#[must_use]
pub fn cache_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SHELLKIT_CACHE_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::cache_dir()
        .map(|d| d.join("shellkit"))
        .unwrap_or_else(|| PathBuf::from("/tmp/shellkit-cache"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Staging directory for a downloaded, not yet installed update.
#[must_use]
pub fn pending_update_dir() -> PathBuf {
    cache_dir().join("pending")
}
