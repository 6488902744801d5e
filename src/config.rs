//! Configuration types for the shellkit host.

use crate::error::{Result, ShellError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the host process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Self-update settings.
    pub update: UpdateConfig,
    /// Host/UI bridge settings.
    pub bridge: BridgeConfig,
}

/// Whether this process is a development or production build.
///
/// Update checks are skipped entirely in development builds so local
/// testing never walks a real update flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildProfile {
    Development,
    Production,
}

impl BuildProfile {
    /// Profile implied by how this binary was compiled, overridable with
    /// `SHELLKIT_ENV=development|production`.
    #[must_use]
    pub fn detect() -> Self {
        if let Ok(raw) = std::env::var("SHELLKIT_ENV")
            && let Some(profile) = Self::parse(&raw)
        {
            return profile;
        }
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl Default for BuildProfile {
    fn default() -> Self {
        Self::detect()
    }
}

/// User preference for the download/install confirmation prompts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoUpdatePreference {
    /// Show a dialog each time (default).
    #[default]
    Ask,
    /// Proceed without asking.
    Always,
    /// Never proceed automatically; the user must act from the UI.
    Never,
}

impl std::fmt::Display for AutoUpdatePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ask => write!(f, "ask"),
            Self::Always => write!(f, "always"),
            Self::Never => write!(f, "never"),
        }
    }
}

/// Self-update configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// URL of the JSON release feed. Updates are disabled when unset.
    pub feed_url: Option<String>,
    /// Development builds never contact the feed.
    pub build_profile: BuildProfile,
    /// Run one check shortly after launch.
    pub check_on_startup: bool,
    /// Delay before the startup check, in milliseconds.
    pub startup_delay_ms: u64,
    /// Prompt policy for downloading and restarting.
    pub auto_download: AutoUpdatePreference,
    /// Apply a downloaded update when the app quits normally.
    pub auto_install_on_quit: bool,
    /// HTTP timeout for feed and artifact requests, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            feed_url: None,
            build_profile: BuildProfile::default(),
            check_on_startup: true,
            startup_delay_ms: 3_000,
            auto_download: AutoUpdatePreference::default(),
            auto_install_on_quit: false,
            request_timeout_secs: 30,
        }
    }
}

/// Host/UI bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Pending command capacity.
    pub request_capacity: usize,
    /// Event broadcast capacity.
    pub event_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_capacity: 64,
            event_capacity: 128,
        }
    }
}

impl ShellConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ShellError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.is_file() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ShellError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ShellConfig::default();
        assert!(config.update.feed_url.is_none());
        assert!(config.update.check_on_startup);
        assert_eq!(config.update.startup_delay_ms, 3_000);
        assert_eq!(config.update.auto_download, AutoUpdatePreference::Ask);
        assert!(!config.update.auto_install_on_quit);
        assert!(config.bridge.request_capacity > 0);
        assert!(config.bridge.event_capacity > 0);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ShellConfig::default();
        config.update.feed_url = Some("https://updates.example.com/latest.json".to_owned());
        config.update.build_profile = BuildProfile::Production;
        config.update.auto_download = AutoUpdatePreference::Always;
        config.bridge.event_capacity = 16;

        config.save_to_file(&path).unwrap();
        let loaded = ShellConfig::from_file(&path).unwrap();

        assert_eq!(
            loaded.update.feed_url.as_deref(),
            Some("https://updates.example.com/latest.json")
        );
        assert_eq!(loaded.update.build_profile, BuildProfile::Production);
        assert_eq!(loaded.update.auto_download, AutoUpdatePreference::Always);
        assert_eq!(loaded.bridge.event_capacity, 16);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: ShellConfig = toml::from_str(
            r#"
            [update]
            build_profile = "development"
            auto_download = "never"
            "#,
        )
        .unwrap();
        assert_eq!(config.update.build_profile, BuildProfile::Development);
        assert_eq!(config.update.auto_download, AutoUpdatePreference::Never);
        assert_eq!(config.update.startup_delay_ms, 3_000);
        assert_eq!(config.bridge.request_capacity, 64);
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = ShellConfig::from_file(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[update\nfeed_url = ").unwrap();
        let err = ShellConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ShellError::Config(_)));
    }

    #[test]
    fn load_or_default_without_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ShellConfig::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.bridge.request_capacity, 64);
    }

    #[test]
    fn build_profile_parse_accepts_short_names() {
        assert_eq!(BuildProfile::parse("dev"), Some(BuildProfile::Development));
        assert_eq!(BuildProfile::parse(" PROD "), Some(BuildProfile::Production));
        assert_eq!(BuildProfile::parse("staging"), None);
    }

    #[test]
    fn auto_update_preference_display() {
        assert_eq!(AutoUpdatePreference::Ask.to_string(), "ask");
        assert_eq!(AutoUpdatePreference::Always.to_string(), "always");
        assert_eq!(AutoUpdatePreference::Never.to_string(), "never");
    }
}
