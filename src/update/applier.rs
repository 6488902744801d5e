//! Platform-specific application of a downloaded update.
//!
//! Replaces the installed executable with the staged artifact using
//! platform-appropriate mechanisms (direct replace on Linux/macOS, helper
//! script on Windows).

use crate::error::{Result, ShellError};
use std::path::{Path, PathBuf};

/// A downloaded and verified artifact waiting to be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpdate {
    pub version: String,
    pub path: PathBuf,
}

/// Result of an update application attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum ApplyResult {
    /// Update applied. Restart required.
    RestartRequired {
        /// Path to the new binary.
        new_binary: PathBuf,
    },
    /// Update handed to a helper script (Windows). App should exit.
    ExitRequired {
        /// Path to the helper script that finishes the update.
        helper_script: PathBuf,
    },
}

/// Applies a staged update. Called right before the process exits.
pub trait Installer: Send + Sync + 'static {
    fn install(&self, staged: &StagedUpdate) -> Result<ApplyResult>;
}

/// Installs by replacing a single executable on disk.
#[derive(Debug, Clone)]
pub struct BinaryInstaller {
    target: PathBuf,
}

impl BinaryInstaller {
    #[must_use]
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// Installer targeting the currently running executable.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be determined.
    pub fn for_current_exe() -> Result<Self> {
        Ok(Self::new(current_exe_path()?))
    }

    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Installer for BinaryInstaller {
    fn install(&self, staged: &StagedUpdate) -> Result<ApplyResult> {
        if !staged.path.is_file() {
            return Err(ShellError::Install(format!(
                "staged update {} is missing at {}",
                staged.version,
                staged.path.display()
            )));
        }
        tracing::info!(
            version = %staged.version,
            target = %self.target.display(),
            "applying staged update"
        );
        replace_binary(&staged.path, &self.target)
    }
}

/// Returns the path to the currently running executable.
///
/// # Errors
///
/// Returns an error if the path cannot be determined.
pub fn current_exe_path() -> Result<PathBuf> {
    std::env::current_exe().map_err(|e| {
        ShellError::Install(format!("cannot determine current executable path: {e}"))
    })
}

/// Set executable permission on Unix platforms.
fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
            ShellError::Install(format!(
                "cannot set executable permission on {}: {e}",
                path.display()
            ))
        })?;
    }
    let _ = path;
    Ok(())
}

fn replace_binary(new_binary: &Path, current_binary: &Path) -> Result<ApplyResult> {
    #[cfg(not(target_os = "windows"))]
    {
        replace_binary_unix(new_binary, current_binary)
    }
    #[cfg(target_os = "windows")]
    {
        replace_binary_windows(new_binary, current_binary)
    }
}

/// Unix binary replacement: rename old → backup, copy new → target.
#[cfg(not(target_os = "windows"))]
fn replace_binary_unix(new_binary: &Path, current_binary: &Path) -> Result<ApplyResult> {
    let backup = current_binary.with_extension("old");

    if current_binary.exists() {
        std::fs::rename(current_binary, &backup).map_err(|e| {
            ShellError::Install(format!(
                "cannot backup current binary {} → {}: {e}",
                current_binary.display(),
                backup.display()
            ))
        })?;
    }

    std::fs::copy(new_binary, current_binary).map_err(|e| {
        if backup.exists() {
            let _ = std::fs::rename(&backup, current_binary);
        }
        ShellError::Install(format!(
            "cannot install new binary to {}: {e}",
            current_binary.display()
        ))
    })?;

    set_executable(current_binary)?;

    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("xattr")
            .args(["-c", &current_binary.to_string_lossy()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
    }

    let _ = std::fs::remove_file(&backup);
    let _ = std::fs::remove_file(new_binary);

    tracing::info!("binary updated at {}", current_binary.display());
    Ok(ApplyResult::RestartRequired {
        new_binary: current_binary.to_owned(),
    })
}

/// Windows binary replacement: the running executable is locked, so a
/// helper script waits for exit, copies, and relaunches.
#[cfg(target_os = "windows")]
fn replace_binary_windows(new_binary: &Path, current_binary: &Path) -> Result<ApplyResult> {
    let script_path = std::env::temp_dir().join("shellkit-update.bat");
    let script = format!(
        r#"@echo off
timeout /t 2 /nobreak >nul
copy /y "{new}" "{current}" >nul
if errorlevel 1 exit /b 1
start "" "{current}"
del "%~f0"
"#,
        new = new_binary.display(),
        current = current_binary.display()
    );

    std::fs::write(&script_path, script).map_err(|e| {
        ShellError::Install(format!(
            "cannot write update script to {}: {e}",
            script_path.display()
        ))
    })?;

    std::process::Command::new("cmd")
        .args(["/C", "start", "", "/min"])
        .arg(&script_path)
        .spawn()
        .map_err(|e| ShellError::Install(format!("cannot launch update script: {e}")))?;

    tracing::info!("update script written to {}", script_path.display());
    Ok(ApplyResult::ExitRequired {
        helper_script: script_path,
    })
}
