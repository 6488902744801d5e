//! Error types for the shellkit host and presenter.

/// Top-level error type for the update coordinator, bridge, and presenter.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// Update check failed (feed unreachable, bad response, bad version).
    #[error("update check failed: {0}")]
    Check(String),

    /// Update artifact download or verification failed.
    #[error("update download failed: {0}")]
    Download(String),

    /// Applying a downloaded update failed.
    #[error("update install failed: {0}")]
    Install(String),

    /// The messaging bridge between host and UI is not present.
    #[error("bridge unavailable: {0}")]
    BridgeUnavailable(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Malformed command, response, or event envelope.
    #[error("contract error: {0}")]
    Contract(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// User-facing failure categories. All of them are non-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CheckFailure,
    DownloadFailure,
    InstallFailure,
    BridgeUnavailable,
    Internal,
}

impl ShellError {
    /// Classify this error into the user-facing taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Check(_) => ErrorKind::CheckFailure,
            Self::Download(_) => ErrorKind::DownloadFailure,
            Self::Install(_) => ErrorKind::InstallFailure,
            Self::BridgeUnavailable(_) => ErrorKind::BridgeUnavailable,
            Self::Channel(_) | Self::Contract(_) | Self::Config(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ShellError>;
