//! Versioned command/response/event envelopes for the host/UI bridge.

use serde::{Deserialize, Serialize};

/// Contract version for command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Prefix shared by every relayed update event.
pub const EVENT_PREFIX: &str = "auto-updater-";

/// Commands the UI may invoke on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "check-for-updates")]
    CheckForUpdates,
    #[serde(rename = "download-update")]
    DownloadUpdate,
    #[serde(rename = "quit-and-install")]
    QuitAndInstall,
    #[serde(rename = "get-app-version")]
    GetAppVersion,
}

impl CommandName {
    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::CheckForUpdates => "check-for-updates",
            Self::DownloadUpdate => "download-update",
            Self::QuitAndInstall => "quit-and-install",
            Self::GetAppVersion => "get-app-version",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "host.ping" => Some(Self::HostPing),
            "check-for-updates" => Some(Self::CheckForUpdates),
            "download-update" => Some(Self::DownloadUpdate),
            "quit-and-install" => Some(Self::QuitAndInstall),
            "get-app-version" => Some(Self::GetAppVersion),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Update lifecycle events relayed from host to UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateEventName {
    Checking,
    Available,
    NotAvailable,
    Error,
    DownloadStarted,
    DownloadProgress,
    Downloaded,
}

impl UpdateEventName {
    pub const ALL: [Self; 7] = [
        Self::Checking,
        Self::Available,
        Self::NotAvailable,
        Self::Error,
        Self::DownloadStarted,
        Self::DownloadProgress,
        Self::Downloaded,
    ];

    /// Event name without the shared prefix, e.g. `update-available`.
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Checking => "update-checking",
            Self::Available => "update-available",
            Self::NotAvailable => "update-not-available",
            Self::Error => "update-error",
            Self::DownloadStarted => "update-download-started",
            Self::DownloadProgress => "update-download-progress",
            Self::Downloaded => "update-downloaded",
        }
    }

    /// Full wire name, e.g. `auto-updater-update-available`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checking => "auto-updater-update-checking",
            Self::Available => "auto-updater-update-available",
            Self::NotAvailable => "auto-updater-update-not-available",
            Self::Error => "auto-updater-update-error",
            Self::DownloadStarted => "auto-updater-update-download-started",
            Self::DownloadProgress => "auto-updater-update-download-progress",
            Self::Downloaded => "auto-updater-update-downloaded",
        }
    }

    /// Parse a full wire name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let short = raw.strip_prefix(EVENT_PREFIX)?;
        Self::ALL.into_iter().find(|e| e.short_name() == short)
    }
}

impl std::fmt::Display for UpdateEventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload returned by the check / download / install commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
    /// The host accepted the command but did nothing, so no events follow.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

impl CommandOutcome {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            skipped: false,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            skipped: false,
        }
    }

    #[must_use]
    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            skipped: true,
        }
    }

    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::json!({"success": self.success, "message": self.message});
        if self.skipped {
            payload["skipped"] = serde_json::Value::Bool(true);
        }
        payload
    }
}

/// A versioned response envelope from host -> UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// A versioned command envelope from UI -> host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from host -> UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }

    /// Build an update event envelope with a fresh event id.
    #[must_use]
    pub fn update(event: UpdateEventName, payload: serde_json::Value) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), event.as_str(), payload)
    }

    /// The update event this envelope carries, if it is one.
    #[must_use]
    pub fn update_event(&self) -> Option<UpdateEventName> {
        UpdateEventName::parse(&self.event)
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}

impl From<ContractError> for crate::error::ShellError {
    fn from(e: ContractError) -> Self {
        Self::Contract(e.to_string())
    }
}
