//! Update view-model and the merge rules that build it from relayed events.
//!
//! Events arrive at-least-once and possibly out of order. Every handler is a
//! partial update: fields an event does not mention keep their previous
//! value. Each transition also clears the lifecycle flags it conflicts with,
//! so at most one of `checking`, `downloading` and `downloaded` is set once
//! an event has been applied.

use crate::bridge::contract::UpdateEventName;
use crate::update::types::{UpdateInfo, UpdateProgress};

const UNKNOWN_ERROR: &str = "Unknown update error";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateState {
    pub checking: bool,
    pub available: bool,
    pub downloading: bool,
    pub downloaded: bool,
    pub error: Option<String>,
    pub progress: Option<UpdateProgress>,
    pub update_info: Option<UpdateInfo>,
}

impl UpdateState {
    /// Merge one relayed event into the view-model.
    pub fn apply(&mut self, event: UpdateEventName, payload: &serde_json::Value) {
        match event {
            UpdateEventName::Checking => self.begin_check(),
            UpdateEventName::Available => {
                self.checking = false;
                self.available = true;
                self.update_info = info_from(payload);
            }
            UpdateEventName::NotAvailable => {
                self.checking = false;
                self.available = false;
                self.update_info = info_from(payload);
            }
            UpdateEventName::Error => {
                self.checking = false;
                self.downloading = false;
                self.error = Some(error_message(payload));
            }
            UpdateEventName::DownloadStarted => {
                self.checking = false;
                self.downloaded = false;
                self.downloading = true;
                self.progress = None;
                self.update_info = info_from(payload);
            }
            UpdateEventName::DownloadProgress => {
                self.checking = false;
                self.downloaded = false;
                self.downloading = true;
                match serde_json::from_value::<UpdateProgress>(payload.clone()) {
                    Ok(progress) => self.progress = Some(progress),
                    Err(e) => tracing::debug!(error = %e, "ignoring malformed progress payload"),
                }
            }
            UpdateEventName::Downloaded => {
                self.checking = false;
                self.downloading = false;
                self.downloaded = true;
                self.update_info = info_from(payload);
            }
        }
    }

    /// A check has started: clears any previous error.
    pub fn begin_check(&mut self) {
        self.checking = true;
        self.downloading = false;
        self.downloaded = false;
        self.error = None;
    }

    /// Record a command failure without touching the lifecycle flags.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// How many of `checking`, `downloading`, `downloaded` are set.
    #[must_use]
    pub fn active_lifecycles(&self) -> usize {
        [self.checking, self.downloading, self.downloaded]
            .into_iter()
            .filter(|flag| *flag)
            .count()
    }

    /// The single status a view should render.
    #[must_use]
    pub fn status(&self) -> UpdateStatus {
        let version = || {
            self.update_info
                .as_ref()
                .map(|info| info.version.clone())
                .unwrap_or_default()
        };

        if let Some(error) = &self.error {
            return UpdateStatus::Error(error.clone());
        }
        if self.downloaded {
            return UpdateStatus::Downloaded { version: version() };
        }
        if self.downloading
            && let Some(progress) = self.progress
        {
            return UpdateStatus::Downloading {
                version: version(),
                progress,
            };
        }
        if self.available {
            return UpdateStatus::Available {
                version: version(),
                release_notes: self
                    .update_info
                    .as_ref()
                    .and_then(|info| info.release_notes.clone()),
            };
        }
        if self.checking {
            return UpdateStatus::Checking;
        }
        UpdateStatus::UpToDate
    }

    /// The check command is disabled while a download is running.
    #[must_use]
    pub fn can_check(&self) -> bool {
        !self.downloading
    }
}

/// What to show, in priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateStatus {
    Error(String),
    Downloaded {
        version: String,
    },
    Downloading {
        version: String,
        progress: UpdateProgress,
    },
    Available {
        version: String,
        release_notes: Option<String>,
    },
    Checking,
    UpToDate,
}

/// Download percent rounded to a whole number for display.
#[must_use]
pub fn rounded_percent(progress: &UpdateProgress) -> u8 {
    progress.percent.clamp(0.0, 100.0).round() as u8
}

/// Bytes rendered as megabytes with two decimals, e.g. `4.31 MB`.
#[must_use]
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

fn info_from(payload: &serde_json::Value) -> Option<UpdateInfo> {
    payload.is_object().then(|| UpdateInfo::normalize(payload))
}

fn error_message(payload: &serde_json::Value) -> String {
    match payload {
        serde_json::Value::String(message) if !message.is_empty() => message.clone(),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| UNKNOWN_ERROR.to_owned(), ToOwned::to_owned),
        _ => UNKNOWN_ERROR.to_owned(),
    }
}
