//! Update payload types shared by the coordinator and the presenter.

use serde::{Deserialize, Serialize};

/// Snapshot of a release, as relayed on `available` / `downloaded` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub version: String,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
}

impl UpdateInfo {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            release_notes: None,
            release_date: None,
        }
    }

    #[must_use]
    pub fn with_release_notes(mut self, notes: impl Into<String>) -> Self {
        self.release_notes = Some(notes.into());
        self
    }

    #[must_use]
    pub fn with_release_date(mut self, date: impl Into<String>) -> Self {
        self.release_date = Some(date.into());
        self
    }

    /// Coerce an arbitrary update-client payload into this shape.
    ///
    /// Unknown fields are dropped. A `releaseNotes` that is not a string
    /// (e.g. a per-version notes array) becomes `None`. A numeric version is
    /// rendered as text; a missing one becomes empty.
    #[must_use]
    pub fn normalize(raw: &serde_json::Value) -> Self {
        let version = match raw.get("version") {
            Some(serde_json::Value::String(v)) => v.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let release_notes = raw
            .get("releaseNotes")
            .and_then(serde_json::Value::as_str)
            .map(ToOwned::to_owned);
        let release_date = raw
            .get("releaseDate")
            .and_then(serde_json::Value::as_str)
            .map(ToOwned::to_owned);
        Self {
            version,
            release_notes,
            release_date,
        }
    }

    /// Serialize into the relayed JSON shape.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "version": self.version,
            "releaseNotes": self.release_notes,
            "releaseDate": self.release_date,
        })
    }
}

/// Download progress, superseded by each new report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgress {
    #[serde(default)]
    pub bytes_per_second: f64,
    /// 0.0 to 100.0.
    pub percent: f64,
    pub transferred: u64,
    pub total: u64,
}

impl UpdateProgress {
    /// Build a progress report, deriving `percent` from the byte counts.
    ///
    /// An unknown total (`0`) reports 0 percent.
    #[must_use]
    pub fn from_bytes(transferred: u64, total: u64, bytes_per_second: f64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            ((transferred as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
        };
        Self {
            bytes_per_second,
            percent,
            transferred,
            total,
        }
    }

    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "bytesPerSecond": self.bytes_per_second,
            "percent": self.percent,
            "transferred": self.transferred,
            "total": self.total,
        })
    }
}
