//! Update-client abstraction.
//!
//! The update-client contacts a release feed, downloads the artifact, and
//! applies it on restart. The coordinator only talks to it through
//! [`UpdateClient`] and observes its progress as [`UpdateClientEvent`]s.

use crate::error::{Result, ShellError};
use crate::update::listeners::{ListenerSet, Subscription};
use crate::update::types::UpdateProgress;
use async_trait::async_trait;

/// Lifecycle events emitted by an update-client.
///
/// `Available`, `NotAvailable` and `Downloaded` carry the client's raw
/// payload; the coordinator decides how much of it reaches the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateClientEvent {
    Checking,
    Available(serde_json::Value),
    NotAvailable(serde_json::Value),
    Error(String),
    DownloadProgress(UpdateProgress),
    Downloaded(serde_json::Value),
}

impl UpdateClientEvent {
    /// Short name for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Available(_) => "available",
            Self::NotAvailable(_) => "not-available",
            Self::Error(_) => "error",
            Self::DownloadProgress(_) => "download-progress",
            Self::Downloaded(_) => "downloaded",
        }
    }
}

pub type EventListener = Box<dyn Fn(&UpdateClientEvent) + Send + Sync + 'static>;

/// An update-client implementation.
///
/// Failures of `check_for_updates` / `download_update` are reported through
/// the returned error. An implementation must not also emit
/// [`UpdateClientEvent::Error`] for the same failure; that variant is for
/// failures the client discovers on its own.
#[async_trait]
pub trait UpdateClient: Send + Sync + 'static {
    /// Register a lifecycle listener. Dropping the handle unregisters it.
    fn subscribe(&self, listener: EventListener) -> Subscription;

    /// Query the feed. Emits `Checking` then `Available` or `NotAvailable`.
    async fn check_for_updates(&self) -> Result<()>;

    /// Download the release last reported as available.
    async fn download_update(&self) -> Result<()>;

    /// Apply a downloaded update and terminate the application.
    ///
    /// What happens when nothing has been downloaded is up to the
    /// implementation and must be documented by it.
    fn quit_and_install(&self) -> Result<()>;

    /// Hook for the normal application-quit path.
    fn install_on_quit(&self) -> Result<()> {
        Ok(())
    }

    /// Version of the running application.
    fn current_version(&self) -> String;
}

/// Stand-in used when no update feed is configured. Every check and
/// download fails with a check error; installing is a no-op.
#[derive(Default)]
pub struct UnconfiguredClient {
    version: String,
    listeners: ListenerSet<UpdateClientEvent>,
}

impl UnconfiguredClient {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            listeners: ListenerSet::new(),
        }
    }
}

#[async_trait]
impl UpdateClient for UnconfiguredClient {
    fn subscribe(&self, listener: EventListener) -> Subscription {
        self.listeners.subscribe(listener)
    }

    async fn check_for_updates(&self) -> Result<()> {
        Err(ShellError::Check("no update feed configured".to_owned()))
    }

    async fn download_update(&self) -> Result<()> {
        Err(ShellError::Download("no update feed configured".to_owned()))
    }

    fn quit_and_install(&self) -> Result<()> {
        tracing::warn!("quit_and_install requested but updates are not configured");
        Ok(())
    }

    fn current_version(&self) -> String {
        self.version.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_client_fails_checks() {
        let client = UnconfiguredClient::new("0.3.0");
        let err = client.check_for_updates().await.err();
        assert!(matches!(err, Some(ShellError::Check(_))));
        assert!(client.quit_and_install().is_ok());
        assert_eq!(client.current_version(), "0.3.0");
    }
}
