//! UI-side update presenter.
//!
//! [`UpdatePresenter`] owns the update view-model for as long as it is
//! mounted. It subscribes to relayed events when mounted, issues commands
//! through the [`MessagingChannel`], and drops its subscription on
//! [`UpdatePresenter::unmount`].

pub mod state;

pub use state::{UpdateState, UpdateStatus, format_megabytes, rounded_percent};

use crate::bridge::contract::{CommandName, CommandOutcome, EventEnvelope, UpdateEventName};
use crate::bridge::messaging::MessagingChannel;
use crate::error::{ErrorKind, ShellError};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

pub const CHECK_FAILED: &str = "Update check failed";
pub const DOWNLOAD_FAILED: &str = "Download failed";
pub const INSTALL_FAILED: &str = "Install failed";
pub const BRIDGE_UNAVAILABLE: &str = "Updates are unavailable: bridge not present";

#[derive(Debug)]
pub struct UpdatePresenter {
    channel: MessagingChannel,
    state: UpdateState,
    app_version: String,
    events: Option<broadcast::Receiver<EventEnvelope>>,
}

impl UpdatePresenter {
    /// Subscribe to update events and fetch the running app version.
    pub async fn mount(channel: MessagingChannel) -> Self {
        let events = channel.subscribe();
        let mut presenter = Self {
            channel,
            state: UpdateState::default(),
            app_version: String::new(),
            events,
        };
        presenter.refresh_app_version().await;
        presenter
    }

    #[must_use]
    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    #[must_use]
    pub fn status(&self) -> UpdateStatus {
        self.state.status()
    }

    /// Empty until the host has answered `get-app-version`.
    #[must_use]
    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.channel.is_available()
    }

    /// Ask the host for a check. Optimistically shows `checking`.
    pub async fn check_for_updates(&mut self) {
        self.state.begin_check();
        let result = self.channel.invoke(CommandName::CheckForUpdates).await;
        if let Ok(payload) = &result
            && payload.get("skipped").and_then(serde_json::Value::as_bool) == Some(true)
        {
            tracing::debug!("host skipped the update check");
            self.state.checking = false;
            return;
        }
        if let Some(message) = failure_message(result, CHECK_FAILED) {
            self.state.checking = false;
            self.state.fail(message);
        }
    }

    /// Ask the host to download the available update.
    pub async fn download_update(&mut self) {
        let result = self.channel.invoke(CommandName::DownloadUpdate).await;
        if let Some(message) = failure_message(result, DOWNLOAD_FAILED) {
            self.state.fail(message);
        }
    }

    /// Ask the host to restart and install. The view-model is left alone
    /// because the process is expected to exit.
    pub async fn quit_and_install(&mut self) {
        match self.channel.invoke(CommandName::QuitAndInstall).await {
            Err(e) if e.kind() == ErrorKind::BridgeUnavailable => {
                self.state.fail(BRIDGE_UNAVAILABLE);
            }
            result => {
                if let Some(reason) = failure_message(result, INSTALL_FAILED) {
                    tracing::warn!(reason = %reason, "install failed");
                    self.state.fail(INSTALL_FAILED);
                }
            }
        }
    }

    pub async fn refresh_app_version(&mut self) {
        match self.channel.invoke(CommandName::GetAppVersion).await {
            Ok(serde_json::Value::String(version)) => self.app_version = version,
            Ok(other) => {
                tracing::warn!(payload = %other, "unexpected app version payload");
            }
            Err(e) => tracing::warn!(error = %e, "failed to fetch app version"),
        }
    }

    /// Apply one envelope. Returns `false` for events that are not update
    /// events.
    pub fn handle_envelope(&mut self, envelope: &EventEnvelope) -> bool {
        apply_envelope(&mut self.state, envelope)
    }

    /// Apply every event already waiting. Returns how many were applied.
    pub fn drain(&mut self) -> usize {
        let Some(events) = self.events.as_mut() else {
            return 0;
        };
        let mut applied = 0;
        loop {
            match events.try_recv() {
                Ok(envelope) => {
                    if apply_envelope(&mut self.state, &envelope) {
                        applied += 1;
                    }
                }
                Err(TryRecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "presenter lagged; some events were dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        applied
    }

    /// Wait for the next update event and apply it.
    ///
    /// Returns `None` once the host is gone or when no bridge is present.
    pub async fn next_event(&mut self) -> Option<UpdateEventName> {
        let events = self.events.as_mut()?;
        loop {
            match events.recv().await {
                Ok(envelope) => {
                    if let Some(event) = envelope.update_event() {
                        self.state.apply(event, &envelope.payload);
                        return Some(event);
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "presenter lagged; some events were dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Drop the event subscription. The view-model is discarded with it.
    pub fn unmount(mut self) {
        if self.events.take().is_some() {
            tracing::debug!("update presenter unsubscribed");
        }
    }
}

fn apply_envelope(state: &mut UpdateState, envelope: &EventEnvelope) -> bool {
    match envelope.update_event() {
        Some(event) => {
            state.apply(event, &envelope.payload);
            true
        }
        None => false,
    }
}

/// The user-facing error for a command result, or `None` on success.
fn failure_message(
    result: crate::error::Result<serde_json::Value>,
    fallback: &str,
) -> Option<String> {
    match result {
        Ok(payload) => match serde_json::from_value::<CommandOutcome>(payload) {
            Ok(outcome) if outcome.success => None,
            Ok(outcome) if !outcome.message.is_empty() => Some(outcome.message),
            _ => Some(fallback.to_owned()),
        },
        Err(e) => Some(error_message(&e, fallback)),
    }
}

fn error_message(e: &ShellError, fallback: &str) -> String {
    if e.kind() == ErrorKind::BridgeUnavailable {
        BRIDGE_UNAVAILABLE.to_owned()
    } else {
        tracing::warn!(error = %e, "update command failed");
        fallback.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsuccessful_outcome_uses_host_message() {
        let payload = serde_json::json!({"success": false, "message": "feed not configured"});
        assert_eq!(
            failure_message(Ok(payload), CHECK_FAILED).as_deref(),
            Some("feed not configured")
        );
    }

    #[test]
    fn unsuccessful_outcome_without_message_uses_fallback() {
        let payload = serde_json::json!({"success": false, "message": ""});
        assert_eq!(
            failure_message(Ok(payload), CHECK_FAILED).as_deref(),
            Some(CHECK_FAILED)
        );
    }

    #[test]
    fn transport_error_uses_fallback() {
        let err = ShellError::Channel("host gone".to_owned());
        assert_eq!(
            failure_message(Err(err), INSTALL_FAILED).as_deref(),
            Some(INSTALL_FAILED)
        );
    }

    #[test]
    fn non_update_envelope_is_ignored() {
        let mut state = UpdateState::default();
        let envelope = EventEnvelope::new("e1", "window.focused", serde_json::Value::Null);
        assert!(!apply_envelope(&mut state, &envelope));
        assert_eq!(state, UpdateState::default());
    }
}
