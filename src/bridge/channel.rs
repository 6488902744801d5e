//! Host command channel and router.

use crate::bridge::contract::{CommandEnvelope, CommandName, CommandOutcome, EventEnvelope, ResponseEnvelope};
use crate::error::{Result, ShellError};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Host-side implementation of the command surface.
pub trait CommandHandler: Send + Sync + 'static {
    fn check_for_updates(&self) -> Result<CommandOutcome>;
    fn download_update(&self) -> Result<CommandOutcome>;
    fn quit_and_install(&self) -> Result<CommandOutcome>;
    fn app_version(&self) -> String;
}

impl<T: CommandHandler> CommandHandler for Arc<T> {
    fn check_for_updates(&self) -> Result<CommandOutcome> {
        (**self).check_for_updates()
    }

    fn download_update(&self) -> Result<CommandOutcome> {
        (**self).download_update()
    }

    fn quit_and_install(&self) -> Result<CommandOutcome> {
        (**self).quit_and_install()
    }

    fn app_version(&self) -> String {
        (**self).app_version()
    }
}

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<ResponseEnvelope>,
}

/// Sending half of the command channel. Cheap to clone.
#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            ShellError::Contract(format!(
                "invalid command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| ShellError::Channel(format!("failed to send command request: {e}")))?;

        response_rx
            .await
            .map_err(|e| ShellError::Channel(format!("command response dropped: {e}")))
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Sender side of the event broadcast, for attaching as a window.
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<EventEnvelope> {
        self.event_tx.clone()
    }
}

impl std::fmt::Debug for HostCommandClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCommandClient")
            .field("subscribers", &self.event_tx.receiver_count())
            .finish()
    }
}

pub struct HostCommandServer<H: CommandHandler> {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    handler: H,
}

#[must_use]
pub fn command_channel<H: CommandHandler>(
    request_capacity: usize,
    event_capacity: usize,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));

    (
        HostCommandClient {
            request_tx,
            event_tx,
        },
        HostCommandServer {
            request_rx,
            handler,
        },
    )
}

impl<H: CommandHandler> HostCommandServer<H> {
    /// Serve requests until every client has been dropped.
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let response = self.route(&request.envelope);
            let _ = request.response_tx.send(response);
        }
    }

    /// Route a command envelope to the handler.
    ///
    /// Handler failures on the update commands become
    /// `{success: false, message}` payloads rather than error envelopes.
    pub fn route(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
        let request_id = envelope.request_id.clone();
        tracing::debug!(command = %envelope.command, request_id = %request_id, "routing command");

        let outcome = match envelope.command {
            CommandName::HostPing => {
                return ResponseEnvelope::ok(
                    request_id,
                    serde_json::json!({
                        "pong": true,
                        "contract_version": crate::bridge::contract::EVENT_VERSION
                    }),
                );
            }
            CommandName::GetAppVersion => {
                return ResponseEnvelope::ok(
                    request_id,
                    serde_json::Value::String(self.handler.app_version()),
                );
            }
            CommandName::CheckForUpdates => self.handler.check_for_updates(),
            CommandName::DownloadUpdate => self.handler.download_update(),
            CommandName::QuitAndInstall => self.handler.quit_and_install(),
        };

        let outcome = outcome.unwrap_or_else(|e| {
            tracing::warn!(command = %envelope.command, error = %e, "command failed");
            CommandOutcome::failure(e.to_string())
        });
        ResponseEnvelope::ok(request_id, outcome.to_payload())
    }
}
