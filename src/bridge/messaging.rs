//! UI-side view of the bridge.
//!
//! Whether the bridge exists is decided once, when the channel is built.
//! Every call on an [`MessagingChannel::Unavailable`] channel fails with
//! [`ShellError::BridgeUnavailable`] instead of panicking.

use crate::bridge::channel::HostCommandClient;
use crate::bridge::contract::{CommandEnvelope, CommandName, EventEnvelope};
use crate::error::{Result, ShellError};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum MessagingChannel {
    Available(HostCommandClient),
    Unavailable,
}

impl MessagingChannel {
    /// Build from an optional bridge client.
    #[must_use]
    pub fn detect(client: Option<HostCommandClient>) -> Self {
        match client {
            Some(client) => Self::Available(client),
            None => {
                tracing::warn!("messaging bridge not present; updates are unavailable");
                Self::Unavailable
            }
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Invoke `command` and return the response payload.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::BridgeUnavailable`] on an unavailable channel,
    /// a channel error if the host is gone, or the host's error message for
    /// a rejected command.
    pub async fn invoke(&self, command: CommandName) -> Result<serde_json::Value> {
        let Self::Available(client) = self else {
            return Err(ShellError::BridgeUnavailable(format!(
                "cannot invoke {command}"
            )));
        };

        let envelope = CommandEnvelope::new(
            uuid::Uuid::new_v4().to_string(),
            command,
            serde_json::json!({}),
        );
        let response = client.send(envelope).await?;
        if response.ok {
            Ok(response.payload)
        } else {
            Err(ShellError::Channel(response.error.unwrap_or_else(|| {
                format!("{command} rejected by host")
            })))
        }
    }

    /// Subscribe to relayed events. `None` on an unavailable channel.
    #[must_use]
    pub fn subscribe(&self) -> Option<broadcast::Receiver<EventEnvelope>> {
        match self {
            Self::Available(client) => Some(client.subscribe_events()),
            Self::Unavailable => None,
        }
    }
}
