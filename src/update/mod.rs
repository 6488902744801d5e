//! Self-update workflow: the update-client abstraction, its HTTP feed
//! implementation, and the coordinator that relays its lifecycle to the UI.

pub mod applier;
pub mod client;
pub mod coordinator;
pub mod feed;
pub mod listeners;
pub mod prompt;
pub mod types;

pub use applier::{BinaryInstaller, Installer, StagedUpdate};
pub use client::{UnconfiguredClient, UpdateClient, UpdateClientEvent};
pub use coordinator::UpdateCoordinator;
pub use feed::FeedUpdateClient;
pub use listeners::{ListenerSet, Subscription};
pub use prompt::{PromptHandler, UpdatePrompt};
pub use types::{UpdateInfo, UpdateProgress};
