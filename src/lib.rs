//! Shellkit: host-side update workflow and UI bridge for a desktop app shell.
//!
//! The privileged host process owns an [`UpdateCoordinator`] that wraps an
//! update-client and relays its lifecycle to every attached UI window. The
//! UI side runs an [`UpdatePresenter`] that folds those relayed events into
//! a view-model and issues commands back over the bridge.
//!
//! # Architecture
//!
//! - **update**: update-client trait, HTTP feed client, installer, prompts,
//!   and the coordinator
//! - **bridge**: versioned envelopes, command routing, window fan-out, and
//!   the newline-delimited JSON transport
//! - **presenter**: the UI-side view-model and its merge rules

pub mod app_dirs;
pub mod bridge;
pub mod config;
pub mod error;
pub mod presenter;
pub mod update;

pub use config::ShellConfig;
pub use error::{ErrorKind, Result, ShellError};
pub use presenter::{UpdatePresenter, UpdateState, UpdateStatus};
pub use update::{UpdateCoordinator, UpdateInfo, UpdateProgress};
