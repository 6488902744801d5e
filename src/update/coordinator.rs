//! Host-side update coordinator.
//!
//! The coordinator is the single point of contact with the update-client.
//! It turns UI commands into client calls and relays every client event to
//! all attached windows as an `auto-updater-*` message. It does not enforce
//! transition legality: events are relayed in the order the client emits
//! them, including out-of-order ones.

use crate::bridge::channel::CommandHandler;
use crate::bridge::contract::{CommandOutcome, EventEnvelope, UpdateEventName};
use crate::bridge::window::{WindowId, WindowRegistry, WindowSink};
use crate::config::BuildProfile;
use crate::error::Result;
use crate::update::client::{UpdateClient, UpdateClientEvent};
use crate::update::listeners::Subscription;
use crate::update::prompt::{PromptHandler, PromptKind, UpdatePrompt};
use crate::update::types::UpdateInfo;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Owns the update-client subscription and the set of windows to relay to.
///
/// Construct one per process and share it by reference (or `Arc`). Dropping
/// the last handle unsubscribes from the client.
pub struct UpdateCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn UpdateClient>,
    windows: WindowRegistry,
    profile: BuildProfile,
    prompts: Arc<dyn PromptHandler>,
    last_available: Mutex<Option<UpdateInfo>>,
    subscription: Mutex<Option<Subscription>>,
}

impl UpdateCoordinator {
    /// Create a coordinator and subscribe to `client`'s lifecycle events.
    #[must_use]
    pub fn new(
        client: Arc<dyn UpdateClient>,
        profile: BuildProfile,
        prompts: Arc<dyn PromptHandler>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let subscription = client.subscribe(Box::new(move |event: &UpdateClientEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_client_event(event);
                }
            }));
            Inner {
                client,
                windows: WindowRegistry::new(),
                profile,
                prompts,
                last_available: Mutex::new(None),
                subscription: Mutex::new(Some(subscription)),
            }
        });
        info!(profile = ?profile, "update coordinator ready");
        Self { inner }
    }

    #[must_use]
    pub fn windows(&self) -> &WindowRegistry {
        &self.inner.windows
    }

    pub fn attach_window(&self, window: Arc<dyn WindowSink>) -> WindowId {
        self.inner.windows.attach(window)
    }

    pub fn detach_window(&self, id: WindowId) -> bool {
        self.inner.windows.detach(id)
    }

    /// Trigger an update check.
    ///
    /// Skipped (and logged) in development builds, answering with a
    /// `skipped` outcome since no events will follow. The check runs in the
    /// background; a failure is relayed as `update-error`. Must be called
    /// from within a Tokio runtime.
    pub fn check_for_updates(&self) -> CommandOutcome {
        if self.inner.profile.is_development() {
            info!("development build; skipping update check");
            return CommandOutcome::skipped("Update check skipped in development build");
        }

        info!("checking for updates");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner.client.check_for_updates().await {
                warn!(error = %e, "update check failed");
                inner.relay(UpdateEventName::Error, serde_json::Value::String(e.to_string()));
            }
        });
        CommandOutcome::success("Checking for updates")
    }

    /// Start downloading the last update reported as available.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn download_update(&self) -> CommandOutcome {
        let started = self.inner.last_available().clone();
        tokio::spawn(Arc::clone(&self.inner).download(started));
        CommandOutcome::success("Downloading update")
    }

    /// Apply a downloaded update and terminate.
    ///
    /// There is no guard here: the request is forwarded to the client even
    /// when nothing has been downloaded, and the client decides what that
    /// means.
    pub fn quit_and_install(&self) -> Result<CommandOutcome> {
        info!("quit and install requested");
        self.inner.client.quit_and_install()?;
        Ok(CommandOutcome::success("Installing update"))
    }

    /// Hook for the normal application-quit path.
    pub fn install_on_quit(&self) -> Result<()> {
        self.inner.client.install_on_quit()
    }

    #[must_use]
    pub fn app_version(&self) -> String {
        self.inner.client.current_version()
    }

    /// Run one `check_for_updates` after `delay`, unless `shutdown` fires
    /// first.
    pub fn schedule_startup_check(
        &self,
        delay: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let coordinator = Self {
            inner: Arc::clone(&self.inner),
        };
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("shutdown before startup update check");
                }
                () = tokio::time::sleep(delay) => {
                    coordinator.check_for_updates();
                }
            }
        })
    }

    /// Stop relaying client events.
    pub fn unsubscribe(&self) {
        let subscription = lock(&self.inner.subscription).take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            debug!("update coordinator unsubscribed from client");
        }
    }
}

impl std::fmt::Debug for UpdateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("profile", &self.inner.profile)
            .field("windows", &self.inner.windows)
            .finish()
    }
}

impl CommandHandler for UpdateCoordinator {
    fn check_for_updates(&self) -> Result<CommandOutcome> {
        Ok(Self::check_for_updates(self))
    }

    fn download_update(&self) -> Result<CommandOutcome> {
        Ok(Self::download_update(self))
    }

    fn quit_and_install(&self) -> Result<CommandOutcome> {
        Self::quit_and_install(self)
    }

    fn app_version(&self) -> String {
        Self::app_version(self)
    }
}

impl Inner {
    fn on_client_event(self: Arc<Self>, event: &UpdateClientEvent) {
        debug!(event = event.name(), "update-client event");
        match event {
            UpdateClientEvent::Checking => {
                self.relay(UpdateEventName::Checking, serde_json::Value::Null);
            }
            UpdateClientEvent::Available(raw) => {
                let info = UpdateInfo::normalize(raw);
                info!(version = %info.version, "update available");
                *self.last_available() = Some(info.clone());
                self.relay(UpdateEventName::Available, info.to_payload());
                self.spawn_prompt(UpdatePrompt::download(&info), info);
            }
            UpdateClientEvent::NotAvailable(raw) => {
                *self.last_available() = None;
                self.relay(UpdateEventName::NotAvailable, raw.clone());
            }
            UpdateClientEvent::Error(message) => {
                warn!(error = %message, "update-client error");
                self.relay(
                    UpdateEventName::Error,
                    serde_json::Value::String(message.clone()),
                );
            }
            UpdateClientEvent::DownloadProgress(progress) => {
                self.relay(UpdateEventName::DownloadProgress, progress.to_payload());
            }
            UpdateClientEvent::Downloaded(raw) => {
                let info = UpdateInfo::normalize(raw);
                info!(version = %info.version, "update downloaded");
                self.relay(UpdateEventName::Downloaded, info.to_payload());
                self.spawn_prompt(UpdatePrompt::install(&info), info);
            }
        }
    }

    fn relay(&self, event: UpdateEventName, payload: serde_json::Value) {
        let envelope = EventEnvelope::update(event, payload);
        let delivered = self.windows.relay(&envelope);
        debug!(event = %event, delivered, "relayed update event");
    }

    /// Ask for confirmation without holding up the relay.
    fn spawn_prompt(self: Arc<Self>, prompt: UpdatePrompt, info: UpdateInfo) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(kind = ?prompt.kind, "no async runtime; update prompt skipped");
            return;
        };
        runtime.spawn(async move {
            let confirmed = self.prompts.confirm(&prompt).await;
            info!(kind = ?prompt.kind, version = %info.version, confirmed, "update prompt answered");
            if !confirmed {
                return;
            }
            match prompt.kind {
                PromptKind::Download => self.download(Some(info)).await,
                PromptKind::Install => {
                    if let Err(e) = self.client.quit_and_install() {
                        warn!(error = %e, "install failed");
                        self.relay(UpdateEventName::Error, serde_json::Value::String(e.to_string()));
                    }
                }
            }
        });
    }

    async fn download(self: Arc<Self>, started: Option<UpdateInfo>) {
        if let Some(info) = started {
            info!(version = %info.version, "starting update download");
            self.relay(UpdateEventName::DownloadStarted, info.to_payload());
        }
        if let Err(e) = self.client.download_update().await {
            warn!(error = %e, "update download failed");
            self.relay(UpdateEventName::Error, serde_json::Value::String(e.to_string()));
        }
    }

    fn last_available(&self) -> MutexGuard<'_, Option<UpdateInfo>> {
        lock(&self.last_available)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
