//! Update coordinator: event relay, command surface, and prompts, driven by
//! a hand-operated update-client.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use shellkit::bridge::{ChannelWindow, EventEnvelope, UpdateEventName};
use shellkit::config::BuildProfile;
use shellkit::update::client::EventListener;
use shellkit::update::prompt::FixedAnswer;
use shellkit::update::{
    ListenerSet, Subscription, UpdateClient, UpdateClientEvent, UpdateCoordinator, UpdateProgress,
};
use shellkit::{Result, ShellError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct ManualClient {
    listeners: ListenerSet<UpdateClientEvent>,
    next_check_error: Mutex<Option<ShellError>>,
    checks: AtomicUsize,
    downloads: AtomicUsize,
    installs: AtomicUsize,
}

impl ManualClient {
    fn emit(&self, event: UpdateClientEvent) {
        self.listeners.emit(&event);
    }

    fn fail_next_check(&self, error: ShellError) {
        *self.next_check_error.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl UpdateClient for ManualClient {
    fn subscribe(&self, listener: EventListener) -> Subscription {
        self.listeners.subscribe(listener)
    }

    async fn check_for_updates(&self) -> Result<()> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        match self.next_check_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn download_update(&self) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn quit_and_install(&self) -> Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn current_version(&self) -> String {
        "1.0.0".to_owned()
    }
}

fn setup(
    profile: BuildProfile,
    confirm: bool,
) -> (Arc<ManualClient>, UpdateCoordinator, UnboundedReceiver<EventEnvelope>) {
    let client = Arc::new(ManualClient::default());
    let coordinator = UpdateCoordinator::new(
        Arc::clone(&client) as Arc<dyn UpdateClient>,
        profile,
        Arc::new(FixedAnswer(confirm)),
    );
    let (window, rx) = ChannelWindow::new();
    coordinator.attach_window(window);
    (client, coordinator, rx)
}

async fn next_event(rx: &mut UnboundedReceiver<EventEnvelope>) -> EventEnvelope {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for relayed event")
        .expect("window channel closed")
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn drain_names(rx: &mut UnboundedReceiver<EventEnvelope>) -> Vec<String> {
    let mut names = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        names.push(envelope.event);
    }
    names
}

#[tokio::test]
async fn every_client_event_is_relayed_with_prefixed_name() {
    let (client, _coordinator, mut rx) = setup(BuildProfile::Production, false);

    client.emit(UpdateClientEvent::Checking);
    client.emit(UpdateClientEvent::Available(serde_json::json!({"version": "1.2.0"})));
    client.emit(UpdateClientEvent::NotAvailable(serde_json::json!({"version": "1.0.0"})));
    client.emit(UpdateClientEvent::Error("network down".to_owned()));
    client.emit(UpdateClientEvent::DownloadProgress(UpdateProgress::from_bytes(
        50, 100, 10.0,
    )));
    client.emit(UpdateClientEvent::Downloaded(serde_json::json!({"version": "1.2.0"})));

    assert_eq!(
        drain_names(&mut rx),
        vec![
            "auto-updater-update-checking",
            "auto-updater-update-available",
            "auto-updater-update-not-available",
            "auto-updater-update-error",
            "auto-updater-update-download-progress",
            "auto-updater-update-downloaded",
        ]
    );
}

#[tokio::test]
async fn available_and_downloaded_payloads_are_normalized() {
    let (client, _coordinator, mut rx) = setup(BuildProfile::Production, false);
    let raw = serde_json::json!({
        "version": "1.2.0",
        "releaseNotes": [{"version": "1.2.0", "note": "html notes"}],
        "releaseDate": "2026-03-01T00:00:00Z",
        "files": [{"url": "app.zip"}],
        "sha512": "abc"
    });

    client.emit(UpdateClientEvent::Available(raw.clone()));
    client.emit(UpdateClientEvent::Downloaded(raw));

    for _ in 0..2 {
        let envelope = next_event(&mut rx).await;
        assert_eq!(
            envelope.payload,
            serde_json::json!({
                "version": "1.2.0",
                "releaseNotes": null,
                "releaseDate": "2026-03-01T00:00:00Z"
            })
        );
    }
}

#[tokio::test]
async fn other_payloads_pass_through_unchanged() {
    let (client, _coordinator, mut rx) = setup(BuildProfile::Production, false);
    let raw = serde_json::json!({"version": "1.0.0", "files": [], "custom": true});

    client.emit(UpdateClientEvent::NotAvailable(raw.clone()));
    client.emit(UpdateClientEvent::Error("disk full".to_owned()));

    assert_eq!(next_event(&mut rx).await.payload, raw);
    assert_eq!(next_event(&mut rx).await.payload, serde_json::json!("disk full"));
}

#[tokio::test]
async fn out_of_order_progress_is_relayed_as_is() {
    let (client, _coordinator, mut rx) = setup(BuildProfile::Production, false);

    client.emit(UpdateClientEvent::DownloadProgress(UpdateProgress::from_bytes(
        4_520_000, 10_000_000, 0.0,
    )));

    let envelope = next_event(&mut rx).await;
    assert_eq!(envelope.update_event(), Some(UpdateEventName::DownloadProgress));
    assert_eq!(envelope.payload["transferred"], 4_520_000);
}

#[tokio::test]
async fn destroyed_window_is_skipped() {
    let (client, coordinator, mut live_rx) = setup(BuildProfile::Production, false);
    let (dead, mut dead_rx) = ChannelWindow::new();
    coordinator.attach_window(Arc::clone(&dead) as Arc<dyn shellkit::bridge::WindowSink>);
    dead.destroy();

    client.emit(UpdateClientEvent::Checking);

    assert_eq!(drain_names(&mut live_rx).len(), 1);
    assert!(dead_rx.try_recv().is_err());
    assert_eq!(coordinator.windows().len(), 1);
}

#[tokio::test]
async fn development_build_skips_check() {
    let (client, coordinator, mut rx) = setup(BuildProfile::Development, false);

    let outcome = coordinator.check_for_updates();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(outcome.success);
    assert!(outcome.skipped);
    assert_eq!(client.checks.load(Ordering::SeqCst), 0);
    assert!(drain_names(&mut rx).is_empty());
}

#[tokio::test]
async fn failed_check_is_relayed_as_update_error() {
    let (client, coordinator, mut rx) = setup(BuildProfile::Production, false);
    client.fail_next_check(ShellError::Check("network down".to_owned()));

    let outcome = coordinator.check_for_updates();
    assert!(outcome.success);

    let envelope = next_event(&mut rx).await;
    assert_eq!(envelope.update_event(), Some(UpdateEventName::Error));
    assert!(envelope.payload.as_str().unwrap().contains("network down"));
    assert_eq!(client.checks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn confirmed_download_prompt_announces_start_then_downloads() {
    let (client, _coordinator, mut rx) = setup(BuildProfile::Production, true);

    client.emit(UpdateClientEvent::Available(serde_json::json!({"version": "1.2.0"})));

    assert_eq!(
        next_event(&mut rx).await.update_event(),
        Some(UpdateEventName::Available)
    );
    let started = next_event(&mut rx).await;
    assert_eq!(started.update_event(), Some(UpdateEventName::DownloadStarted));
    assert_eq!(started.payload["version"], "1.2.0");
    wait_until(|| client.downloads.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn declined_download_prompt_leaves_update_available() {
    let (client, _coordinator, mut rx) = setup(BuildProfile::Production, false);

    client.emit(UpdateClientEvent::Available(serde_json::json!({"version": "1.2.0"})));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(drain_names(&mut rx), vec!["auto-updater-update-available"]);
    assert_eq!(client.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn confirmed_install_prompt_quits_and_installs() {
    let (client, _coordinator, _rx) = setup(BuildProfile::Production, true);

    client.emit(UpdateClientEvent::Downloaded(serde_json::json!({"version": "1.2.0"})));

    wait_until(|| client.installs.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn quit_and_install_is_forwarded_without_a_downloaded_update() {
    let (client, coordinator, _rx) = setup(BuildProfile::Production, false);

    let outcome = coordinator.quit_and_install().unwrap();

    assert!(outcome.success);
    assert_eq!(client.installs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn download_command_reuses_last_available_info() {
    let (client, coordinator, mut rx) = setup(BuildProfile::Production, false);
    client.emit(UpdateClientEvent::Available(serde_json::json!({"version": "1.2.0"})));
    let _ = next_event(&mut rx).await;

    assert!(coordinator.download_update().success);

    let started = next_event(&mut rx).await;
    assert_eq!(started.update_event(), Some(UpdateEventName::DownloadStarted));
    assert_eq!(started.payload["version"], "1.2.0");
    wait_until(|| client.downloads.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn unsubscribe_stops_relaying() {
    let (client, coordinator, mut rx) = setup(BuildProfile::Production, false);

    coordinator.unsubscribe();
    client.emit(UpdateClientEvent::Checking);

    assert!(drain_names(&mut rx).is_empty());
    assert!(client.listeners.is_empty());
}

#[tokio::test]
async fn startup_check_runs_after_delay() {
    let (client, coordinator, _rx) = setup(BuildProfile::Production, false);

    let handle =
        coordinator.schedule_startup_check(Duration::from_millis(10), CancellationToken::new());
    handle.await.unwrap();

    wait_until(|| client.checks.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn startup_check_is_cancelled_by_shutdown() {
    let (client, coordinator, _rx) = setup(BuildProfile::Production, false);
    let shutdown = CancellationToken::new();

    let handle = coordinator.schedule_startup_check(Duration::from_secs(60), shutdown.clone());
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(client.checks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn app_version_comes_from_the_client() {
    let (_client, coordinator, _rx) = setup(BuildProfile::Production, false);
    assert_eq!(coordinator.app_version(), "1.0.0");
}
