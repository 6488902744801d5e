//! Newline-delimited JSON bridge driven over an in-memory pipe.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use shellkit::bridge::stdio::run_bridge;
use shellkit::bridge::{EventEnvelope, ResponseEnvelope, UpdateEventName, WindowRegistry};
use shellkit::config::{BridgeConfig, BuildProfile};
use shellkit::update::prompt::FixedAnswer;
use shellkit::update::{UnconfiguredClient, UpdateCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Ui {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
    windows: WindowRegistry,
    shutdown: CancellationToken,
    bridge: JoinHandle<shellkit::Result<()>>,
}

impl Ui {
    fn start() -> Self {
        let coordinator = Arc::new(UpdateCoordinator::new(
            Arc::new(UnconfiguredClient::new("0.3.0")),
            BuildProfile::Production,
            Arc::new(FixedAnswer(false)),
        ));
        let windows = coordinator.windows().clone();

        let (ui_side, host_side) = tokio::io::duplex(64 * 1024);
        let (host_read, host_write) = tokio::io::split(host_side);
        let (ui_read, ui_write) = tokio::io::split(ui_side);
        let shutdown = CancellationToken::new();

        let bridge_windows = windows.clone();
        let bridge_shutdown = shutdown.clone();
        let bridge = tokio::spawn(async move {
            run_bridge(
                BufReader::new(host_read),
                host_write,
                coordinator,
                &bridge_windows,
                &BridgeConfig::default(),
                bridge_shutdown,
            )
            .await
        });

        Self {
            lines: BufReader::new(ui_read).lines(),
            writer: ui_write,
            windows,
            shutdown,
            bridge,
        }
    }

    async fn send(&mut self, line: &str) {
        self.send_bytes(line.as_bytes()).await;
    }

    async fn send_bytes(&mut self, line: &[u8]) {
        self.writer.write_all(line).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn next_line(&mut self) -> serde_json::Value {
        let line = tokio::time::timeout(Duration::from_secs(2), self.lines.next_line())
            .await
            .expect("timed out waiting for bridge output")
            .unwrap()
            .expect("bridge output closed");
        serde_json::from_str(&line).unwrap()
    }

    async fn finish(self) -> shellkit::Result<()> {
        tokio::time::timeout(Duration::from_secs(2), self.bridge)
            .await
            .expect("bridge did not stop")
            .unwrap()
    }
}

#[tokio::test]
async fn ping_gets_a_response() {
    let mut ui = Ui::start();

    ui.send(r#"{"v":1,"request_id":"req-1","command":"host.ping","payload":{}}"#)
        .await;

    let response: ResponseEnvelope = serde_json::from_value(ui.next_line().await).unwrap();
    assert!(response.ok);
    assert_eq!(response.request_id, "req-1");
    assert_eq!(response.payload["pong"], true);
}

#[tokio::test]
async fn app_version_is_returned_as_a_string() {
    let mut ui = Ui::start();

    ui.send(r#"{"v":1,"request_id":"req-2","command":"get-app-version"}"#)
        .await;

    let response: ResponseEnvelope = serde_json::from_value(ui.next_line().await).unwrap();
    assert_eq!(response.payload, serde_json::json!("0.3.0"));
}

#[tokio::test]
async fn malformed_line_gets_parse_error_response() {
    let mut ui = Ui::start();

    ui.send("this is not json").await;
    ui.send(r#"{"v":1,"request_id":"r","command":"no-such-command","payload":{}}"#)
        .await;

    for _ in 0..2 {
        let response: ResponseEnvelope = serde_json::from_value(ui.next_line().await).unwrap();
        assert!(!response.ok);
        assert_eq!(response.request_id, "parse-error");
    }
}

#[tokio::test]
async fn invalid_utf8_line_gets_parse_error_and_bridge_keeps_running() {
    let mut ui = Ui::start();

    ui.send_bytes(b"\xff\xfe garbage").await;
    ui.send(r#"{"v":1,"request_id":"req-after","command":"host.ping","payload":{}}"#)
        .await;

    let rejected: ResponseEnvelope = serde_json::from_value(ui.next_line().await).unwrap();
    assert!(!rejected.ok);
    assert_eq!(rejected.request_id, "parse-error");

    let pong: ResponseEnvelope = serde_json::from_value(ui.next_line().await).unwrap();
    assert!(pong.ok);
    assert_eq!(pong.request_id, "req-after");
    assert!(!ui.bridge.is_finished());
}

#[tokio::test]
async fn wrong_contract_version_is_rejected_with_request_id() {
    let mut ui = Ui::start();

    ui.send(r#"{"v":9,"request_id":"req-9","command":"host.ping","payload":{}}"#)
        .await;

    let response: ResponseEnvelope = serde_json::from_value(ui.next_line().await).unwrap();
    assert!(!response.ok);
    assert_eq!(response.request_id, "req-9");
    assert!(response.error.unwrap().contains("unsupported contract version"));
}

#[tokio::test]
async fn relayed_events_are_written_as_lines() {
    let mut ui = Ui::start();
    ui.send(r#"{"v":1,"request_id":"req-1","command":"host.ping","payload":{}}"#)
        .await;
    let _ = ui.next_line().await;

    let delivered = ui.windows.relay(&EventEnvelope::update(
        UpdateEventName::Checking,
        serde_json::Value::Null,
    ));
    assert_eq!(delivered, 1);

    let event: EventEnvelope = serde_json::from_value(ui.next_line().await).unwrap();
    assert_eq!(event.event, "auto-updater-update-checking");
}

#[tokio::test]
async fn check_without_feed_answers_then_relays_error() {
    let mut ui = Ui::start();

    ui.send(r#"{"v":1,"request_id":"req-c","command":"check-for-updates","payload":{}}"#)
        .await;

    let mut response = None;
    let mut event = None;
    for _ in 0..2 {
        let value = ui.next_line().await;
        if value.get("request_id").is_some() {
            response = Some(serde_json::from_value::<ResponseEnvelope>(value).unwrap());
        } else {
            event = Some(serde_json::from_value::<EventEnvelope>(value).unwrap());
        }
    }

    let response = response.expect("command response");
    assert_eq!(response.payload["success"], true);
    let event = event.expect("relayed error");
    assert_eq!(event.update_event(), Some(UpdateEventName::Error));
    assert!(event.payload.as_str().unwrap().contains("no update feed configured"));
}

#[tokio::test]
async fn eof_stops_the_bridge_and_detaches_the_window() {
    let mut ui = Ui::start();
    ui.send(r#"{"v":1,"request_id":"req-1","command":"host.ping","payload":{}}"#)
        .await;
    let _ = ui.next_line().await;
    assert_eq!(ui.windows.len(), 1);

    ui.writer.shutdown().await.unwrap();
    let windows = ui.windows.clone();
    ui.finish().await.unwrap();

    assert!(windows.is_empty());
}

#[tokio::test]
async fn shutdown_token_stops_the_bridge() {
    let ui = Ui::start();

    ui.shutdown.cancel();

    ui.finish().await.unwrap();
}
