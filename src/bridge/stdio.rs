//! Newline-delimited JSON bridge for the host command channel.
//!
//! Reads `CommandEnvelope` lines from the UI process, dispatches them
//! through the `HostCommandServer` router, and writes `ResponseEnvelope`
//! and `EventEnvelope` lines back.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::bridge::channel::{CommandHandler, HostCommandClient, command_channel};
use crate::bridge::contract::{CommandEnvelope, EventEnvelope, ResponseEnvelope};
use crate::bridge::window::{BroadcastWindow, WindowRegistry};
use crate::config::BridgeConfig;
use crate::error::{Result, ShellError};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Run the bridge over this process's stdin/stdout.
///
/// Returns when stdin closes or `shutdown` is cancelled.
pub async fn run_stdio_bridge<H: CommandHandler>(
    handler: H,
    windows: &WindowRegistry,
    config: &BridgeConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    run_bridge(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        handler,
        windows,
        config,
        shutdown,
    )
    .await
}

/// Run the bridge over an arbitrary line reader and writer.
///
/// Three concurrent tasks operate in parallel:
///
/// 1. **Reader** -- reads newline-delimited JSON, dispatches each
///    `CommandEnvelope` through the command client, and writes the
///    resulting `ResponseEnvelope`.
/// 2. **Event forwarder** -- receives broadcast `EventEnvelope` messages
///    and writes them as JSON lines.
/// 3. **Server** -- runs the `HostCommandServer` router loop.
///
/// While running, the bridge is attached to `windows` as one window, so
/// every relayed update event reaches the writer.
pub async fn run_bridge<R, W, H>(
    reader: R,
    writer: W,
    handler: H,
    windows: &WindowRegistry,
    config: &BridgeConfig,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    H: CommandHandler,
{
    let (client, server) = command_channel(config.request_capacity, config.event_capacity, handler);
    let writer: SharedWriter<W> = Arc::new(Mutex::new(BufWriter::new(writer)));

    let server_handle = tokio::spawn(server.run());

    // Subscribe before attaching so the window is never seen as destroyed.
    let event_rx = client.subscribe_events();
    let window_id = windows.attach(Arc::new(BroadcastWindow::new(client.event_sender())));
    let event_handle = tokio::spawn(forward_events(event_rx, Arc::clone(&writer)));

    let reader_result = run_reader(reader, client, Arc::clone(&writer), shutdown).await;

    windows.detach(window_id);
    event_handle.abort();
    let _ = event_handle.await;
    let _ = server_handle.await;

    reader_result
}

async fn forward_events<W>(mut event_rx: broadcast::Receiver<EventEnvelope>, writer: SharedWriter<W>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        match event_rx.recv().await {
            Ok(event_envelope) => match serde_json::to_string(&event_envelope) {
                Ok(json) => {
                    let mut w = writer.lock().await;
                    if let Err(e) = write_line(&mut w, &json).await {
                        tracing::warn!(
                            error = %e,
                            "failed to write event envelope; stopping event forwarder"
                        );
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                }
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("event broadcast channel closed; stopping event forwarder");
                break;
            }
        }
    }
}

/// Read line-by-line, dispatch each command, and write responses.
async fn run_reader<R, W>(
    mut reader: R,
    client: HostCommandClient,
    writer: SharedWriter<W>,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let bytes_read = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::info!("shutdown requested; stopping bridge");
                break;
            }
            read = reader.read_until(b'\n', &mut buf) => read
                .map_err(|e| ShellError::Channel(format!("failed to read command line: {e}")))?,
        };

        if bytes_read == 0 {
            tracing::info!("input closed (EOF); shutting down bridge");
            break;
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "command line is not valid UTF-8");
                let response = ResponseEnvelope::error(
                    "parse-error",
                    format!("command line is not valid UTF-8: {e}"),
                );
                write_response(&writer, &response).await?;
                continue;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<CommandEnvelope>(trimmed) {
            Ok(envelope) => {
                let request_id = envelope.request_id.clone();
                match client.send(envelope).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        tracing::error!(error = %e, "command dispatch failed");
                        ResponseEnvelope::error(request_id, format!("dispatch failed: {e}"))
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_line = %trimmed,
                    "failed to parse command envelope"
                );
                ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                )
            }
        };

        write_response(&writer, &response).await?;
    }

    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &SharedWriter<W>,
    response: &ResponseEnvelope,
) -> Result<()> {
    let json = serde_json::to_string(response).map_err(|e| {
        ShellError::Contract(format!("failed to serialize response envelope: {e}"))
    })?;
    let mut w = writer.lock().await;
    write_line(&mut w, &json).await
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| ShellError::Channel(format!("failed to write line: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| ShellError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| ShellError::Channel(format!("failed to flush output: {e}")))?;
    Ok(())
}
