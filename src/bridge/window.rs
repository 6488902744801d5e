//! Registry of UI windows that receive relayed events.
//!
//! A window may be torn down at any time. Each one is checked immediately
//! before a send; a destroyed window is skipped silently and pruned.

use crate::bridge::contract::EventEnvelope;
use crate::error::{Result, ShellError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};

/// Identifier assigned to an attached window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(u64);

/// Something that can receive event envelopes on behalf of a UI window.
pub trait WindowSink: Send + Sync + 'static {
    /// Whether the window has been torn down.
    fn is_destroyed(&self) -> bool;

    /// Deliver one envelope.
    fn send(&self, envelope: &EventEnvelope) -> Result<()>;
}

/// Live windows, in attach order.
#[derive(Clone, Default)]
pub struct WindowRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    windows: Mutex<Vec<(WindowId, Arc<dyn WindowSink>)>>,
}

impl WindowRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start relaying to `window`.
    pub fn attach(&self, window: Arc<dyn WindowSink>) -> WindowId {
        let id = WindowId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.windows().push((id, window));
        tracing::debug!(window = id.0, "window attached");
        id
    }

    /// Stop relaying to the window. Returns `false` if it was not attached.
    pub fn detach(&self, id: WindowId) -> bool {
        let mut windows = self.windows();
        let before = windows.len();
        windows.retain(|(wid, _)| *wid != id);
        before != windows.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.windows().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `envelope` to every live window. Returns how many received it.
    pub fn relay(&self, envelope: &EventEnvelope) -> usize {
        let snapshot: Vec<(WindowId, Arc<dyn WindowSink>)> = self
            .windows()
            .iter()
            .map(|(id, w)| (*id, Arc::clone(w)))
            .collect();

        let mut delivered = 0;
        let mut gone = Vec::new();
        for (id, window) in snapshot {
            if window.is_destroyed() {
                gone.push(id);
                continue;
            }
            match window.send(envelope) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(window = id.0, error = %e, event = %envelope.event, "event dropped");
                    if window.is_destroyed() {
                        gone.push(id);
                    }
                }
            }
        }

        if !gone.is_empty() {
            self.windows().retain(|(id, _)| !gone.contains(id));
            tracing::debug!(pruned = gone.len(), "pruned destroyed windows");
        }
        delivered
    }

    fn windows(&self) -> MutexGuard<'_, Vec<(WindowId, Arc<dyn WindowSink>)>> {
        match self.inner.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for WindowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowRegistry")
            .field("windows", &self.len())
            .finish()
    }
}

/// In-process window backed by an unbounded channel.
#[derive(Debug)]
pub struct ChannelWindow {
    tx: mpsc::UnboundedSender<EventEnvelope>,
    destroyed: AtomicBool,
}

impl ChannelWindow {
    /// Create a window and the receiver that plays the UI side.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                tx,
                destroyed: AtomicBool::new(false),
            }),
            rx,
        )
    }

    /// Tear the window down. Later relays skip it.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

impl WindowSink for ChannelWindow {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    fn send(&self, envelope: &EventEnvelope) -> Result<()> {
        self.tx
            .send(envelope.clone())
            .map_err(|_| ShellError::Channel("window receiver closed".to_owned()))
    }
}

/// Window backed by the bridge's event broadcast channel. Considered
/// destroyed once every subscriber has gone away.
#[derive(Debug, Clone)]
pub struct BroadcastWindow {
    tx: broadcast::Sender<EventEnvelope>,
}

impl BroadcastWindow {
    #[must_use]
    pub fn new(tx: broadcast::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }
}

impl WindowSink for BroadcastWindow {
    fn is_destroyed(&self) -> bool {
        self.tx.receiver_count() == 0
    }

    fn send(&self, envelope: &EventEnvelope) -> Result<()> {
        self.tx
            .send(envelope.clone())
            .map(|_| ())
            .map_err(|_| ShellError::Channel("no event subscribers".to_owned()))
    }
}
