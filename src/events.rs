//! Observability events for flow-control activity.
//!
//! Every interesting protocol moment (a message applied, a work unit
//! performed, a drain blocking on a window) is published as a
//! [`FlowEvent`] through a flume channel and fanned out to pluggable
//! [`EventSink`]s by a background listener task. Events are observability
//! only; nothing in the protocol reads them back.

use std::io::{self, Result as IoResult};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{sync::oneshot, task};

use crate::controller::{BlockReason, RunPhase};
use crate::message::FlowMessage;
use crate::types::StageId;

/// One observable flow-control occurrence, stamped at creation time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub when: DateTime<Utc>,
    pub stage: StageId,
    pub kind: FlowEventKind,
}

impl FlowEvent {
    /// Stamp a new event for `stage`.
    #[must_use]
    pub fn new(stage: StageId, kind: FlowEventKind) -> Self {
        Self {
            when: Utc::now(),
            stage,
            kind,
        }
    }

    /// Compact JSON rendering for sinks that write lines.
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FlowEventKind {
    /// An inbound protocol message was accepted and applied to the ledger.
    MessageApplied { message: FlowMessage },
    /// The controller's run loop entered a new phase.
    PhaseEntered { phase: RunPhase },
    /// One opaque work unit completed; `units` counts this drain so far.
    WorkPerformed { units: u64 },
    /// A protocol message was handed to the outbox.
    MessageSent { to: StageId, message: FlowMessage },
    /// The drain loop stopped after `units` work units.
    DrainBlocked { reason: BlockReason, units: u64 },
    /// The stage hit a fatal protocol fault and is going down.
    StageFaulted { detail: String },
}

/// Abstraction over an output target that consumes whole events.
pub trait EventSink: Send + Sync {
    /// Handle one event; the sink decides how to render or store it.
    fn handle(&mut self, event: &FlowEvent) -> IoResult<()>;
}

/// Default sink: forwards events to the `tracing` subscriber at debug
/// level, keyed by stage.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn handle(&mut self, event: &FlowEvent) -> IoResult<()> {
        tracing::debug!(stage = %event.stage, kind = ?event.kind, "flow event");
        Ok(())
    }
}

/// In-memory sink for tests and snapshots.
///
/// Clones share storage, so keep one handle and give the bus the other.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<FlowEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every captured event, in arrival order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FlowEvent> {
        self.entries.lock().unwrap().clone()
    }

    /// Clear all captured events.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &FlowEvent) -> IoResult<()> {
        self.entries.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Channel sink for streaming events to an async consumer.
pub struct ChannelSink {
    tx: flume::Sender<FlowEvent>,
}

impl ChannelSink {
    pub fn new(tx: flume::Sender<FlowEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &FlowEvent) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event receiver dropped"))
    }
}

/// Receives events from controllers and broadcasts them to sinks.
///
/// Controllers emit through cloned [`sender`](Self::sender) handles; a
/// background tokio task drains the channel into every registered sink.
/// Listening is idempotent and shut down explicitly (or on drop).
pub struct FlowEventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    channel: (flume::Sender<FlowEvent>, flume::Receiver<FlowEvent>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

impl Default for FlowEventBus {
    fn default() -> Self {
        Self::with_sink(TracingSink)
    }
}

impl FlowEventBus {
    /// Create a bus with a single sink.
    pub fn with_sink<S>(sink: S) -> Self
    where
        S: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    /// Create a bus with multiple sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Add a sink after construction.
    pub fn add_sink<S: EventSink + 'static>(&self, sink: S) {
        self.sinks.lock().unwrap().push(Box::new(sink));
    }

    /// Clone of the sender side, for anything that emits events.
    #[must_use]
    pub fn sender(&self) -> flume::Sender<FlowEvent> {
        self.channel.0.clone()
    }

    /// Spawn the background broadcast task. Idempotent.
    pub fn listen(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return;
        }

        let receiver = self.channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        // Drain whatever is already queued so observers see
                        // a consistent picture after stop().
                        while let Ok(event) = receiver.try_recv() {
                            broadcast(&sinks, &event);
                        }
                        break;
                    }
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => broadcast(&sinks, &event),
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background task, draining nothing further.
    pub async fn stop(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for FlowEventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock() {
            if let Some(state) = guard.take() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

fn broadcast(sinks: &Arc<Mutex<Vec<Box<dyn EventSink>>>>, event: &FlowEvent) {
    let mut sinks = sinks.lock().unwrap();
    for sink in sinks.iter_mut() {
        if let Err(error) = sink.handle(event) {
            tracing::warn!(%error, "event sink failed");
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}
