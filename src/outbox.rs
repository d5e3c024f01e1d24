//! Outbound message seam toward the actor substrate.
//!
//! The controller never talks to a peer directly; it hands messages to an
//! [`Outbox`] and moves on. Delivery is fire-and-forget (the substrate
//! guarantees in-order, exactly-once delivery per sender/receiver pair),
//! so the only failures here are wiring defects: no route for the peer, or
//! a peer whose mailbox has already closed.

use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};

use miette::Diagnostic;
use thiserror::Error;

use crate::message::FlowMessage;
use crate::types::StageId;

/// Fire-and-forget transmission of one protocol message to a peer stage.
pub trait Outbox: Send {
    /// Hand `message` to the substrate for delivery to `to`.
    fn deliver(&mut self, to: StageId, message: FlowMessage) -> Result<(), OutboxError>;
}

/// Delivery failures. Both indicate the wiring and the topology disagree,
/// which the controller treats as fatal alongside credit faults.
#[derive(Debug, Error, Diagnostic)]
pub enum OutboxError {
    /// The routing table has no mailbox for this peer.
    #[error("no route to stage {to}")]
    #[diagnostic(
        code(creditgate::outbox::unroutable),
        help("Every peer declared in the topology must be wired into the routing table before execution starts.")
    )]
    Unroutable { to: StageId },

    /// The peer's mailbox is closed; its actor is gone.
    #[error("mailbox for stage {to} is closed")]
    #[diagnostic(
        code(creditgate::outbox::mailbox_closed),
        help("The peer stage has shut down or faulted while this stage still owed it credits.")
    )]
    MailboxClosed { to: StageId },
}

/// Outbox backed by one flume mailbox per peer.
///
/// This is the implementation the runtime harness wires in: cloneable
/// senders into each peer's mailbox, looked up per delivery.
#[derive(Clone)]
pub struct ChannelOutbox {
    routes: FxHashMap<StageId, flume::Sender<FlowMessage>>,
}

impl ChannelOutbox {
    /// Build an outbox over the given routing table.
    #[must_use]
    pub fn new(routes: FxHashMap<StageId, flume::Sender<FlowMessage>>) -> Self {
        Self { routes }
    }
}

impl Outbox for ChannelOutbox {
    fn deliver(&mut self, to: StageId, message: FlowMessage) -> Result<(), OutboxError> {
        let route = self
            .routes
            .get(&to)
            .ok_or(OutboxError::Unroutable { to })?;
        route
            .send(message)
            .map_err(|_| OutboxError::MailboxClosed { to })
    }
}

/// Outbox that records every delivery instead of sending it.
///
/// Clones share the same storage, so a test can keep one handle while the
/// controller owns the other and inspect traffic afterwards.
///
/// # Examples
///
/// ```rust
/// use creditgate::message::FlowMessage;
/// use creditgate::outbox::{Outbox, RecordingOutbox};
/// use creditgate::types::StageId;
///
/// let recorder = RecordingOutbox::default();
/// let mut handle = recorder.clone();
/// handle.deliver(StageId(2), FlowMessage::data_ready(StageId(1))).unwrap();
/// assert_eq!(recorder.snapshot().len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct RecordingOutbox {
    sent: Arc<Mutex<Vec<(StageId, FlowMessage)>>>,
}

impl RecordingOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every `(recipient, message)` pair delivered so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(StageId, FlowMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Drop all recorded deliveries.
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Outbox for RecordingOutbox {
    fn deliver(&mut self, to: StageId, message: FlowMessage) -> Result<(), OutboxError> {
        self.sent.lock().unwrap().push((to, message));
        Ok(())
    }
}
