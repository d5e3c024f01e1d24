//! The stage flow controller: the admission-control state machine.
//!
//! One [`StageController`] lives inside one stage actor and is driven
//! exclusively by inbound [`FlowMessage`]s plus an external
//! [`attempt_run`](StageController::attempt_run) trigger. Control flow per
//! message: update one credit counter, then drain: perform work units
//! while every upstream edge has a ready credit and every downstream
//! window has room, propagating credits outward after each unit.
//!
//! The handler runs to completion before the actor accepts its next
//! message, and nothing here blocks or suspends: sends are fire-and-forget
//! and the work unit is synchronous by contract.

use std::fmt;
use std::num::NonZeroU64;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::credits::{CreditLedger, FlowError};
use crate::events::{FlowEvent, FlowEventKind};
use crate::message::FlowMessage;
use crate::outbox::{Outbox, OutboxError};
use crate::topology::StageTopology;
use crate::types::StageId;
use crate::work::WorkUnit;

/// Phase of the controller's run loop.
///
/// The loop is level-triggered: any inbound message moves the controller
/// from `Idle` to `Evaluating`; a satisfied gate moves it into `Draining`
/// until some window (or the work quota) blocks it back to `Idle`. The
/// phase is observable state only; the handler always returns the
/// controller to `Idle` unless it faults mid-drain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// No pending attempt; waiting for the next message or trigger.
    Idle,
    /// Checking the admission gate.
    Evaluating,
    /// Gate satisfied; performing work and propagating credits.
    Draining,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Idle => write!(f, "idle"),
            RunPhase::Evaluating => write!(f, "evaluating"),
            RunPhase::Draining => write!(f, "draining"),
        }
    }
}

/// Why a drain stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Some upstream edge has no ready credit.
    AwaitingInput,
    /// Some downstream send window is saturated.
    DownstreamFull,
    /// The per-trigger work quota was spent before any window blocked.
    QuotaExhausted,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::AwaitingInput => write!(f, "awaiting input"),
            BlockReason::DownstreamFull => write!(f, "downstream full"),
            BlockReason::QuotaExhausted => write!(f, "quota exhausted"),
        }
    }
}

/// Outcome of one handled message or external trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainReport {
    /// Work units performed during this drain.
    pub units: u64,
    /// What stopped the loop.
    pub blocked: BlockReason,
}

/// Fatal faults that end a stage.
///
/// Credit faults and delivery faults compose here; both mean the stage can
/// no longer trust its counters or reach its peers, so neither is retried.
/// The surrounding actor decides whether the whole pipeline halts.
#[derive(Debug, Error, Diagnostic)]
pub enum ControllerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Outbox(#[from] OutboxError),

    /// The observability tap went away while the stage still runs.
    #[error("event tap closed")]
    #[diagnostic(
        code(creditgate::controller::event_tap_closed),
        help("The event bus was dropped while a controller still held its sender; keep the bus alive for the lifetime of the pipeline.")
    )]
    EventTapClosed,
}

/// Per-stage flow controller.
///
/// Owns the stage's [`CreditLedger`], the opaque [`WorkUnit`], and the
/// [`Outbox`] toward its peers. Construction fixes the peer sets; from
/// then on the controller is a pure message-driven state machine.
///
/// # Examples
///
/// ```rust
/// use creditgate::controller::{BlockReason, StageController};
/// use creditgate::message::FlowMessage;
/// use creditgate::outbox::RecordingOutbox;
/// use creditgate::topology::StageTopology;
/// use creditgate::types::{StageId, Window};
/// use creditgate::work::NoopWork;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let topology = StageTopology::builder(StageId(1))
///     .upstream_with_window(StageId(0), Window::Bounded(3))
///     .downstream(StageId(2))
///     .build()?;
///
/// let outbox = RecordingOutbox::default();
/// let mut controller = StageController::new(&topology, NoopWork, outbox.clone());
///
/// let report = controller.handle(FlowMessage::data_ready(StageId(0)))?;
/// assert_eq!(report.units, 1);
/// assert_eq!(report.blocked, BlockReason::AwaitingInput);
/// // One DataReady went downstream, one DataConsumed went upstream.
/// assert_eq!(outbox.snapshot().len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct StageController {
    id: StageId,
    ledger: CreditLedger,
    // Peer order is fixed and sorted at construction so credit
    // propagation emits messages in a deterministic order.
    upstream_order: Vec<StageId>,
    downstream_order: Vec<StageId>,
    work: Box<dyn WorkUnit>,
    outbox: Box<dyn Outbox>,
    events: Option<flume::Sender<FlowEvent>>,
    quota: Option<NonZeroU64>,
    phase: RunPhase,
}

impl StageController {
    /// Build a controller for the given topology.
    pub fn new(
        topology: &StageTopology,
        work: impl WorkUnit + 'static,
        outbox: impl Outbox + 'static,
    ) -> Self {
        let mut upstream_order: Vec<StageId> = topology.upstream().keys().copied().collect();
        upstream_order.sort_unstable();
        let mut downstream_order: Vec<StageId> = topology.downstream().keys().copied().collect();
        downstream_order.sort_unstable();

        Self {
            id: topology.stage(),
            ledger: CreditLedger::new(
                topology.upstream().iter().map(|(p, w)| (*p, *w)),
                topology.downstream().iter().map(|(p, w)| (*p, *w)),
            ),
            upstream_order,
            downstream_order,
            work: Box::new(work),
            outbox: Box::new(outbox),
            events: None,
            quota: None,
            phase: RunPhase::Idle,
        }
    }

    /// Attach an observability tap; every protocol moment is published
    /// through it.
    #[must_use]
    pub fn with_event_tap(mut self, sender: flume::Sender<FlowEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Cap the work units performed per drain.
    ///
    /// Without upstream edges and with unbounded downstream windows the
    /// drain loop has no structural bound, so source stages should carry a
    /// quota unless something external bounds total work.
    #[must_use]
    pub fn with_source_quota(mut self, quota: NonZeroU64) -> Self {
        self.quota = Some(quota);
        self
    }

    /// The stage this controller belongs to.
    #[must_use]
    pub fn id(&self) -> StageId {
        self.id
    }

    /// Current run-loop phase.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Read access to the credit state, for observers and tests.
    #[must_use]
    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// Handle one inbound protocol message, then drain.
    ///
    /// This is the sole entry point that mutates credit state, and it runs
    /// to completion, including the full drain, before the actor should
    /// accept its next message.
    #[instrument(skip(self), fields(stage = %self.id), err)]
    pub fn handle(&mut self, message: FlowMessage) -> Result<DrainReport, ControllerError> {
        match message {
            FlowMessage::DataReady { from } => self.ledger.increase_ready(from)?,
            FlowMessage::DataConsumed { from } => self.ledger.decrease_used(from)?,
        }
        self.emit(FlowEventKind::MessageApplied { message })?;
        self.drain()
    }

    /// External re-evaluation trigger.
    ///
    /// Re-checks the admission gate without touching any counter first.
    /// This is how a source stage (no upstream edges) ever starts running.
    #[instrument(skip(self), fields(stage = %self.id), err)]
    pub fn attempt_run(&mut self) -> Result<DrainReport, ControllerError> {
        self.drain()
    }

    /// The level-triggered execution loop.
    ///
    /// Each iteration consumes one ready credit from every upstream edge
    /// and occupies one send-window slot toward every downstream peer, so
    /// the loop is bounded by the minimum ready count at entry and stops
    /// the instant any downstream window saturates.
    fn drain(&mut self) -> Result<DrainReport, ControllerError> {
        self.enter_phase(RunPhase::Evaluating)?;

        let mut units: u64 = 0;
        let blocked = loop {
            if !self.ledger.is_input_ready() {
                break BlockReason::AwaitingInput;
            }
            if !self.ledger.can_emit_output() {
                break BlockReason::DownstreamFull;
            }
            if let Some(quota) = self.quota {
                if units >= quota.get() {
                    break BlockReason::QuotaExhausted;
                }
            }

            self.enter_phase(RunPhase::Draining)?;
            self.work.perform();
            units += 1;
            self.emit(FlowEventKind::WorkPerformed { units })?;

            // Occupy a send-window slot and announce output downstream.
            for idx in 0..self.downstream_order.len() {
                let peer = self.downstream_order[idx];
                self.ledger.increase_used(peer)?;
                let message = FlowMessage::data_ready(self.id);
                tracing::debug!(stage = %self.id, to = %peer, "sending data_ready");
                self.outbox.deliver(peer, message)?;
                self.emit(FlowEventKind::MessageSent { to: peer, message })?;
            }

            // Consume the input credit and acknowledge upstream.
            for idx in 0..self.upstream_order.len() {
                let peer = self.upstream_order[idx];
                self.ledger.decrease_ready(peer)?;
                let message = FlowMessage::data_consumed(self.id);
                tracing::debug!(stage = %self.id, to = %peer, "sending data_consumed");
                self.outbox.deliver(peer, message)?;
                self.emit(FlowEventKind::MessageSent { to: peer, message })?;
            }
        };

        self.emit(FlowEventKind::DrainBlocked {
            reason: blocked,
            units,
        })?;
        self.enter_phase(RunPhase::Idle)?;
        Ok(DrainReport { units, blocked })
    }

    fn enter_phase(&mut self, phase: RunPhase) -> Result<(), ControllerError> {
        if self.phase != phase {
            self.phase = phase;
            self.emit(FlowEventKind::PhaseEntered { phase })?;
        }
        Ok(())
    }

    fn emit(&self, kind: FlowEventKind) -> Result<(), ControllerError> {
        if let Some(tap) = &self.events {
            tap.send(FlowEvent::new(self.id, kind))
                .map_err(|_| ControllerError::EventTapClosed)?;
        }
        Ok(())
    }
}

impl fmt::Debug for StageController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageController")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("quota", &self.quota)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}
