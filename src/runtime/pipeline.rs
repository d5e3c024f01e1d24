use rustc_hash::FxHashMap;

use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::instrument;

use crate::controller::{ControllerError, StageController};
use crate::events::{FlowEvent, FlowEventBus, FlowEventKind};
use crate::message::FlowMessage;
use crate::outbox::ChannelOutbox;
use crate::topology::StageTopology;
use crate::types::StageId;
use crate::work::WorkUnit;

use super::RuntimeConfig;

/// Control-plane messages for one stage task, separate from the protocol
/// mailbox so flow messages stay pure protocol.
enum Control {
    /// External `AttemptRun` trigger: re-evaluate the gate now.
    Kick,
    /// Process everything already in the mailbox, then reply with the
    /// total number of inputs handled since the stage started.
    Probe(oneshot::Sender<u64>),
    /// Stop the stage task.
    Shutdown,
}

/// Declarative pipeline assembly: topologies plus work units, spawned
/// together so every mailbox exists before any outbox needs a route.
///
/// A peer that is driven from outside the pipeline (a data loader pushing
/// `DataReady` into the leading stage, a consumer acknowledging the
/// trailing one) is declared with [`add_external`](Self::add_external):
/// it gets a routed mailbox but no task, and the caller plays its part via
/// [`Pipeline::inject`] and [`Pipeline::external`]. Without such a
/// boundary a pipeline containing a zero-upstream stage free-runs forever,
/// since every sink acknowledgment re-opens the source's send window.
///
/// # Examples
///
/// ```rust,no_run
/// use creditgate::events::FlowEventBus;
/// use creditgate::message::FlowMessage;
/// use creditgate::runtime::PipelineBuilder;
/// use creditgate::topology::StageTopology;
/// use creditgate::types::StageId;
/// use creditgate::work::NoopWork;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = FlowEventBus::default();
/// bus.listen();
///
/// let driver = StageId(100);
/// let pipeline = PipelineBuilder::new()
///     .add_external(driver)
///     .add_stage(
///         StageTopology::builder(StageId(0))
///             .upstream(driver)
///             .downstream(StageId(1))
///             .build()?,
///         NoopWork,
///     )
///     .add_stage(StageTopology::builder(StageId(1)).upstream(StageId(0)).build()?, NoopWork)
///     .spawn(&bus)?;
///
/// // Play the driver: announce two units, let them flow, collect acks.
/// pipeline.inject(StageId(0), FlowMessage::data_ready(driver))?;
/// pipeline.inject(StageId(0), FlowMessage::data_ready(driver))?;
/// pipeline.settle().await;
/// let acks = pipeline.external(driver)?.try_iter().count();
/// assert_eq!(acks, 2);
///
/// for outcome in pipeline.shutdown().await {
///     outcome.result?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct PipelineBuilder {
    config: RuntimeConfig,
    stages: Vec<(StageTopology, Box<dyn WorkUnit>)>,
    externals: Vec<StageId>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            stages: Vec::new(),
            externals: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Add one stage: its frozen topology and its opaque work.
    #[must_use]
    pub fn add_stage(mut self, topology: StageTopology, work: impl WorkUnit + 'static) -> Self {
        self.stages.push((topology, Box::new(work)));
        self
    }

    /// Declare a peer that lives outside the pipeline.
    ///
    /// The id gets a routed mailbox so stages can send to it, but no task;
    /// whatever drives the pipeline reads that mailbox through
    /// [`Pipeline::external`] and speaks for the peer with
    /// [`Pipeline::inject`].
    #[must_use]
    pub fn add_external(mut self, id: impl Into<StageId>) -> Self {
        self.externals.push(id.into());
        self
    }

    /// Validate the wiring, build one controller per stage, and spawn the
    /// stage tasks. Controllers publish events through `bus`.
    #[instrument(skip(self, bus), err)]
    pub fn spawn(self, bus: &FlowEventBus) -> Result<Pipeline, PipelineError> {
        // Every stage gets its mailbox first so the routing table is
        // complete before any controller is constructed.
        let mut mailboxes: FxHashMap<StageId, flume::Sender<FlowMessage>> = FxHashMap::default();
        let mut receivers: Vec<flume::Receiver<FlowMessage>> = Vec::new();
        for (topology, _) in &self.stages {
            let stage = topology.stage();
            let (tx, rx) = flume::unbounded();
            if mailboxes.insert(stage, tx).is_some() {
                return Err(PipelineError::DuplicateStage { stage });
            }
            receivers.push(rx);
        }

        let mut externals: FxHashMap<StageId, flume::Receiver<FlowMessage>> = FxHashMap::default();
        for id in &self.externals {
            let (tx, rx) = flume::unbounded();
            if mailboxes.insert(*id, tx).is_some() {
                return Err(PipelineError::DuplicateStage { stage: *id });
            }
            externals.insert(*id, rx);
        }

        // A declared peer with no mailbox is a wiring defect; catch it
        // here rather than mid-run in the outbox.
        for (topology, _) in &self.stages {
            for peer in topology.peers() {
                if !mailboxes.contains_key(&peer) {
                    return Err(PipelineError::UnknownStage { stage: peer });
                }
            }
        }

        let mut stages = FxHashMap::default();
        let mut senders = FxHashMap::default();
        for ((topology, work), mailbox_rx) in self.stages.into_iter().zip(receivers) {
            let stage = topology.stage();
            senders.insert(stage, mailboxes[&stage].clone());
            let outbox = ChannelOutbox::new(mailboxes.clone());

            let mut controller = StageController::new(&topology, BoxedWork(work), outbox)
                .with_event_tap(bus.sender());
            if topology.is_source() {
                if let Some(quota) = self.config.source_quota {
                    controller = controller.with_source_quota(quota);
                }
            }

            let (control_tx, control_rx) = flume::unbounded();
            let events = bus.sender();
            let task = tokio::spawn(stage_loop(controller, mailbox_rx, control_rx, events));

            stages.insert(
                stage,
                StageHandle {
                    control: control_tx,
                    task,
                },
            );
        }

        Ok(Pipeline {
            stages,
            senders,
            externals,
        })
    }
}

struct StageHandle {
    control: flume::Sender<Control>,
    task: JoinHandle<Result<(), ControllerError>>,
}

/// Adapter so boxed work stored by the builder satisfies the
/// `impl WorkUnit` bound on [`StageController::new`].
struct BoxedWork(Box<dyn WorkUnit>);

impl WorkUnit for BoxedWork {
    fn perform(&mut self) {
        self.0.perform()
    }
}

/// A running pipeline: one task per stage, addressable by stage id.
pub struct Pipeline {
    stages: FxHashMap<StageId, StageHandle>,
    senders: FxHashMap<StageId, flume::Sender<FlowMessage>>,
    externals: FxHashMap<StageId, flume::Receiver<FlowMessage>>,
}

impl Pipeline {
    /// Stage ids in this pipeline, sorted.
    #[must_use]
    pub fn stage_ids(&self) -> Vec<StageId> {
        let mut ids: Vec<StageId> = self.stages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Deliver the external `AttemptRun` trigger to one stage.
    pub fn kick(&self, stage: StageId) -> Result<(), PipelineError> {
        let handle = self
            .stages
            .get(&stage)
            .ok_or(PipelineError::UnknownStage { stage })?;
        handle
            .control
            .send(Control::Kick)
            .map_err(|_| PipelineError::StageDown { stage })
    }

    /// Put a protocol message in a stage's mailbox, speaking for one of
    /// its external peers.
    pub fn inject(&self, to: StageId, message: FlowMessage) -> Result<(), PipelineError> {
        if !self.stages.contains_key(&to) {
            return Err(PipelineError::UnknownStage { stage: to });
        }
        self.senders[&to]
            .send(message)
            .map_err(|_| PipelineError::StageDown { stage: to })
    }

    /// The mailbox of a declared external peer: everything stages have
    /// sent it. Receivers are cheap clones sharing one queue.
    pub fn external(&self, id: StageId) -> Result<flume::Receiver<FlowMessage>, PipelineError> {
        self.externals
            .get(&id)
            .cloned()
            .ok_or(PipelineError::UnknownStage { stage: id })
    }

    /// Wait until the pipeline goes quiescent.
    ///
    /// Runs probe rounds, each probe flushing a stage's mailbox, until a
    /// full round advances no stage's handled-message count, which means
    /// no mail is queued or being produced anywhere. Terminates only for
    /// pipelines whose credit flow is bounded by an external boundary
    /// (see [`PipelineBuilder::add_external`]); a free-running pipeline
    /// settles never. A stage that already faulted is skipped; its error
    /// is reported by [`shutdown`](Self::shutdown).
    pub async fn settle(&self) {
        let ids = self.stage_ids();
        let mut previous: Option<u64> = None;
        loop {
            let mut total: u64 = 0;
            for stage in &ids {
                let handle = &self.stages[stage];
                let (reply_tx, reply_rx) = oneshot::channel();
                if handle.control.send(Control::Probe(reply_tx)).is_err() {
                    continue;
                }
                // A dropped reply means the stage died mid-probe; the
                // join result will carry the real error.
                if let Ok(handled) = reply_rx.await {
                    total += handled;
                }
            }
            if previous == Some(total) {
                break;
            }
            previous = Some(total);
        }
    }

    /// Stop every stage and collect per-stage outcomes, sorted by id.
    pub async fn shutdown(self) -> Vec<StageOutcome> {
        let mut handles: Vec<(StageId, StageHandle)> = self.stages.into_iter().collect();
        handles.sort_unstable_by_key(|(stage, _)| *stage);

        let mut outcomes = Vec::with_capacity(handles.len());
        for (stage, handle) in handles {
            let _ = handle.control.send(Control::Shutdown);
            let result = match handle.task.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(error)) => Err(PipelineError::Controller(error)),
                Err(join) => Err(PipelineError::Join(join)),
            };
            outcomes.push(StageOutcome { stage, result });
        }
        outcomes
    }
}

/// Terminal state of one stage task after shutdown.
#[derive(Debug)]
pub struct StageOutcome {
    pub stage: StageId,
    pub result: Result<(), PipelineError>,
}

/// Harness-level failures.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    /// Two stages were added with the same id.
    #[error("duplicate stage id {stage}")]
    #[diagnostic(code(creditgate::runtime::duplicate_stage))]
    DuplicateStage { stage: StageId },

    /// A stage id was referenced that no stage in the pipeline carries.
    #[error("unknown stage id {stage}")]
    #[diagnostic(
        code(creditgate::runtime::unknown_stage),
        help("Every peer a topology declares must itself be added to the pipeline.")
    )]
    UnknownStage { stage: StageId },

    /// The stage's task is no longer accepting control messages.
    #[error("stage {stage} is no longer running")]
    #[diagnostic(code(creditgate::runtime::stage_down))]
    StageDown { stage: StageId },

    /// The stage died on a protocol fault.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Controller(#[from] ControllerError),

    /// The stage task panicked or was aborted.
    #[error("stage task failed to join")]
    #[diagnostic(code(creditgate::runtime::join))]
    Join(#[from] JoinError),
}

/// The per-stage actor loop: single-threaded with respect to the
/// controller, alternating between protocol mail and control messages.
async fn stage_loop(
    mut controller: StageController,
    mailbox: flume::Receiver<FlowMessage>,
    control: flume::Receiver<Control>,
    events: flume::Sender<FlowEvent>,
) -> Result<(), ControllerError> {
    let stage = controller.id();
    let mut handled: u64 = 0;
    let result: Result<(), ControllerError> = async {
        loop {
            tokio::select! {
                ctrl = control.recv_async() => match ctrl {
                    Ok(Control::Kick) => {
                        controller.attempt_run()?;
                        handled += 1;
                    }
                    Ok(Control::Probe(reply)) => {
                        // Flush the backlog so a probe reply means "all
                        // mail enqueued before the probe is handled".
                        while let Ok(message) = mailbox.try_recv() {
                            controller.handle(message)?;
                            handled += 1;
                        }
                        let _ = reply.send(handled);
                    }
                    Ok(Control::Shutdown) | Err(_) => break,
                },
                mail = mailbox.recv_async() => match mail {
                    Ok(message) => {
                        controller.handle(message)?;
                        handled += 1;
                    }
                    // All peers and the pipeline handle are gone.
                    Err(_) => break,
                },
            }
        }
        Ok(())
    }
    .await;

    if let Err(ref error) = result {
        tracing::error!(stage = %stage, %error, "stage faulted");
        let _ = events.send(FlowEvent::new(
            stage,
            FlowEventKind::StageFaulted {
                detail: error.to_string(),
            },
        ));
    }
    result
}
