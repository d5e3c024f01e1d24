//! # Creditgate: Credit-Based Flow Control for Pipeline Stages
//!
//! Creditgate implements the admission-control protocol that decides, for
//! one stage of a statically partitioned pipeline, when it may execute and
//! when it must block so it never overruns a downstream consumer or
//! outruns an upstream producer.
//!
//! ## Core Concepts
//!
//! - **Stage**: one node of the pipeline, an actor running opaque work
//!   gated by flow control
//! - **Credit**: a unit of permission, either "I may consume one upstream
//!   output" or "I have one unacknowledged output in flight downstream"
//! - **Window**: the outstanding-credit limit on one edge
//! - **Backpressure**: a saturated send window halting execution until a
//!   downstream consumer acknowledges
//!
//! Each stage owns a [`credits::CreditLedger`] no other actor ever touches;
//! all coordination happens through two copied messages,
//! [`message::FlowMessage::DataReady`] and
//! [`message::FlowMessage::DataConsumed`]. The
//! [`controller::StageController`] applies each message to the ledger and
//! then drains: while every upstream edge holds a ready credit and every
//! downstream window has room, it performs one work unit and propagates
//! credits both ways.
//!
//! ## Quick Start
//!
//! ```rust
//! use creditgate::controller::{BlockReason, StageController};
//! use creditgate::message::FlowMessage;
//! use creditgate::outbox::RecordingOutbox;
//! use creditgate::topology::StageTopology;
//! use creditgate::types::{StageId, Window};
//! use creditgate::work::NoopWork;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // A stage fed by stage 0 (receive window 3), feeding stage 2
//! // (send window 2, the double-buffering default).
//! let topology = StageTopology::builder(StageId(1))
//!     .upstream_with_window(StageId(0), Window::Bounded(3))
//!     .downstream(StageId(2))
//!     .build()?;
//!
//! let outbox = RecordingOutbox::default();
//! let mut controller = StageController::new(&topology, NoopWork, outbox.clone());
//!
//! // Two units of input arrive; both run immediately.
//! controller.handle(FlowMessage::data_ready(StageId(0)))?;
//! let report = controller.handle(FlowMessage::data_ready(StageId(0)))?;
//! assert_eq!(report.units, 1);
//!
//! // Output credits are now fully occupied downstream.
//! assert_eq!(controller.ledger().downstream(StageId(2)).unwrap().used_count(), 2);
//!
//! // A third unit of input has credit to wait, but not to run.
//! let report = controller.handle(FlowMessage::data_ready(StageId(0)))?;
//! assert_eq!(report.units, 0);
//! assert_eq!(report.blocked, BlockReason::DownstreamFull);
//!
//! // One downstream acknowledgment resumes it at once.
//! let report = controller.handle(FlowMessage::data_consumed(StageId(2)))?;
//! assert_eq!(report.units, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Running a Pipeline
//!
//! The [`runtime`] module wires one controller per stage into tokio tasks
//! with flume mailboxes, the minimal substrate the protocol needs:
//!
//! ```rust,no_run
//! use creditgate::events::{FlowEventBus, MemorySink};
//! use creditgate::message::FlowMessage;
//! use creditgate::runtime::PipelineBuilder;
//! use creditgate::topology::StageTopology;
//! use creditgate::types::StageId;
//! use creditgate::work::NoopWork;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = MemorySink::new();
//! let bus = FlowEventBus::with_sink(sink.clone());
//! bus.listen();
//!
//! let driver = StageId(100);
//! let pipeline = PipelineBuilder::new()
//!     .add_external(driver)
//!     .add_stage(
//!         StageTopology::builder(StageId(0))
//!             .upstream(driver)
//!             .downstream(StageId(1))
//!             .build()?,
//!         NoopWork,
//!     )
//!     .add_stage(
//!         StageTopology::builder(StageId(1)).upstream(StageId(0)).build()?,
//!         NoopWork,
//!     )
//!     .spawn(&bus)?;
//!
//! pipeline.inject(StageId(0), FlowMessage::data_ready(driver))?;
//! pipeline.settle().await;
//! for outcome in pipeline.shutdown().await {
//!     outcome.result?;
//! }
//! bus.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every counter mutation is checked; a message the declared windows do
//! not permit raises a typed [`credits::FlowError`] (`UnknownPeer`,
//! `CreditOverflow`, `CreditUnderflow`). These are contract violations,
//! never retried or absorbed: the stage fails loudly and its fault
//! boundary decides what halts.
//!
//! ## Module Guide
//!
//! - [`types`] - Stage identifiers and credit windows
//! - [`message`] - The two-message wire protocol
//! - [`credits`] - Edges, the credit ledger, and the fault taxonomy
//! - [`topology`] - Construction-time peer sets and the builder
//! - [`work`] - The opaque work-unit seam
//! - [`outbox`] - Fire-and-forget delivery toward peers
//! - [`controller`] - The per-stage admission-control state machine
//! - [`registry`] - Stage-kind constructors by tag
//! - [`events`] - Observability event stream and sinks
//! - [`runtime`] - Tokio/flume harness for whole pipelines
//! - [`telemetry`] - Tracing subscriber setup

pub mod controller;
pub mod credits;
pub mod events;
pub mod message;
pub mod outbox;
pub mod registry;
pub mod runtime;
pub mod telemetry;
pub mod topology;
pub mod types;
pub mod work;
