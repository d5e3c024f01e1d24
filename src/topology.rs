//! Construction-time description of one stage's neighborhood.
//!
//! The topology collaborator hands each stage an immutable pair of peer
//! sets (who feeds it, whom it feeds) plus the window configured on each
//! edge. [`TopologyBuilder`] provides the fluent construction path and
//! validates the wiring at [`build`](TopologyBuilder::build) time; after
//! that the [`StageTopology`] never changes.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::types::{StageId, Window};

/// Send window applied to downstream edges declared without an explicit
/// one: double buffering, so a producer can fill one unit while the
/// consumer drains the other.
pub const DEFAULT_SEND_WINDOW: Window = Window::Bounded(2);

/// Immutable upstream/downstream peer sets for one stage.
///
/// A peer may legally appear on *both* sides (pipeline schedules routinely
/// run credits in a cycle between two stages); it may not appear twice on
/// the same side, and a stage may not be its own peer.
///
/// # Examples
///
/// ```rust
/// use creditgate::topology::StageTopology;
/// use creditgate::types::{StageId, Window};
///
/// let topology = StageTopology::builder(StageId(1))
///     .upstream(StageId(0))
///     .downstream_with_window(StageId(2), Window::Bounded(4))
///     .build()?;
///
/// assert!(!topology.is_source());
/// assert_eq!(topology.upstream().len(), 1);
/// # Ok::<(), creditgate::topology::TopologyError>(())
/// ```
#[derive(Clone, Debug)]
pub struct StageTopology {
    stage: StageId,
    upstream: FxHashMap<StageId, Window>,
    downstream: FxHashMap<StageId, Window>,
}

impl StageTopology {
    /// Start building the topology for `stage`.
    #[must_use]
    pub fn builder(stage: impl Into<StageId>) -> TopologyBuilder {
        TopologyBuilder {
            stage: stage.into(),
            upstream: Vec::new(),
            downstream: Vec::new(),
            default_send_window: DEFAULT_SEND_WINDOW,
        }
    }

    /// The stage this topology belongs to.
    #[must_use]
    pub fn stage(&self) -> StageId {
        self.stage
    }

    /// Receive window per upstream peer.
    #[must_use]
    pub fn upstream(&self) -> &FxHashMap<StageId, Window> {
        &self.upstream
    }

    /// Send window per downstream peer.
    #[must_use]
    pub fn downstream(&self) -> &FxHashMap<StageId, Window> {
        &self.downstream
    }

    /// Whether the stage has no upstream peers.
    #[must_use]
    pub fn is_source(&self) -> bool {
        self.upstream.is_empty()
    }

    /// Whether the stage has no downstream peers.
    #[must_use]
    pub fn is_sink(&self) -> bool {
        self.downstream.is_empty()
    }

    /// Every peer this stage exchanges messages with, both directions.
    pub fn peers(&self) -> impl Iterator<Item = StageId> + '_ {
        self.upstream
            .keys()
            .chain(self.downstream.keys())
            .copied()
    }
}

/// Fluent builder for [`StageTopology`].
///
/// Upstream edges default to an unbounded receive window; downstream edges
/// default to [`DEFAULT_SEND_WINDOW`]. Validation happens once, in
/// [`build`](Self::build).
pub struct TopologyBuilder {
    stage: StageId,
    upstream: Vec<(StageId, Window)>,
    downstream: Vec<(StageId, Window)>,
    default_send_window: Window,
}

impl TopologyBuilder {
    /// Change the window applied by subsequent [`downstream`](Self::downstream) calls.
    #[must_use]
    pub fn with_default_send_window(mut self, window: Window) -> Self {
        self.default_send_window = window;
        self
    }

    /// Declare an upstream peer with an unbounded receive window.
    #[must_use]
    pub fn upstream(self, peer: impl Into<StageId>) -> Self {
        self.upstream_with_window(peer, Window::Unbounded)
    }

    /// Declare an upstream peer with an explicit receive window.
    #[must_use]
    pub fn upstream_with_window(mut self, peer: impl Into<StageId>, window: Window) -> Self {
        self.upstream.push((peer.into(), window));
        self
    }

    /// Declare a downstream peer with the default send window.
    #[must_use]
    pub fn downstream(self, peer: impl Into<StageId>) -> Self {
        let window = self.default_send_window;
        self.downstream_with_window(peer, window)
    }

    /// Declare a downstream peer with an explicit send window.
    #[must_use]
    pub fn downstream_with_window(mut self, peer: impl Into<StageId>, window: Window) -> Self {
        self.downstream.push((peer.into(), window));
        self
    }

    /// Validate the declared edges and freeze them into a [`StageTopology`].
    pub fn build(self) -> Result<StageTopology, TopologyError> {
        let mut upstream = FxHashMap::default();
        for (peer, window) in self.upstream {
            if peer == self.stage {
                return Err(TopologyError::SelfLoop { stage: self.stage });
            }
            if upstream.insert(peer, window).is_some() {
                return Err(TopologyError::DuplicatePeer {
                    stage: self.stage,
                    peer,
                });
            }
        }

        let mut downstream = FxHashMap::default();
        for (peer, window) in self.downstream {
            if peer == self.stage {
                return Err(TopologyError::SelfLoop { stage: self.stage });
            }
            if downstream.insert(peer, window).is_some() {
                return Err(TopologyError::DuplicatePeer {
                    stage: self.stage,
                    peer,
                });
            }
        }

        Ok(StageTopology {
            stage: self.stage,
            upstream,
            downstream,
        })
    }
}

/// Wiring defects caught while freezing a topology.
#[derive(Debug, Error, Diagnostic)]
pub enum TopologyError {
    /// The same peer was declared twice on the same side of the stage.
    #[error("stage {stage}: peer {peer} declared more than once on the same side")]
    #[diagnostic(
        code(creditgate::topology::duplicate_peer),
        help("Each edge carries one window; declare the peer once per direction.")
    )]
    DuplicatePeer { stage: StageId, peer: StageId },

    /// The stage was declared as its own peer.
    #[error("stage {stage} cannot be its own peer")]
    #[diagnostic(
        code(creditgate::topology::self_loop),
        help("A stage acknowledging itself can never satisfy the credit contract; route through another stage instead.")
    )]
    SelfLoop { stage: StageId },
}
