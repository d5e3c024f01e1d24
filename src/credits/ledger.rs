use rustc_hash::FxHashMap;

use crate::types::{StageId, Window};

use super::edge::{DownstreamEdge, UpstreamEdge};
use super::errors::{EdgeDirection, FlowError};

/// Per-stage credit state: every receive window and every send window,
/// keyed by peer id.
///
/// The key sets are fixed when the ledger is built from the topology; only
/// the counters mutate afterwards, and only through the four mutators
/// below. The ledger is exclusively owned by its stage's actor and touched
/// one message at a time, so mutual exclusion is structural. No locks, no
/// atomics.
///
/// # Examples
///
/// ```rust
/// use creditgate::credits::CreditLedger;
/// use creditgate::types::{StageId, Window};
///
/// let mut ledger = CreditLedger::new(
///     [(StageId(1), Window::Bounded(3))],
///     [(StageId(2), Window::Bounded(2))],
/// );
///
/// assert!(!ledger.is_input_ready());
/// ledger.increase_ready(StageId(1)).unwrap();
/// assert!(ledger.is_input_ready() && ledger.can_emit_output());
/// ```
#[derive(Clone, Debug)]
pub struct CreditLedger {
    upstream: FxHashMap<StageId, UpstreamEdge>,
    downstream: FxHashMap<StageId, DownstreamEdge>,
}

impl CreditLedger {
    /// Build a ledger with zeroed counters from the given edge windows.
    pub fn new(
        upstream: impl IntoIterator<Item = (StageId, Window)>,
        downstream: impl IntoIterator<Item = (StageId, Window)>,
    ) -> Self {
        Self {
            upstream: upstream
                .into_iter()
                .map(|(peer, window)| (peer, UpstreamEdge::new(peer, window)))
                .collect(),
            downstream: downstream
                .into_iter()
                .map(|(peer, window)| (peer, DownstreamEdge::new(peer, window)))
                .collect(),
        }
    }

    /// Record one `DataReady` notification from `peer`.
    pub fn increase_ready(&mut self, peer: StageId) -> Result<(), FlowError> {
        self.upstream
            .get_mut(&peer)
            .ok_or(FlowError::UnknownPeer {
                peer,
                direction: EdgeDirection::Upstream,
            })?
            .increment()
    }

    /// Consume one input credit from `peer` for a completed work unit.
    pub fn decrease_ready(&mut self, peer: StageId) -> Result<(), FlowError> {
        self.upstream
            .get_mut(&peer)
            .ok_or(FlowError::UnknownPeer {
                peer,
                direction: EdgeDirection::Upstream,
            })?
            .decrement()
    }

    /// Record one output unit sent toward `peer`.
    pub fn increase_used(&mut self, peer: StageId) -> Result<(), FlowError> {
        self.downstream
            .get_mut(&peer)
            .ok_or(FlowError::UnknownPeer {
                peer,
                direction: EdgeDirection::Downstream,
            })?
            .increment()
    }

    /// Release one output credit on receiving `DataConsumed` from `peer`.
    pub fn decrease_used(&mut self, peer: StageId) -> Result<(), FlowError> {
        self.downstream
            .get_mut(&peer)
            .ok_or(FlowError::UnknownPeer {
                peer,
                direction: EdgeDirection::Downstream,
            })?
            .decrement()
    }

    /// True iff every upstream edge holds at least one ready credit.
    ///
    /// Vacuously true for a source stage (no upstream edges). This is a
    /// join over all edges: the least-supplied producer governs.
    #[must_use]
    pub fn is_input_ready(&self) -> bool {
        self.upstream.values().all(UpstreamEdge::has_ready)
    }

    /// True iff every downstream send window has room for one more unit.
    ///
    /// Vacuously true for a sink stage (no downstream edges). The most
    /// saturated consumer governs.
    #[must_use]
    pub fn can_emit_output(&self) -> bool {
        self.downstream.values().all(DownstreamEdge::has_room)
    }

    /// The upstream edge for `peer`, if one is configured.
    #[must_use]
    pub fn upstream(&self, peer: StageId) -> Option<&UpstreamEdge> {
        self.upstream.get(&peer)
    }

    /// The downstream edge for `peer`, if one is configured.
    #[must_use]
    pub fn downstream(&self, peer: StageId) -> Option<&DownstreamEdge> {
        self.downstream.get(&peer)
    }

    /// All upstream edges, in no particular order.
    pub fn upstream_edges(&self) -> impl Iterator<Item = &UpstreamEdge> {
        self.upstream.values()
    }

    /// All downstream edges, in no particular order.
    pub fn downstream_edges(&self) -> impl Iterator<Item = &DownstreamEdge> {
        self.downstream.values()
    }

    /// Whether this stage has no upstream edges.
    #[must_use]
    pub fn is_source(&self) -> bool {
        self.upstream.is_empty()
    }

    /// Whether this stage has no downstream edges.
    #[must_use]
    pub fn is_sink(&self) -> bool {
        self.downstream.is_empty()
    }
}
