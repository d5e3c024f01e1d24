use crate::types::{StageId, Window};

use super::errors::{EdgeDirection, FlowError};

/// Receive side of one upstream connection.
///
/// `ready_count` tracks how many `DataReady` notifications from `peer`
/// have not yet been consumed by a completed work unit. The invariant
/// `ready_count <= window` holds at every observable instant; the mutators
/// refuse any step that would break it.
#[derive(Clone, Copy, Debug)]
pub struct UpstreamEdge {
    peer: StageId,
    window: Window,
    ready: u64,
}

impl UpstreamEdge {
    pub(crate) fn new(peer: StageId, window: Window) -> Self {
        Self {
            peer,
            window,
            ready: 0,
        }
    }

    /// The producing peer on the far end of this edge.
    #[must_use]
    pub fn peer(&self) -> StageId {
        self.peer
    }

    /// The receive window configured for this edge.
    #[must_use]
    pub fn window(&self) -> Window {
        self.window
    }

    /// Unconsumed `DataReady` notifications from this peer.
    #[must_use]
    pub fn ready_count(&self) -> u64 {
        self.ready
    }

    /// Whether at least one input credit is available.
    #[must_use]
    pub fn has_ready(&self) -> bool {
        self.ready > 0
    }

    pub(crate) fn increment(&mut self) -> Result<(), FlowError> {
        if !self.window.admits(self.ready) {
            return Err(FlowError::CreditOverflow {
                peer: self.peer,
                direction: EdgeDirection::Upstream,
                attempted: self.ready + 1,
                window: self.window,
            });
        }
        self.ready += 1;
        Ok(())
    }

    pub(crate) fn decrement(&mut self) -> Result<(), FlowError> {
        if self.ready == 0 {
            return Err(FlowError::CreditUnderflow {
                peer: self.peer,
                direction: EdgeDirection::Upstream,
            });
        }
        self.ready -= 1;
        Ok(())
    }
}

/// Send side of one downstream connection.
///
/// `used_count` tracks how many output units have been sent to `peer` and
/// not yet acknowledged via `DataConsumed`. Same invariant discipline as
/// [`UpstreamEdge`]: `used_count <= window`, enforced by the mutators.
#[derive(Clone, Copy, Debug)]
pub struct DownstreamEdge {
    peer: StageId,
    window: Window,
    used: u64,
}

impl DownstreamEdge {
    pub(crate) fn new(peer: StageId, window: Window) -> Self {
        Self {
            peer,
            window,
            used: 0,
        }
    }

    /// The consuming peer on the far end of this edge.
    #[must_use]
    pub fn peer(&self) -> StageId {
        self.peer
    }

    /// The send window configured for this edge.
    #[must_use]
    pub fn window(&self) -> Window {
        self.window
    }

    /// Output units in flight toward this peer, not yet acknowledged.
    #[must_use]
    pub fn used_count(&self) -> u64 {
        self.used
    }

    /// Whether the send window can absorb one more unit.
    #[must_use]
    pub fn has_room(&self) -> bool {
        self.window.admits(self.used)
    }

    pub(crate) fn increment(&mut self) -> Result<(), FlowError> {
        if !self.window.admits(self.used) {
            return Err(FlowError::CreditOverflow {
                peer: self.peer,
                direction: EdgeDirection::Downstream,
                attempted: self.used + 1,
                window: self.window,
            });
        }
        self.used += 1;
        Ok(())
    }

    pub(crate) fn decrement(&mut self) -> Result<(), FlowError> {
        if self.used == 0 {
            return Err(FlowError::CreditUnderflow {
                peer: self.peer,
                direction: EdgeDirection::Downstream,
            });
        }
        self.used -= 1;
        Ok(())
    }
}
