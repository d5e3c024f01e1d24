//! Core identifier and window types for the creditgate protocol.
//!
//! This module defines the two vocabulary types every other module speaks
//! in: [`StageId`], the opaque address of one pipeline stage, and
//! [`Window`], the credit limit configured on one edge.
//!
//! # Examples
//!
//! ```rust
//! use creditgate::types::{StageId, Window};
//!
//! let stage = StageId(7);
//! assert_eq!(stage.to_string(), "7");
//!
//! // A bounded window admits credits only while there is room.
//! let window = Window::Bounded(2);
//! assert!(window.admits(1));
//! assert!(!window.admits(2));
//!
//! // The unbounded sentinel never blocks.
//! assert!(Window::Unbounded.admits(u64::MAX));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for one pipeline stage (one actor instance).
///
/// Stage ids are assigned by the topology layer before execution begins and
/// are globally unique within a single run. The protocol never interprets
/// the value; it is only a routing key and a map key.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct StageId(pub u64);

impl StageId {
    /// Return the raw numeric id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StageId {
    fn from(raw: u64) -> Self {
        StageId(raw)
    }
}

/// Credit limit for the outstanding notifications on one edge.
///
/// A receive window caps how many `DataReady` notifications a stage will
/// accept from one upstream peer; a send window caps how many unacknowledged
/// output units it may have in flight toward one downstream peer.
/// `Unbounded` is the explicit "no limit" sentinel used for receive windows
/// by default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Window {
    /// At most this many credits may be outstanding at once.
    Bounded(u64),
    /// No limit; the edge never blocks on this side.
    Unbounded,
}

impl Window {
    /// Whether one more credit fits given the current outstanding count.
    #[must_use]
    pub fn admits(&self, outstanding: u64) -> bool {
        match self {
            Window::Bounded(limit) => outstanding < *limit,
            Window::Unbounded => true,
        }
    }

    /// Returns `true` if this window is the unbounded sentinel.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        matches!(self, Window::Unbounded)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Bounded(limit) => write!(f, "{limit}"),
            Window::Unbounded => write!(f, "unbounded"),
        }
    }
}

impl From<u64> for Window {
    fn from(limit: u64) -> Self {
        Window::Bounded(limit)
    }
}
