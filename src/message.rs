//! Protocol messages exchanged between pipeline stages.
//!
//! The flow controller is driven by exactly two message kinds. Both carry
//! only the sender's id; everything else the receiver needs is already in
//! its own credit ledger. Messages cross actor boundaries as copied
//! payloads, never by reference, so they derive the full serde pair.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::StageId;

/// A flow-control notification from one stage to another.
///
/// - [`DataReady`](FlowMessage::DataReady): the sending (upstream) stage
///   produced one unit of output addressed to the receiver.
/// - [`DataConsumed`](FlowMessage::DataConsumed): the sending (downstream)
///   stage freed one unit of buffer capacity previously occupied by the
///   receiver's output.
///
/// Any other traffic between actors belongs to the substrate and is
/// dispatched elsewhere; this enum is the whole protocol surface.
///
/// # Examples
///
/// ```rust
/// use creditgate::message::FlowMessage;
/// use creditgate::types::StageId;
///
/// let msg = FlowMessage::data_ready(StageId(3));
/// assert_eq!(msg.sender(), StageId(3));
/// assert_eq!(msg.to_string(), "data_ready from stage 3");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowMessage {
    /// One unit of upstream output is waiting for the receiver.
    DataReady { from: StageId },
    /// One unit of the receiver's output has been consumed downstream.
    DataConsumed { from: StageId },
}

impl FlowMessage {
    /// Construct a `DataReady` notification from the given stage.
    pub fn data_ready(from: impl Into<StageId>) -> Self {
        FlowMessage::DataReady { from: from.into() }
    }

    /// Construct a `DataConsumed` acknowledgment from the given stage.
    pub fn data_consumed(from: impl Into<StageId>) -> Self {
        FlowMessage::DataConsumed { from: from.into() }
    }

    /// The stage that sent this message.
    #[must_use]
    pub fn sender(&self) -> StageId {
        match self {
            FlowMessage::DataReady { from } | FlowMessage::DataConsumed { from } => *from,
        }
    }

    /// Stable label for logs and events.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            FlowMessage::DataReady { .. } => "data_ready",
            FlowMessage::DataConsumed { .. } => "data_consumed",
        }
    }
}

impl fmt::Display for FlowMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from stage {}", self.label(), self.sender())
    }
}
