use miette::Diagnostic;
use std::fmt;
use thiserror::Error;

use crate::types::{StageId, Window};

/// Which side of the stage the faulting edge sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeDirection {
    Upstream,
    Downstream,
}

impl fmt::Display for EdgeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeDirection::Upstream => write!(f, "upstream"),
            EdgeDirection::Downstream => write!(f, "downstream"),
        }
    }
}

/// Credit-contract violations raised by the ledger.
///
/// None of these are transient runtime conditions. They mean a peer or the
/// substrate broke the credit protocol and the counters can no longer be
/// trusted, so they are never retried or silently absorbed: the ledger
/// stops mutating state the moment one is detected and the owning actor's
/// fault boundary decides what halts.
#[derive(Debug, Error, Diagnostic)]
pub enum FlowError {
    /// A message referenced a peer missing from the configured edge set.
    #[error("unknown {direction} peer {peer}")]
    #[diagnostic(
        code(creditgate::credits::unknown_peer),
        help("Check the pipeline wiring: every message sender must appear in the stage's declared peer set.")
    )]
    UnknownPeer {
        peer: StageId,
        direction: EdgeDirection,
    },

    /// Incrementing a counter would exceed the edge's window.
    #[error("{direction} peer {peer}: {attempted} outstanding credits would exceed window {window}")]
    #[diagnostic(
        code(creditgate::credits::overflow),
        help("A peer or the substrate delivered more notifications than the declared window allows, possibly a duplicate delivery.")
    )]
    CreditOverflow {
        peer: StageId,
        direction: EdgeDirection,
        attempted: u64,
        window: Window,
    },

    /// Decrementing a counter that is already zero.
    #[error("{direction} peer {peer}: no outstanding credit to release")]
    #[diagnostic(
        code(creditgate::credits::underflow),
        help("An acknowledgment or consumption arrived with no matching outstanding credit.")
    )]
    CreditUnderflow {
        peer: StageId,
        direction: EdgeDirection,
    },
}
