//! Credit accounting for one stage's edges.
//!
//! A stage holds one [`UpstreamEdge`] per producer feeding it and one
//! [`DownstreamEdge`] per consumer it feeds. The [`CreditLedger`] owns both
//! sets, keyed by peer id, and exposes the only four operations that may
//! mutate a counter plus the two gate predicates the run loop evaluates.
//!
//! Every failure here is a broken contract: a peer or the substrate sent
//! something the declared windows do not permit, and that is fatal to the
//! stage. See [`FlowError`].

mod edge;
mod errors;
mod ledger;

pub use edge::{DownstreamEdge, UpstreamEdge};
pub use errors::{EdgeDirection, FlowError};
pub use ledger::CreditLedger;
