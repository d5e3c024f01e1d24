//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use creditgate::topology::StageTopology;
use creditgate::types::{StageId, Window};
use creditgate::work::WorkUnit;

pub const UP: StageId = StageId(0);
pub const STAGE: StageId = StageId(1);
pub const DOWN: StageId = StageId(2);

/// One upstream, one downstream, explicit windows. The §8-style relay.
pub fn relay_topology(receive: Window, send: Window) -> StageTopology {
    StageTopology::builder(STAGE)
        .upstream_with_window(UP, receive)
        .downstream_with_window(DOWN, send)
        .build()
        .expect("valid relay topology")
}

/// No upstream edges; one downstream with the given window.
pub fn source_topology(send: Window) -> StageTopology {
    StageTopology::builder(STAGE)
        .downstream_with_window(DOWN, send)
        .build()
        .expect("valid source topology")
}

/// Work that counts how many times it ran; clones share the counter.
#[derive(Clone, Default)]
pub struct CountingWork {
    runs: Arc<AtomicU64>,
}

impl CountingWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }
}

impl WorkUnit for CountingWork {
    fn perform(&mut self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
}
