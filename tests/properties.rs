//! Property tests for the credit contract.
//!
//! The contract: a peer never announces more readiness than its receive
//! window minus what the stage already holds, and never acknowledges more
//! than the stage has in flight toward it. Any message sequence respecting
//! that must run without a single fault, keep every counter inside its
//! window, and conserve credits exactly.

use proptest::prelude::*;

use creditgate::controller::StageController;
use creditgate::message::FlowMessage;
use creditgate::outbox::RecordingOutbox;
use creditgate::topology::StageTopology;
use creditgate::types::{StageId, Window};

mod common;
use common::CountingWork;

const STAGE: StageId = StageId(10);
const UP_A: StageId = StageId(1);
const UP_B: StageId = StageId(2);
const DOWN_C: StageId = StageId(3);
const DOWN_D: StageId = StageId(4);

const UP_A_WINDOW: u64 = 3;
const DOWN_C_WINDOW: u64 = 1;
const DOWN_D_WINDOW: u64 = 4;

fn harness() -> (StageController, CountingWork, RecordingOutbox) {
    let topology = StageTopology::builder(STAGE)
        .upstream_with_window(UP_A, Window::Bounded(UP_A_WINDOW))
        .upstream(UP_B)
        .downstream_with_window(DOWN_C, Window::Bounded(DOWN_C_WINDOW))
        .downstream_with_window(DOWN_D, Window::Bounded(DOWN_D_WINDOW))
        .build()
        .expect("valid harness topology");
    let work = CountingWork::new();
    let outbox = RecordingOutbox::default();
    let controller = StageController::new(&topology, work.clone(), outbox.clone());
    (controller, work, outbox)
}

/// Moves currently permitted by the contract, derived from observable
/// credit state exactly as a well-behaved peer would derive them.
fn valid_moves(controller: &StageController) -> Vec<FlowMessage> {
    let ledger = controller.ledger();
    let mut moves = Vec::with_capacity(4);
    if ledger.upstream(UP_A).unwrap().ready_count() < UP_A_WINDOW {
        moves.push(FlowMessage::data_ready(UP_A));
    }
    // Unbounded receive window: always permitted.
    moves.push(FlowMessage::data_ready(UP_B));
    if ledger.downstream(DOWN_C).unwrap().used_count() > 0 {
        moves.push(FlowMessage::data_consumed(DOWN_C));
    }
    if ledger.downstream(DOWN_D).unwrap().used_count() > 0 {
        moves.push(FlowMessage::data_consumed(DOWN_D));
    }
    moves
}

proptest! {
    #[test]
    fn contract_respecting_sequences_never_fault(
        choices in proptest::collection::vec(any::<u8>(), 1..256),
    ) {
        let (mut controller, work, _outbox) = harness();

        let mut sent_ready_a: u64 = 0;
        let mut sent_ready_b: u64 = 0;
        let mut acked_c: u64 = 0;
        let mut acked_d: u64 = 0;

        for choice in choices {
            let moves = valid_moves(&controller);
            let message = moves[choice as usize % moves.len()];
            match message {
                FlowMessage::DataReady { from } if from == UP_A => sent_ready_a += 1,
                FlowMessage::DataReady { .. } => sent_ready_b += 1,
                FlowMessage::DataConsumed { from } if from == DOWN_C => acked_c += 1,
                FlowMessage::DataConsumed { .. } => acked_d += 1,
            }

            let report = controller.handle(message);
            prop_assert!(report.is_ok(), "contract-respecting message faulted: {report:?}");

            // Window invariants at every observable instant.
            let ledger = controller.ledger();
            prop_assert!(ledger.upstream(UP_A).unwrap().ready_count() <= UP_A_WINDOW);
            prop_assert!(ledger.downstream(DOWN_C).unwrap().used_count() <= DOWN_C_WINDOW);
            prop_assert!(ledger.downstream(DOWN_D).unwrap().used_count() <= DOWN_D_WINDOW);
        }

        // Credit conservation: every work unit consumed exactly one credit
        // from each upstream edge and occupied exactly one slot toward
        // each downstream peer.
        let ledger = controller.ledger();
        let runs = work.runs();
        prop_assert_eq!(runs, sent_ready_a - ledger.upstream(UP_A).unwrap().ready_count());
        prop_assert_eq!(runs, sent_ready_b - ledger.upstream(UP_B).unwrap().ready_count());
        prop_assert_eq!(runs, acked_c + ledger.downstream(DOWN_C).unwrap().used_count());
        prop_assert_eq!(runs, acked_d + ledger.downstream(DOWN_D).unwrap().used_count());
    }

    #[test]
    fn outbound_traffic_matches_work_exactly(
        choices in proptest::collection::vec(any::<u8>(), 1..128),
    ) {
        let (mut controller, work, outbox) = harness();

        for choice in choices {
            let moves = valid_moves(&controller);
            let message = moves[choice as usize % moves.len()];
            controller.handle(message).expect("contract-respecting message");
        }

        // Per unit: one DataReady to each of two downstream peers, one
        // DataConsumed to each of two upstream peers.
        let sent = outbox.snapshot();
        let runs = work.runs();
        prop_assert_eq!(sent.len() as u64, runs * 4);
        let ready_out = sent
            .iter()
            .filter(|(_, m)| matches!(m, FlowMessage::DataReady { .. }))
            .count() as u64;
        prop_assert_eq!(ready_out, runs * 2);
    }
}
