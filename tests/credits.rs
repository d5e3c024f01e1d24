use creditgate::credits::{CreditLedger, EdgeDirection, FlowError};
use creditgate::types::{StageId, Window};

mod common;
use common::{DOWN, UP};

fn relay_ledger(receive: Window, send: Window) -> CreditLedger {
    CreditLedger::new([(UP, receive)], [(DOWN, send)])
}

#[test]
fn ready_credits_accumulate_up_to_the_window() {
    let mut ledger = relay_ledger(Window::Bounded(3), Window::Bounded(2));

    for expected in 1..=3 {
        ledger.increase_ready(UP).unwrap();
        assert_eq!(ledger.upstream(UP).unwrap().ready_count(), expected);
    }

    match ledger.increase_ready(UP) {
        Err(FlowError::CreditOverflow {
            peer,
            direction,
            attempted,
            ..
        }) => {
            assert_eq!(peer, UP);
            assert_eq!(direction, EdgeDirection::Upstream);
            assert_eq!(attempted, 4);
        }
        other => panic!("expected CreditOverflow, got {other:?}"),
    }
    // The failed increment must not have moved the counter.
    assert_eq!(ledger.upstream(UP).unwrap().ready_count(), 3);
}

#[test]
fn used_credits_respect_the_send_window() {
    let mut ledger = relay_ledger(Window::Unbounded, Window::Bounded(2));

    ledger.increase_used(DOWN).unwrap();
    ledger.increase_used(DOWN).unwrap();
    assert!(matches!(
        ledger.increase_used(DOWN),
        Err(FlowError::CreditOverflow {
            direction: EdgeDirection::Downstream,
            ..
        })
    ));
    assert_eq!(ledger.downstream(DOWN).unwrap().used_count(), 2);
}

#[test]
fn decrement_at_zero_underflows_without_mutating() {
    let mut ledger = relay_ledger(Window::Bounded(3), Window::Bounded(2));

    assert!(matches!(
        ledger.decrease_ready(UP),
        Err(FlowError::CreditUnderflow {
            direction: EdgeDirection::Upstream,
            ..
        })
    ));
    assert!(matches!(
        ledger.decrease_used(DOWN),
        Err(FlowError::CreditUnderflow {
            direction: EdgeDirection::Downstream,
            ..
        })
    ));
    assert_eq!(ledger.upstream(UP).unwrap().ready_count(), 0);
    assert_eq!(ledger.downstream(DOWN).unwrap().used_count(), 0);
}

#[test]
fn unknown_peers_are_rejected_in_both_directions() {
    let mut ledger = relay_ledger(Window::Unbounded, Window::Bounded(2));
    let stranger = StageId(99);

    assert!(matches!(
        ledger.increase_ready(stranger),
        Err(FlowError::UnknownPeer {
            peer,
            direction: EdgeDirection::Upstream,
        }) if peer == stranger
    ));
    assert!(matches!(
        ledger.decrease_used(stranger),
        Err(FlowError::UnknownPeer {
            peer,
            direction: EdgeDirection::Downstream,
        }) if peer == stranger
    ));
}

#[test]
fn unbounded_receive_window_never_overflows() {
    let mut ledger = relay_ledger(Window::Unbounded, Window::Bounded(2));
    for _ in 0..10_000 {
        ledger.increase_ready(UP).unwrap();
    }
    assert_eq!(ledger.upstream(UP).unwrap().ready_count(), 10_000);
}

#[test]
fn input_gate_is_a_join_over_all_upstream_edges() {
    let second = StageId(7);
    let mut ledger = CreditLedger::new(
        [(UP, Window::Unbounded), (second, Window::Unbounded)],
        [],
    );

    assert!(!ledger.is_input_ready());
    ledger.increase_ready(UP).unwrap();
    // One supplied edge is not enough; the least-supplied producer governs.
    assert!(!ledger.is_input_ready());
    ledger.increase_ready(second).unwrap();
    assert!(ledger.is_input_ready());
}

#[test]
fn output_gate_is_a_join_over_all_downstream_edges() {
    let second = StageId(7);
    let mut ledger = CreditLedger::new(
        [],
        [(DOWN, Window::Bounded(1)), (second, Window::Bounded(2))],
    );

    assert!(ledger.can_emit_output());
    ledger.increase_used(DOWN).unwrap();
    ledger.increase_used(second).unwrap();
    // DOWN is saturated at 1, so the whole gate closes.
    assert!(!ledger.can_emit_output());
    ledger.decrease_used(DOWN).unwrap();
    assert!(ledger.can_emit_output());
}

#[test]
fn gates_are_vacuously_true_for_sources_and_sinks() {
    let source = CreditLedger::new([], [(DOWN, Window::Bounded(2))]);
    assert!(source.is_source());
    assert!(source.is_input_ready());

    let sink = CreditLedger::new([(UP, Window::Unbounded)], []);
    assert!(sink.is_sink());
    assert!(sink.can_emit_output());
}
