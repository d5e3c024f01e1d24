use creditgate::controller::ControllerError;
use creditgate::credits::FlowError;
use creditgate::events::{FlowEventBus, FlowEventKind, MemorySink};
use creditgate::message::FlowMessage;
use creditgate::runtime::{PipelineBuilder, PipelineError};
use creditgate::topology::StageTopology;
use creditgate::types::{StageId, Window};
use creditgate::work::NoopWork;

mod common;
use common::CountingWork;

const DRIVER: StageId = StageId(100);
const HEAD: StageId = StageId(0);
const MID: StageId = StageId(1);
const TAIL: StageId = StageId(2);

fn three_stage_builder(
    head_work: CountingWork,
    mid_work: CountingWork,
    tail_work: CountingWork,
) -> PipelineBuilder {
    PipelineBuilder::new()
        .add_external(DRIVER)
        .add_stage(
            StageTopology::builder(HEAD)
                .upstream_with_window(DRIVER, Window::Bounded(16))
                .downstream_with_window(MID, Window::Bounded(2))
                .build()
                .unwrap(),
            head_work,
        )
        .add_stage(
            StageTopology::builder(MID)
                .upstream(HEAD)
                .downstream_with_window(TAIL, Window::Bounded(2))
                .build()
                .unwrap(),
            mid_work,
        )
        .add_stage(
            StageTopology::builder(TAIL).upstream(MID).build().unwrap(),
            tail_work,
        )
}

#[tokio::test]
async fn bounded_stream_flows_source_to_sink() {
    let (head, mid, tail) = (
        CountingWork::new(),
        CountingWork::new(),
        CountingWork::new(),
    );
    let bus = FlowEventBus::default();
    bus.listen();

    let pipeline = three_stage_builder(head.clone(), mid.clone(), tail.clone())
        .spawn(&bus)
        .unwrap();

    for _ in 0..6 {
        pipeline.inject(HEAD, FlowMessage::data_ready(DRIVER)).unwrap();
    }
    pipeline.settle().await;

    // Every unit moved through every stage, and every input credit was
    // acknowledged back to the driver.
    assert_eq!(head.runs(), 6);
    assert_eq!(mid.runs(), 6);
    assert_eq!(tail.runs(), 6);
    let acks: Vec<FlowMessage> = pipeline.external(DRIVER).unwrap().try_iter().collect();
    assert_eq!(acks.len(), 6);
    assert!(acks.iter().all(|m| *m == FlowMessage::data_consumed(HEAD)));

    for outcome in pipeline.shutdown().await {
        outcome.result.unwrap();
    }
    bus.stop().await;
}

#[tokio::test]
async fn send_windows_throttle_a_kicked_source() {
    let work = CountingWork::new();
    let bus = FlowEventBus::default();
    bus.listen();

    // The source's only consumer is external and never acknowledges on
    // its own, so the kick drains exactly one window's worth of work.
    let consumer = StageId(50);
    let source = StageId(7);
    let pipeline = PipelineBuilder::new()
        .add_external(consumer)
        .add_stage(
            StageTopology::builder(source)
                .downstream_with_window(consumer, Window::Bounded(2))
                .build()
                .unwrap(),
            work.clone(),
        )
        .spawn(&bus)
        .unwrap();

    pipeline.kick(source).unwrap();
    pipeline.settle().await;
    assert_eq!(work.runs(), 2);
    assert_eq!(pipeline.external(consumer).unwrap().try_iter().count(), 2);

    // Acknowledging one unit re-opens exactly one slot.
    pipeline
        .inject(source, FlowMessage::data_consumed(consumer))
        .unwrap();
    pipeline.settle().await;
    assert_eq!(work.runs(), 3);

    for outcome in pipeline.shutdown().await {
        outcome.result.unwrap();
    }
    bus.stop().await;
}

#[tokio::test]
async fn protocol_violation_faults_only_the_offending_stage() {
    let (head, mid, tail) = (
        CountingWork::new(),
        CountingWork::new(),
        CountingWork::new(),
    );
    let sink = MemorySink::new();
    let bus = FlowEventBus::with_sink(sink.clone());
    bus.listen();

    let pipeline = three_stage_builder(head.clone(), mid.clone(), tail.clone())
        .spawn(&bus)
        .unwrap();

    // An acknowledgment the head never earned: used_count is 0.
    pipeline
        .inject(HEAD, FlowMessage::data_consumed(MID))
        .unwrap();
    pipeline.settle().await;

    let outcomes = pipeline.shutdown().await;
    let head_outcome = outcomes.iter().find(|o| o.stage == HEAD).unwrap();
    assert!(matches!(
        head_outcome.result,
        Err(PipelineError::Controller(ControllerError::Flow(
            FlowError::CreditUnderflow { .. }
        )))
    ));
    for outcome in outcomes.iter().filter(|o| o.stage != HEAD) {
        assert!(outcome.result.is_ok());
    }

    bus.stop().await;
    assert!(sink.snapshot().iter().any(|event| {
        event.stage == HEAD && matches!(event.kind, FlowEventKind::StageFaulted { .. })
    }));
}

#[tokio::test]
async fn event_stream_records_work_and_blocking() {
    let sink = MemorySink::new();
    let bus = FlowEventBus::with_sink(sink.clone());
    bus.listen();

    let pipeline = three_stage_builder(
        CountingWork::new(),
        CountingWork::new(),
        CountingWork::new(),
    )
    .spawn(&bus)
    .unwrap();

    pipeline.inject(HEAD, FlowMessage::data_ready(DRIVER)).unwrap();
    pipeline.settle().await;
    for outcome in pipeline.shutdown().await {
        outcome.result.unwrap();
    }
    bus.stop().await;

    let events = sink.snapshot();
    let work_events = events
        .iter()
        .filter(|e| matches!(e.kind, FlowEventKind::WorkPerformed { .. }))
        .count();
    // One unit through three stages.
    assert_eq!(work_events, 3);
    assert!(
        events
            .iter()
            .any(|e| matches!(e.kind, FlowEventKind::DrainBlocked { .. }))
    );
}

#[tokio::test]
async fn wiring_defects_are_caught_at_spawn() {
    let bus = FlowEventBus::default();

    // Peer 9 is neither a stage nor an external.
    let result = PipelineBuilder::new()
        .add_stage(
            StageTopology::builder(StageId(1))
                .downstream(StageId(9))
                .build()
                .unwrap(),
            NoopWork,
        )
        .spawn(&bus);
    assert!(matches!(
        result,
        Err(PipelineError::UnknownStage { stage }) if stage == StageId(9)
    ));

    // Duplicate stage ids collide.
    let result = PipelineBuilder::new()
        .add_stage(StageTopology::builder(StageId(1)).build().unwrap(), NoopWork)
        .add_stage(StageTopology::builder(StageId(1)).build().unwrap(), NoopWork)
        .spawn(&bus);
    assert!(matches!(
        result,
        Err(PipelineError::DuplicateStage { stage }) if stage == StageId(1)
    ));
}
