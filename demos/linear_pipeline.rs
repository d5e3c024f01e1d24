//! Three-stage linear pipeline driven end to end.
//!
//! An external driver feeds `DataReady` announcements into the leading
//! stage, units flow through a transform into a sink, and acknowledgments
//! ripple back to the driver. Work units just bump counters; the
//! interesting part is watching the credit windows throttle each hop.
//!
//! Run with `cargo run --example linear_pipeline`, optionally with
//! `RUST_LOG=creditgate=debug` for per-message traces.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use creditgate::events::{FlowEventBus, FlowEventKind, MemorySink};
use creditgate::message::FlowMessage;
use creditgate::runtime::PipelineBuilder;
use creditgate::telemetry;
use creditgate::topology::StageTopology;
use creditgate::types::{StageId, Window};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init();

    let driver = StageId(100);
    let head = StageId(0);
    let transform = StageId(1);
    let tail = StageId(2);

    let counters: Vec<Arc<AtomicU64>> = (0..3).map(|_| Arc::new(AtomicU64::new(0))).collect();
    let count = |idx: usize| {
        let counter = counters[idx].clone();
        move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    };

    let events = MemorySink::new();
    let bus = FlowEventBus::with_sink(events.clone());
    bus.listen();

    let pipeline = PipelineBuilder::new()
        .add_external(driver)
        .add_stage(
            StageTopology::builder(head)
                .upstream_with_window(driver, Window::Bounded(8))
                .downstream_with_window(transform, Window::Bounded(2))
                .build()?,
            count(0),
        )
        .add_stage(
            StageTopology::builder(transform)
                .upstream(head)
                .downstream_with_window(tail, Window::Bounded(2))
                .build()?,
            count(1),
        )
        .add_stage(
            StageTopology::builder(tail).upstream(transform).build()?,
            count(2),
        )
        .spawn(&bus)?;

    // Announce six units of input on the driver's behalf and let the
    // credits circulate until everything lands in the sink.
    for _ in 0..6 {
        pipeline.inject(head, FlowMessage::data_ready(driver))?;
    }
    pipeline.settle().await;

    let acks = pipeline.external(driver)?.try_iter().count();

    for outcome in pipeline.shutdown().await {
        outcome.result?;
    }
    bus.stop().await;

    for (idx, name) in ["head", "transform", "tail"].iter().enumerate() {
        println!(
            "{name}: {} work units",
            counters[idx].load(Ordering::Relaxed)
        );
    }
    println!("acknowledgments back to driver: {acks}");
    let sent = events
        .snapshot()
        .iter()
        .filter(|event| matches!(event.kind, FlowEventKind::MessageSent { .. }))
        .count();
    println!("protocol messages sent: {sent}");

    Ok(())
}
