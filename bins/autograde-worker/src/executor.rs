/// Grading Run - High-Level Orchestration
///
/// **Responsibility:**
/// Wire the event source, the aggregator and the report builder together
/// for one run.
///
/// **Flow:**
/// 1. Derive the selected class names from the params bundle
/// 2. Spawn the event source, pushing onto a bounded channel
/// 3. Consume events on this task until the plan finishes, the stream ends,
///    the deadline passes, or shutdown is requested
/// 4. Build the report from whatever state was reached
///
/// This module is the glue layer - it knows nothing about:
/// - How tests are executed (engine's job)
/// - How weights or totals are computed (aggregator's and report's job)

use crate::aggregator::ScoreAggregator;
use crate::config::WorkerConfig;
use crate::engine::{self, JsonLinesSource};
use crate::report;
use autograde_common::config::{class_name_from_source, GradingParams};
use autograde_common::events::LifecycleEvent;
use autograde_common::types::Report;
use std::future::Future;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

/// How event consumption ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The aggregator asked to stop (plan finished, or discovery failed)
    Completed,
    /// The stream ended first; the engine most likely crashed
    StreamEnded,
    DeadlineExceeded,
    /// An external shutdown request arrived first
    Interrupted,
}

/// Class names selected by the params bundle, logged as they are resolved
pub fn selected_classes(params: &GradingParams, tests_root: &str) -> Vec<String> {
    params
        .test_file_list()
        .into_iter()
        .map(|source| {
            let class_name = class_name_from_source(source, tests_root);
            info!("Test class: {} (from {})", class_name, source);
            class_name
        })
        .collect()
}

fn new_aggregator(params: &GradingParams, config: &WorkerConfig) -> ScoreAggregator {
    ScoreAggregator::new(
        selected_classes(params, &config.tests_root),
        params.compile_warnings_message(),
    )
}

/// Drain the channel into the aggregator, single-threaded
async fn consume(
    aggregator: &mut ScoreAggregator,
    rx: &mut mpsc::Receiver<LifecycleEvent>,
) -> Termination {
    while let Some(event) = rx.recv().await {
        if aggregator.handle(event).is_break() {
            return Termination::Completed;
        }
    }
    Termination::StreamEnded
}

/// Run one grading pass over an event source and build the report
#[instrument(skip_all, fields(run_id = %uuid::Uuid::new_v4()))]
pub async fn grade<R, S>(
    params: &GradingParams,
    config: &WorkerConfig,
    source: JsonLinesSource<R>,
    shutdown: S,
) -> Report
where
    R: AsyncRead + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    let mut aggregator = new_aggregator(params, config);

    let (sink, mut rx) = engine::channel(config.channel_capacity);
    let pump = tokio::spawn(source.pump(sink));

    let deadline = config.deadline();
    let consumed = tokio::select! {
        consumed = tokio::time::timeout(deadline, consume(&mut aggregator, &mut rx)) => Some(consumed),
        _ = shutdown => None,
    };
    let termination = match consumed {
        Some(Ok(termination)) => termination,
        Some(Err(_)) => {
            aggregator.note_deadline_exceeded(deadline.as_secs());
            Termination::DeadlineExceeded
        }
        None => {
            aggregator.note_interrupted();
            Termination::Interrupted
        }
    };

    // No further events are consumed past this point
    rx.close();
    pump.abort();

    match termination {
        Termination::Completed => info!("Event consumption completed"),
        Termination::StreamEnded => {
            warn!("Event stream ended before the plan finished; reporting provisional results")
        }
        Termination::DeadlineExceeded => {
            warn!(deadline_secs = deadline.as_secs(), "Reporting results reached before the deadline")
        }
        Termination::Interrupted => warn!("Shutdown requested; reporting results reached so far"),
    }

    report::build(&aggregator.finish(), params.signature.clone())
}

/// Report for a run whose event source could not be opened
pub fn grade_unavailable(params: &GradingParams, config: &WorkerConfig, detail: &str) -> Report {
    let mut aggregator = new_aggregator(params, config);
    aggregator.on_source_unavailable(detail);
    report::build(&aggregator.finish(), params.signature.clone())
}
