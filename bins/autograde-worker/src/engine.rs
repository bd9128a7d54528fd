/// Event Source - Boundary to the Test Execution Engine
///
/// **Core Responsibility:**
/// Move lifecycle events from the external engine onto the aggregation
/// channel.
///
/// **Critical Architectural Boundary:**
/// - The engine knows HOW tests are discovered and run
/// - The engine does NOT know point weights or scoring
/// - This module does NOT interpret events, it only forwards them
///
/// Producers hold a cloneable `EventSink`, so several engine workers can
/// feed one aggregator. The NDJSON adapter reads one event per line from a
/// file or stdin.

use anyhow::{Context, Result};
use autograde_common::events::LifecycleEvent;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Reads events from standard input
pub const STDIN_SOURCE: &str = "-";

/// Producer half of the aggregation channel
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<LifecycleEvent>,
}

impl EventSink {
    /// Forward one event; returns false once the aggregator stopped listening
    pub async fn send(&self, event: LifecycleEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }
}

/// Create the bounded channel between the engine and the aggregator
pub fn channel(capacity: usize) -> (EventSink, mpsc::Receiver<LifecycleEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink { tx }, rx)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub forwarded: usize,
    pub skipped: usize,
}

pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

/// Newline-delimited JSON lifecycle events
pub struct JsonLinesSource<R> {
    reader: R,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Forward every parseable line until end of stream
    ///
    /// Lines that fail to parse are logged and skipped; a truncated final
    /// line is what a killed engine usually leaves behind. A read error ends
    /// the stream like end-of-file does.
    pub async fn pump(self, sink: EventSink) -> PumpStats {
        let mut lines = BufReader::new(self.reader).lines();
        let mut stats = PumpStats::default();
        let mut line_no = 0usize;

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(line_no, error = %e, "Event stream read failed; treating as end of stream");
                    break;
                }
            };
            line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            let event: LifecycleEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(line_no, error = %e, "Skipping unparseable event line");
                    stats.skipped += 1;
                    continue;
                }
            };

            if !sink.send(event).await {
                debug!(line_no, "Aggregator stopped listening");
                break;
            }
            stats.forwarded += 1;
        }

        info!(
            forwarded = stats.forwarded,
            skipped = stats.skipped,
            "Event stream drained"
        );
        stats
    }
}

/// Open the configured event source: a file path, or `-` for stdin
pub async fn open(source: &str) -> Result<JsonLinesSource<BoxedReader>> {
    if source == STDIN_SOURCE {
        return Ok(JsonLinesSource::new(Box::new(tokio::io::stdin())));
    }

    let path = Path::new(source);
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open event stream {}", path.display()))?;

    Ok(JsonLinesSource::new(Box::new(file)))
}
