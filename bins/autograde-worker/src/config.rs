// Worker settings: CLI flags with environment fallbacks
use autograde_common::config::{DEFAULT_PARAMS_PATH, DEFAULT_TESTS_ROOT};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "autograde-worker")]
#[command(about = "Aggregate test lifecycle events into a partial-credit score report", long_about = None)]
pub struct WorkerConfig {
    /// Grading input bundle (results file, test classes, signature)
    #[arg(long, env = "AUTOGRADE_PARAMS", default_value = DEFAULT_PARAMS_PATH)]
    pub params: PathBuf,

    /// Lifecycle event stream, one JSON object per line ("-" for stdin)
    #[arg(long, env = "AUTOGRADE_EVENTS", default_value = "-")]
    pub events: String,

    /// Hard deadline for consuming events, in seconds
    #[arg(long, env = "AUTOGRADE_DEADLINE_SECS", default_value_t = 600)]
    pub deadline_secs: u64,

    /// Prefix stripped from test file paths to get class names
    #[arg(long, env = "AUTOGRADE_TESTS_ROOT", default_value = DEFAULT_TESTS_ROOT)]
    pub tests_root: String,

    /// Leave the params file on disk (local debugging only)
    #[arg(long, default_value_t = false)]
    pub keep_params: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Capacity of the event channel between engine and aggregator
    #[arg(long, default_value_t = 1024)]
    pub channel_capacity: usize,
}

impl WorkerConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}
