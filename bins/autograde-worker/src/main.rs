mod aggregator;
mod config;
mod engine;
mod executor;
mod policy;
mod registry;
mod report;


use autograde_common::config::GradingParams;
use autograde_common::results;
use clap::Parser;
use config::{LogFormat, WorkerConfig};
use std::path::Path;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolves on ctrl-c; never resolves if the handler cannot be installed
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    warn!("Received shutdown signal, writing results...");
}

#[tokio::main]
async fn main() {
    let config = WorkerConfig::parse();
    init_tracing(config.log_format);

    info!("Autograde worker booting...");

    let loaded = if config.keep_params {
        GradingParams::load(&config.params)
    } else {
        GradingParams::load_and_remove(&config.params)
    };
    let params = match loaded {
        Ok(params) => params,
        Err(e) => {
            error!(params = %config.params.display(), error = %format!("{:#}", e), "Failed to load grading params");
            error!("No results file will be produced");
            std::process::exit(1);
        }
    };

    info!(
        results_file = %params.results_file,
        test_files = params.test_file_list().len(),
        deadline_secs = config.deadline_secs,
        "Grading params loaded"
    );

    let report = match engine::open(&config.events).await {
        Ok(source) => executor::grade(&params, &config, source, shutdown_signal()).await,
        Err(e) => executor::grade_unavailable(&params, &config, &format!("{:#}", e)),
    };

    let results_path = Path::new(&params.results_file);
    match results::write_report(results_path, &report) {
        Ok(()) => info!(
            results_file = %results_path.display(),
            points = report.points,
            max_points = report.max_points,
            gradable = report.gradable,
            "Results written"
        ),
        Err(e) => error!(error = %format!("{:#}", e), "Failed to write results"),
    }

    teardown()
}

/// Terminate unconditionally once results are written; lingering engine
/// threads or tasks must not keep the grader alive
fn teardown() -> ! {
    info!("Grader shutdown complete");
    std::process::exit(0)
}
