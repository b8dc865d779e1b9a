//! GhostTrail collector daemon entry point.
//!
//! Reads newline-delimited JSON events from stdin (the sensor transport),
//! feeds them through the async pipeline, and prints accepted/dropped totals
//! on EOF.

use ghosttrail_collectord::{
    AsyncPipelineRunner, Config, EventLog, IncidentEngine, LogSink, PipelineContext, ProcfsTable,
};
use ghosttrail_core::RawEvent;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {}", e);
            return std::process::ExitCode::from(2);
        }
    };

    if config.decoy_paths.is_empty() && config.decoy_prefixes.is_empty() {
        tracing::warn!(
            "no decoys registered (set GHOSTTRAIL_DECOYS or GHOSTTRAIL_DECOY_FILE); \
             every event will be dropped"
        );
    }

    let engine = match IncidentEngine::new(&config.incidents_dir) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!(
                dir = %config.incidents_dir.display(),
                "failed to prepare incidents directory: {}", e
            );
            return std::process::ExitCode::from(2);
        }
    };

    tracing::info!(
        incidents_dir = %config.incidents_dir.display(),
        decoys = config.decoy_paths.len() + config.decoy_prefixes.len(),
        workers = config.workers,
        "ghosttrail collector started; reading JSONL events from stdin"
    );

    let event_log = config.outfile.as_ref().map(|path| {
        tracing::info!(outfile = %path.display(), "event log enabled");
        Arc::new(EventLog::new(path))
    });

    let ctx = PipelineContext {
        registry: Arc::new(config.registry()),
        table: Arc::new(ProcfsTable::new()),
        engine,
        sinks: vec![Arc::new(LogSink)],
        event_log,
        max_depth: config.max_depth,
    };
    let (runner, stats_handle) = AsyncPipelineRunner::start(ctx, config.workers, config.channel_capacity);

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut parse_failures = 0u64;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match RawEvent::from_json_line(line) {
                    Ok(raw) => {
                        if runner.submit(raw).await.is_err() {
                            tracing::error!("pipeline closed unexpectedly");
                            break;
                        }
                    }
                    Err(e) => {
                        parse_failures += 1;
                        tracing::warn!("dropping undecodable line: {}", e);
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!("stdin read error: {}", e);
                break;
            }
        }
    }

    drop(runner);
    let stats = match stats_handle.await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::error!("pipeline workers panicked: {}", e);
            return std::process::ExitCode::from(1);
        }
    };

    tracing::info!(
        events_processed = stats.events_processed,
        incidents_committed = stats.incidents_committed,
        rejected = stats.events_rejected,
        ignored = stats.events_ignored,
        commit_failures = stats.commit_failures,
        parse_failures,
        "stopped"
    );

    std::process::ExitCode::SUCCESS
}
