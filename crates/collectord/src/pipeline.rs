//! Event processing pipeline.
//!
//! Control flow is linear per event: Collector (validate/normalize) →
//! Lineage Builder (walk the triggering pid) → Incident Engine (atomic
//! commit). Events are processed concurrently by independent workers; the
//! only serialized state is the engine's name allocator. One malformed or
//! unwalkable event never affects others in flight.

use crate::event_log::EventLog;
use crate::incident::{IncidentEngine, IncidentHandle};
use crate::lineage::LineageBuilder;
use crate::proc_table::ProcessTable;
use ghosttrail_core::error::{CommitError, FailureReport, RejectReason};
use ghosttrail_core::{Collector, DecoyRegistry, RawEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Result of processing one raw event.
#[derive(Debug)]
pub enum Outcome {
    Committed(IncidentHandle),
    /// Schema-invalid or not decoy relevant; the reason says which.
    Rejected(RejectReason),
    /// Alert was produced but the incident could not be materialized.
    /// Reported, never retried.
    CommitFailed {
        alert_id: String,
        error: CommitError,
    },
}

/// Sink for rejected events and failed commits (spec: failure-reporting
/// interface). Implementations must tolerate concurrent calls.
pub trait ReportSink: Send + Sync {
    fn report(&self, report: &FailureReport);
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemorySink {
    reports: std::sync::Mutex<Vec<FailureReport>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<FailureReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl ReportSink for MemorySink {
    fn report(&self, report: &FailureReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

/// Sink that surfaces failures through the tracing subscriber.
pub struct LogSink;

impl ReportSink for LogSink {
    fn report(&self, report: &FailureReport) {
        tracing::warn!(
            code = %report.code,
            alert_id = report.alert_id.as_deref().unwrap_or("-"),
            "{}",
            report.detail
        );
    }
}

#[derive(Debug, Default, Clone)]
pub struct PipelineStats {
    pub events_processed: u64,
    pub incidents_committed: u64,
    /// Schema-invalid events.
    pub events_rejected: u64,
    /// Valid events that did not match the trigger predicate.
    pub events_ignored: u64,
    pub commit_failures: u64,
}

impl PipelineStats {
    pub fn merge(&mut self, other: &PipelineStats) {
        self.events_processed += other.events_processed;
        self.incidents_committed += other.incidents_committed;
        self.events_rejected += other.events_rejected;
        self.events_ignored += other.events_ignored;
        self.commit_failures += other.commit_failures;
    }
}

/// Shared, immutable pipeline dependencies. Cheap to clone into workers.
#[derive(Clone)]
pub struct PipelineContext {
    pub registry: Arc<DecoyRegistry>,
    pub table: Arc<dyn ProcessTable>,
    pub engine: Arc<IncidentEngine>,
    pub sinks: Vec<Arc<dyn ReportSink>>,
    /// Append-only JSONL stream of every schema-valid event, trigger or not.
    pub event_log: Option<Arc<EventLog>>,
    pub max_depth: usize,
}

pub struct Pipeline {
    collector: Collector,
    builder: LineageBuilder,
    engine: Arc<IncidentEngine>,
    sinks: Vec<Arc<dyn ReportSink>>,
    event_log: Option<Arc<EventLog>>,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(ctx: &PipelineContext) -> Self {
        Self {
            collector: Collector::new(ctx.registry.clone()),
            builder: LineageBuilder::new(ctx.table.clone()).with_max_depth(ctx.max_depth),
            engine: ctx.engine.clone(),
            sinks: ctx.sinks.clone(),
            event_log: ctx.event_log.clone(),
            stats: PipelineStats::default(),
        }
    }

    /// Process one raw event end to end. Walk-level truncation (vanished,
    /// denied, cycle, depth) is recorded inside the incident artifacts and
    /// still commits; only validation and commit failures surface here.
    pub fn process(&mut self, raw: &RawEvent) -> Outcome {
        self.stats.events_processed += 1;

        let alert = match self.collector.normalize(raw) {
            Ok(alert) => {
                self.log_event(raw);
                alert
            }
            Err(reason) => {
                if reason.is_reportable() {
                    self.stats.events_rejected += 1;
                    self.dispatch(&FailureReport::rejected(&reason));
                } else {
                    // Schema-valid, just not a decoy hit: it still belongs in
                    // the event log.
                    self.log_event(raw);
                    self.stats.events_ignored += 1;
                    tracing::debug!("event ignored: {}", reason);
                }
                return Outcome::Rejected(reason);
            }
        };

        let chain = self.builder.build(alert.pid);

        match self.engine.commit(&alert, &chain) {
            Ok(handle) => {
                self.stats.incidents_committed += 1;
                tracing::info!(incident_id = %handle.incident_id, "{}", alert.summary());
                Outcome::Committed(handle)
            }
            Err(error) => {
                self.stats.commit_failures += 1;
                self.dispatch(&FailureReport::commit_failed(&alert.alert_id, &error));
                Outcome::CommitFailed {
                    alert_id: alert.alert_id,
                    error,
                }
            }
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    fn dispatch(&self, report: &FailureReport) {
        for sink in &self.sinks {
            sink.report(report);
        }
    }

    /// A full event log is not worth dropping incidents over: append failures
    /// are logged and processing continues.
    fn log_event(&self, raw: &RawEvent) {
        if let Some(log) = &self.event_log {
            if let Err(e) = log.append(raw) {
                tracing::warn!(path = %log.path().display(), "event log append failed: {}", e);
            }
        }
    }
}

/// Async runner: a bounded channel feeding a pool of worker tasks, each
/// independently running the linear collect → walk → commit flow.
pub struct AsyncPipelineRunner {
    tx: mpsc::Sender<RawEvent>,
}

impl AsyncPipelineRunner {
    /// Start `workers` worker tasks. Returns the submit handle and a join
    /// handle resolving to the merged stats once the channel closes and all
    /// workers drain.
    pub fn start(
        ctx: PipelineContext,
        workers: usize,
        capacity: usize,
    ) -> (Self, tokio::task::JoinHandle<PipelineStats>) {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<RawEvent>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let supervisor = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                let rx = rx.clone();
                let ctx = ctx.clone();
                handles.push(tokio::spawn(async move {
                    let mut pipeline = Pipeline::new(&ctx);
                    loop {
                        let event = { rx.lock().await.recv().await };
                        match event {
                            Some(raw) => {
                                let _ = pipeline.process(&raw);
                            }
                            None => break,
                        }
                    }
                    pipeline.stats().clone()
                }));
            }

            let mut total = PipelineStats::default();
            for handle in handles {
                if let Ok(stats) = handle.await {
                    total.merge(&stats);
                }
            }
            total
        });

        (Self { tx }, supervisor)
    }

    pub async fn submit(&self, raw: RawEvent) -> Result<(), mpsc::error::SendError<RawEvent>> {
        self.tx.send(raw).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc_table::SyntheticTable;

    fn context(dir: &std::path::Path) -> (PipelineContext, Arc<MemorySink>) {
        let mut table = SyntheticTable::new();
        table
            .insert(50, 10, "bash", 500)
            .insert(10, 1, "sshd", 100)
            .insert(1, 0, "systemd", 1);

        let sink = Arc::new(MemorySink::new());
        let ctx = PipelineContext {
            registry: Arc::new(DecoyRegistry::with_entries(
                ["/tmp/decoy.txt"],
                Vec::<std::path::PathBuf>::new(),
            )),
            table: Arc::new(table),
            engine: Arc::new(IncidentEngine::new(dir).unwrap()),
            sinks: vec![sink.clone()],
            event_log: None,
            max_depth: 25,
        };
        (ctx, sink)
    }

    fn raw(json: serde_json::Value) -> RawEvent {
        RawEvent::from_value(json).unwrap()
    }

    #[test]
    fn test_trigger_event_commits_incident() {
        let dir = tempfile::TempDir::new().unwrap();
        let (ctx, _sink) = context(dir.path());
        let mut pipeline = Pipeline::new(&ctx);

        let outcome = pipeline.process(&raw(serde_json::json!({
            "ts": "2024-06-01T12:00:00Z",
            "event_type": "file_open",
            "pid": 50,
            "path": "/tmp/decoy.txt"
        })));

        match outcome {
            Outcome::Committed(handle) => {
                assert!(handle.dir.join("lineage.txt").is_file());
            }
            other => panic!("expected commit, got {:?}", other),
        }
        assert_eq!(pipeline.stats().incidents_committed, 1);
    }

    #[test]
    fn test_schema_invalid_reaches_sink_not_builder() {
        let dir = tempfile::TempDir::new().unwrap();
        let (ctx, sink) = context(dir.path());
        let mut pipeline = Pipeline::new(&ctx);

        let outcome = pipeline.process(&raw(serde_json::json!({
            "event_type": "file_open",
            "pid": 50,
            "path": "/tmp/decoy.txt"
        })));

        assert!(matches!(
            outcome,
            Outcome::Rejected(RejectReason::SchemaInvalid { .. })
        ));
        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].code, "schema_invalid");
        // Nothing was committed.
        assert_eq!(pipeline.stats().incidents_committed, 0);
    }

    #[test]
    fn test_non_matching_event_is_silent_no_op() {
        let dir = tempfile::TempDir::new().unwrap();
        let (ctx, sink) = context(dir.path());
        let mut pipeline = Pipeline::new(&ctx);

        let event = serde_json::json!({
            "ts": "2024-06-01T12:00:00Z",
            "event_type": "file_open",
            "pid": 50,
            "path": "/home/user/real-file.txt"
        });

        // Idempotent: twice through, zero incidents both times.
        for _ in 0..2 {
            let outcome = pipeline.process(&raw(event.clone()));
            assert!(matches!(
                outcome,
                Outcome::Rejected(RejectReason::NotDecoyRelevant)
            ));
        }
        assert_eq!(pipeline.stats().events_ignored, 2);
        assert_eq!(pipeline.stats().incidents_committed, 0);
        // Intentional drops are not failures and do not reach the sink.
        assert!(sink.reports().is_empty());
    }

    #[test]
    fn test_event_log_captures_schema_valid_events_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let (mut ctx, _sink) = context(dir.path());
        let log_path = dir.path().join("alerts.jsonl");
        ctx.event_log = Some(Arc::new(crate::event_log::EventLog::new(&log_path)));
        let mut pipeline = Pipeline::new(&ctx);

        // Trigger hit: logged and committed.
        pipeline.process(&raw(serde_json::json!({
            "ts": "2024-06-01T12:00:00Z",
            "event_type": "file_open",
            "pid": 50,
            "path": "/tmp/decoy.txt"
        })));
        // Schema-valid non-trigger: logged, no incident.
        pipeline.process(&raw(serde_json::json!({
            "ts": "2024-06-01T12:00:01Z",
            "event_type": "exec",
            "pid": 50,
            "path": "/usr/bin/nc"
        })));
        // Schema-invalid (missing ts): kept out of the log.
        pipeline.process(&raw(serde_json::json!({
            "event_type": "file_open",
            "pid": 50,
            "path": "/tmp/decoy.txt"
        })));

        let content = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"file_open\""));
        assert!(lines[1].contains("\"exec\""));
        assert_eq!(pipeline.stats().incidents_committed, 1);
    }

    #[test]
    fn test_commit_failure_is_reported_not_retried() {
        let dir = tempfile::TempDir::new().unwrap();
        let (ctx, sink) = context(dir.path());
        let mut pipeline = Pipeline::new(&ctx);

        // Break the base directory after engine creation.
        std::fs::remove_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path(), b"").unwrap();

        let outcome = pipeline.process(&raw(serde_json::json!({
            "ts": "2024-06-01T12:00:00Z",
            "event_type": "file_open",
            "pid": 50,
            "path": "/tmp/decoy.txt"
        })));

        assert!(matches!(outcome, Outcome::CommitFailed { .. }));
        assert_eq!(pipeline.stats().commit_failures, 1);
        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].code, "commit_failed");
        assert!(reports[0].alert_id.is_some());
    }

    #[tokio::test]
    async fn test_async_runner_processes_and_drains() {
        let dir = tempfile::TempDir::new().unwrap();
        let (ctx, _sink) = context(dir.path());

        let (runner, handle) = AsyncPipelineRunner::start(ctx, 4, 16);
        for _ in 0..10 {
            runner
                .submit(raw(serde_json::json!({
                    "ts": "2024-06-01T12:00:00Z",
                    "event_type": "file_open",
                    "pid": 50,
                    "path": "/tmp/decoy.txt"
                })))
                .await
                .unwrap();
        }
        drop(runner);

        let stats = handle.await.unwrap();
        assert_eq!(stats.events_processed, 10);
        assert_eq!(stats.incidents_committed, 10);

        let incidents: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name() != ".staging")
            .collect();
        assert_eq!(incidents.len(), 10);
    }
}
