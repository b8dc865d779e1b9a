//! GhostTrail Collector Daemon
//!
//! Turns a single low-noise signal (access to a planted decoy file) into a
//! self-contained incident by reconstructing the full ancestry of the
//! accessing process.
//!
//! ## Architecture
//!
//! ```text
//!  raw event ──▶ Collector ──▶ Lineage Builder ──▶ Incident Engine
//!               (validate/      (walk process       (stage + atomic
//!                normalize)      table to root)      publish)
//!                    │                │                   │
//!                rejected        ProcessTable        one directory
//!                → sinks         (procfs or          per incident
//!                                 synthetic)
//! ```
//!
//! Events are processed concurrently with isolation at the
//! incident-directory level; the only serialized state is the incident
//! engine's name allocator.

pub mod config;
pub mod event_log;
pub mod incident;
pub mod lineage;
pub mod pipeline;
pub mod proc_table;

pub use config::Config;
pub use event_log::EventLog;
pub use incident::{IncidentEngine, IncidentHandle};
pub use lineage::{
    render_dot, render_text, LineageBuilder, LineageChain, TerminalReason, DEFAULT_MAX_DEPTH,
};
pub use pipeline::{
    AsyncPipelineRunner, LogSink, MemorySink, Outcome, Pipeline, PipelineContext, PipelineStats,
    ReportSink,
};
pub use proc_table::{ProcStatus, ProcessRecord, ProcessTable, ProcfsTable, SyntheticTable};
