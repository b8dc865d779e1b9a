//! Lineage Builder: walk the live process table from a triggering pid up to
//! an unreachable or root ancestor.
//!
//! The walk holds no lock on the process table; it races normal process
//! churn. Every step independently tolerates the referenced process having
//! exited between observations, and pid identity is never trusted alone
//! across steps (start-time correlation in the reader, explicit cycle guard
//! here).

use crate::proc_table::{ProcStatus, ProcessRecord, ProcessTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

/// Why the walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// Reached the root ancestor (init, or a process with no parent).
    ReachedRoot,
    /// An ancestor exited or was reaped before it could be observed.
    Vanished,
    /// An ancestor's fields were unreadable for privilege reasons.
    PermissionDenied,
    /// A parent pointed back into the chain; pid reuse during a slow walk
    /// can fabricate such loops.
    CycleDetected,
    /// Configured maximum traversal depth reached.
    DepthLimit,
}

impl TerminalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::ReachedRoot => "reached_root",
            TerminalReason::Vanished => "vanished",
            TerminalReason::PermissionDenied => "permission_denied",
            TerminalReason::CycleDetected => "cycle_detected",
            TerminalReason::DepthLimit => "depth_limit",
        }
    }
}

/// Ordered ancestry chain: index 0 is the triggering process, the last entry
/// the furthest reachable ancestor (or a terminal marker record).
///
/// Invariant: for adjacent observed entries, `records[i].ppid ==
/// records[i+1].pid`. Built once per incident, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageChain {
    pub records: Vec<ProcessRecord>,
    pub terminal: TerminalReason,
}

impl LineageChain {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Default traversal bound; deep enough for any sane ancestry, shallow
/// enough to cut off corrupted chains.
pub const DEFAULT_MAX_DEPTH: usize = 25;

pub struct LineageBuilder {
    table: Arc<dyn ProcessTable>,
    max_depth: usize,
}

impl LineageBuilder {
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self {
            table,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// `build(startPid) -> LineageChain`.
    pub fn build(&self, start_pid: u32) -> LineageChain {
        let mut records: Vec<ProcessRecord> = Vec::new();
        let mut seen: BTreeSet<u32> = BTreeSet::new();
        let mut current = start_pid;
        let mut depth = 0usize;

        loop {
            let record = self.table.read(current);

            match record.status {
                ProcStatus::Vanished => {
                    // Terminal marker record; disappearance is a valid
                    // terminal state, never retried.
                    records.push(record);
                    return LineageChain {
                        records,
                        terminal: TerminalReason::Vanished,
                    };
                }
                ProcStatus::Denied => {
                    records.push(record);
                    return LineageChain {
                        records,
                        terminal: TerminalReason::PermissionDenied,
                    };
                }
                ProcStatus::Observed => {}
            }

            let pid = record.pid;
            let ppid = record.ppid;
            seen.insert(pid);
            records.push(record);

            // Cycle guard before the root check: a reused pid pointing back
            // into the chain must never be mistaken for ancestry.
            if ppid == pid || seen.contains(&ppid) {
                return LineageChain {
                    records,
                    terminal: TerminalReason::CycleDetected,
                };
            }

            // ppid 0 is the "no parent" sentinel; pid 1 is init itself.
            if ppid == 0 || pid == 1 {
                return LineageChain {
                    records,
                    terminal: TerminalReason::ReachedRoot,
                };
            }

            depth += 1;
            if depth >= self.max_depth {
                return LineageChain {
                    records,
                    terminal: TerminalReason::DepthLimit,
                };
            }

            current = ppid;
        }
    }
}

// ============================================================================
// Renderings
// ============================================================================

/// Plain-text rendering: one record per line, leaf-to-root (triggering
/// process first, matching chain index order), terminal reason on the last
/// line.
pub fn render_text(chain: &LineageChain) -> String {
    let mut out = String::new();
    for record in &chain.records {
        match record.status {
            ProcStatus::Observed => {
                let uid = record
                    .uid
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "?".to_string());
                let _ = writeln!(
                    out,
                    "pid={} ppid={} uid={} comm={} exe={} cmdline={}",
                    record.pid,
                    record.ppid,
                    uid,
                    record.comm,
                    record.exe.as_deref().unwrap_or(""),
                    record.cmdline.as_deref().unwrap_or(&record.comm),
                );
            }
            ProcStatus::Vanished => {
                let _ = writeln!(out, "pid={} status=vanished", record.pid);
            }
            ProcStatus::Denied => {
                let _ = writeln!(out, "pid={} status=permission_denied", record.pid);
            }
        }
    }
    let _ = writeln!(out, "terminal: {}", chain.terminal.as_str());
    out
}

/// Graphviz rendering: one node per distinct process keyed by pid plus start
/// time (pid reuse safe), one directed parent -> child edge per adjacent pair
/// in the chain.
pub fn render_dot(chain: &LineageChain) -> String {
    let mut out = String::new();
    out.push_str("digraph lineage {\n");
    out.push_str("  rankdir=\"LR\";\n");
    out.push_str("  node [shape=\"box\"];\n");

    for record in &chain.records {
        let key = record.node_key();
        match record.status {
            ProcStatus::Observed => {
                let _ = writeln!(
                    out,
                    "  \"{}\" [label=\"{}\"];",
                    key,
                    dot_label(record)
                );
            }
            ProcStatus::Vanished => {
                let _ = writeln!(
                    out,
                    "  \"{}\" [label=\"{}\\nvanished\" style=\"dashed\"];",
                    key, record.pid
                );
            }
            ProcStatus::Denied => {
                let _ = writeln!(
                    out,
                    "  \"{}\" [label=\"{}\\npermission denied\" style=\"dashed\"];",
                    key, record.pid
                );
            }
        }
    }

    // records[i+1] is the parent of records[i]; edges point parent -> child.
    for pair in chain.records.windows(2) {
        let _ = writeln!(
            out,
            "  \"{}\" -> \"{}\";",
            pair[1].node_key(),
            pair[0].node_key()
        );
    }

    out.push_str("}\n");
    out
}

fn dot_label(record: &ProcessRecord) -> String {
    let cmd = record.cmdline.as_deref().unwrap_or(&record.comm);
    let cmd: String = cmd.chars().take(120).collect();
    let uid = record
        .uid
        .map(|u| u.to_string())
        .unwrap_or_else(|| "?".to_string());
    format!("{}\\n{}\\nuid={}\\n{}", record.pid, record.comm, uid, cmd).replace('"', "'")
}
