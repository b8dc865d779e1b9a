//! Process Table Reader: point-in-time snapshots of one process's identity
//! facts from the live OS process registry.
//!
//! Every read is best-effort and carries its own status. Disappearance is a
//! valid terminal state, not a fault to recover from; a vanished pid is never
//! re-read. `/proc` offers no atomic multi-field read, so the stat line is
//! read twice around the auxiliary files and the record is discarded as
//! unreliable if the start time changed in between.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::PathBuf;

/// Outcome tag for one snapshot read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcStatus {
    /// All identity fields reflect one coherent observation.
    Observed,
    /// Pid absent, or the observation could not be made coherent.
    Vanished,
    /// Insufficient privilege for some fields; record is partial.
    Denied,
}

/// One process's identity facts at observation time. Read-only snapshot,
/// valid only for the instant it was read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    pub comm: String,
    /// Start time in clock ticks since boot (`/proc/<pid>/stat` field 22).
    /// A later process with the same pid but a different start time is a
    /// different logical process.
    pub start_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmdline: Option<String>,
    pub status: ProcStatus,
}

impl ProcessRecord {
    /// Terminal marker for a pid that could not be observed.
    pub fn vanished(pid: u32) -> Self {
        Self {
            pid,
            ppid: 0,
            comm: String::new(),
            start_time: 0,
            uid: None,
            exe: None,
            cmdline: None,
            status: ProcStatus::Vanished,
        }
    }

    /// Partial record for a pid whose fields were unreadable for privilege
    /// reasons.
    pub fn denied(pid: u32) -> Self {
        Self {
            pid,
            ppid: 0,
            comm: String::new(),
            start_time: 0,
            uid: None,
            exe: None,
            cmdline: None,
            status: ProcStatus::Denied,
        }
    }

    pub fn is_observed(&self) -> bool {
        self.status == ProcStatus::Observed
    }

    /// Graph node identity: pid alone is reusable, pid+start_time is not.
    pub fn node_key(&self) -> String {
        format!("{}:{}", self.pid, self.start_time)
    }
}

/// The seam between the lineage builder and the OS. Synthetic tables stand in
/// for `/proc` in tests.
pub trait ProcessTable: Send + Sync {
    /// Snapshot one pid. Never blocks waiting for the process to appear.
    fn read(&self, pid: u32) -> ProcessRecord;
}

// ============================================================================
// Procfs implementation
// ============================================================================

/// Fields parsed from one read of `/proc/<pid>/stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StatLine {
    ppid: u32,
    comm: String,
    start_time: u64,
}

/// Linux `/proc` process table. The root is configurable so tests can point
/// it at a fabricated tree.
pub struct ProcfsTable {
    root: PathBuf,
}

impl ProcfsTable {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pid_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    /// Parse "pid (comm) state ppid ... starttime ...". comm may contain
    /// spaces and parentheses, so split on the LAST ')'.
    fn parse_stat(raw: &str) -> Option<StatLine> {
        let open = raw.find('(')?;
        let close = raw.rfind(')')?;
        if close <= open {
            return None;
        }
        let comm = raw[open + 1..close].to_string();
        let rest = raw.get(close + 2..)?;
        let fields: Vec<&str> = rest.split_whitespace().collect();
        // After ") ": fields[0]=state, [1]=ppid, ... [19]=starttime (stat field 22).
        let ppid = fields.get(1)?.parse().ok()?;
        let start_time = fields.get(19)?.parse().ok()?;
        Some(StatLine {
            ppid,
            comm,
            start_time,
        })
    }

    fn read_stat(&self, pid: u32) -> std::io::Result<Option<StatLine>> {
        match std::fs::read_to_string(self.pid_dir(pid).join("stat")) {
            Ok(raw) => Ok(Self::parse_stat(&raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_cmdline(&self, pid: u32) -> std::io::Result<Option<String>> {
        let raw = std::fs::read(self.pid_dir(pid).join("cmdline"))?;
        if raw.is_empty() {
            return Ok(None);
        }
        let joined = raw
            .split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(if joined.is_empty() { None } else { Some(joined) })
    }

    fn read_uid(&self, pid: u32) -> std::io::Result<Option<u32>> {
        let status = std::fs::read_to_string(self.pid_dir(pid).join("status"))?;
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("Uid:") {
                // Uid: real effective saved fs
                return Ok(rest.split_whitespace().next().and_then(|s| s.parse().ok()));
            }
        }
        Ok(None)
    }

    fn read_exe(&self, pid: u32) -> std::io::Result<Option<String>> {
        match std::fs::read_link(self.pid_dir(pid).join("exe")) {
            Ok(target) => Ok(Some(target.to_string_lossy().into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Auxiliary fields read between the two stat observations. `denied` is set
/// when any of them failed for privilege reasons; the record is then partial.
#[derive(Debug, Default)]
struct AuxFields {
    uid: Option<u32>,
    exe: Option<String>,
    cmdline: Option<String>,
    denied: bool,
}

impl ProcfsTable {
    fn read_aux_fields(&self, pid: u32) -> AuxFields {
        let mut aux = AuxFields::default();
        let take = |result: std::io::Result<Option<String>>, denied: &mut bool| match result {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                *denied = true;
                None
            }
            Err(_) => None,
        };
        aux.cmdline = take(self.read_cmdline(pid), &mut aux.denied);
        aux.exe = take(self.read_exe(pid), &mut aux.denied);
        aux.uid = match self.read_uid(pid) {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                aux.denied = true;
                None
            }
            Err(_) => None,
        };
        aux
    }

    /// Combine the anchoring stat read, the auxiliary fields, and the
    /// verification stat read into one record. If the start time moved
    /// between the two stat reads the pid was recycled mid-observation and
    /// the combined fields are not one coherent snapshot: classify as
    /// vanished rather than report a chimera.
    fn assemble(
        pid: u32,
        first: StatLine,
        aux: AuxFields,
        second: Option<StatLine>,
    ) -> ProcessRecord {
        match second {
            Some(ref s) if s.start_time == first.start_time => {}
            _ => return ProcessRecord::vanished(pid),
        }

        ProcessRecord {
            pid,
            ppid: first.ppid,
            comm: first.comm,
            start_time: first.start_time,
            uid: aux.uid,
            exe: aux.exe,
            cmdline: aux.cmdline,
            status: if aux.denied {
                ProcStatus::Denied
            } else {
                ProcStatus::Observed
            },
        }
    }
}

impl Default for ProcfsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for ProcfsTable {
    fn read(&self, pid: u32) -> ProcessRecord {
        // First stat read anchors the observation.
        let first = match self.read_stat(pid) {
            Ok(Some(stat)) => stat,
            Ok(None) => return ProcessRecord::vanished(pid),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return ProcessRecord::denied(pid)
            }
            Err(_) => return ProcessRecord::vanished(pid),
        };

        // Auxiliary fields. A privilege failure downgrades the record to
        // Denied but keeps whatever was readable; the process itself is
        // still there.
        let aux = self.read_aux_fields(pid);

        // Verification read.
        let second = self.read_stat(pid).ok().flatten();
        Self::assemble(pid, first, aux, second)
    }
}

// ============================================================================
// Synthetic table for tests and harnesses
// ============================================================================

/// In-memory process table with scriptable failure modes.
#[derive(Debug, Default)]
pub struct SyntheticTable {
    records: BTreeMap<u32, ProcessRecord>,
    denied: BTreeSet<u32>,
}

impl SyntheticTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pid: u32, ppid: u32, comm: &str, start_time: u64) -> &mut Self {
        self.records.insert(
            pid,
            ProcessRecord {
                pid,
                ppid,
                comm: comm.to_string(),
                start_time,
                uid: Some(1000),
                exe: Some(format!("/usr/bin/{}", comm)),
                cmdline: Some(comm.to_string()),
                status: ProcStatus::Observed,
            },
        );
        self
    }

    /// Make reads of this pid fail with a privilege error.
    pub fn deny(&mut self, pid: u32) -> &mut Self {
        self.denied.insert(pid);
        self
    }

    pub fn remove(&mut self, pid: u32) -> &mut Self {
        self.records.remove(&pid);
        self
    }
}

impl ProcessTable for SyntheticTable {
    fn read(&self, pid: u32) -> ProcessRecord {
        if self.denied.contains(&pid) {
            return ProcessRecord::denied(pid);
        }
        match self.records.get(&pid) {
            Some(rec) => rec.clone(),
            None => ProcessRecord::vanished(pid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stat_plain() {
        let stat = "50 (bash) S 10 50 50 34816 50 4194304 1000 0 0 0 5 3 0 0 20 0 1 0 123456 8192000 500 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0";
        let parsed = ProcfsTable::parse_stat(stat).unwrap();
        assert_eq!(parsed.comm, "bash");
        assert_eq!(parsed.ppid, 10);
        assert_eq!(parsed.start_time, 123456);
    }

    #[test]
    fn test_parse_stat_comm_with_spaces_and_parens() {
        let stat = "99 (tmux: server (1)) S 1 99 99 0 -1 4194368 100 0 0 0 1 1 0 0 20 0 1 0 777 1000 10 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0";
        let parsed = ProcfsTable::parse_stat(stat).unwrap();
        assert_eq!(parsed.comm, "tmux: server (1)");
        assert_eq!(parsed.ppid, 1);
        assert_eq!(parsed.start_time, 777);
    }

    #[test]
    fn test_parse_stat_garbage() {
        assert!(ProcfsTable::parse_stat("").is_none());
        assert!(ProcfsTable::parse_stat("50 bash S 10").is_none());
        assert!(ProcfsTable::parse_stat("50 (bash) S").is_none());
    }

    #[test]
    fn test_procfs_missing_pid_is_vanished() {
        let dir = tempfile::TempDir::new().unwrap();
        let table = ProcfsTable::with_root(dir.path());
        let rec = table.read(12345);
        assert_eq!(rec.status, ProcStatus::Vanished);
        assert_eq!(rec.pid, 12345);
    }

    #[test]
    fn test_procfs_reads_fabricated_tree() {
        let dir = tempfile::TempDir::new().unwrap();
        let pid_dir = dir.path().join("42");
        std::fs::create_dir_all(&pid_dir).unwrap();
        std::fs::write(
            pid_dir.join("stat"),
            "42 (cat) R 40 42 42 0 -1 4194304 90 0 0 0 0 0 0 0 20 0 1 0 5555 1000 10 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0",
        )
        .unwrap();
        std::fs::write(pid_dir.join("cmdline"), b"cat\0/tmp/decoy.txt\0").unwrap();
        std::fs::write(pid_dir.join("status"), "Name:\tcat\nUid:\t1000\t1000\t1000\t1000\n").unwrap();

        let table = ProcfsTable::with_root(dir.path());
        let rec = table.read(42);
        assert_eq!(rec.status, ProcStatus::Observed);
        assert_eq!(rec.ppid, 40);
        assert_eq!(rec.comm, "cat");
        assert_eq!(rec.start_time, 5555);
        assert_eq!(rec.uid, Some(1000));
        assert_eq!(rec.cmdline.as_deref(), Some("cat /tmp/decoy.txt"));
    }

    fn stat(ppid: u32, comm: &str, start_time: u64) -> StatLine {
        StatLine {
            ppid,
            comm: comm.to_string(),
            start_time,
        }
    }

    #[test]
    fn test_assemble_coherent_snapshot() {
        let aux = AuxFields {
            uid: Some(1000),
            exe: Some("/usr/bin/cat".to_string()),
            cmdline: Some("cat /tmp/decoy.txt".to_string()),
            denied: false,
        };
        let rec = ProcfsTable::assemble(42, stat(40, "cat", 5555), aux, Some(stat(40, "cat", 5555)));
        assert_eq!(rec.status, ProcStatus::Observed);
        assert_eq!(rec.ppid, 40);
        assert_eq!(rec.start_time, 5555);
        assert_eq!(rec.uid, Some(1000));
    }

    #[test]
    fn test_assemble_moved_start_time_is_vanished() {
        // Pid recycled between the two stat reads: same pid, new start time.
        // The auxiliary fields may belong to either process, so the record
        // must not be reported as observed.
        let aux = AuxFields {
            uid: Some(1000),
            exe: None,
            cmdline: Some("cat /tmp/decoy.txt".to_string()),
            denied: false,
        };
        let rec = ProcfsTable::assemble(42, stat(40, "cat", 5555), aux, Some(stat(1, "nc", 9999)));
        assert_eq!(rec.status, ProcStatus::Vanished);
        assert!(rec.cmdline.is_none());
    }

    #[test]
    fn test_assemble_missing_verification_read_is_vanished() {
        let rec = ProcfsTable::assemble(42, stat(40, "cat", 5555), AuxFields::default(), None);
        assert_eq!(rec.status, ProcStatus::Vanished);
    }

    #[test]
    fn test_assemble_denied_aux_is_partial() {
        let aux = AuxFields {
            uid: None,
            exe: None,
            cmdline: None,
            denied: true,
        };
        let rec = ProcfsTable::assemble(42, stat(40, "cat", 5555), aux, Some(stat(40, "cat", 5555)));
        assert_eq!(rec.status, ProcStatus::Denied);
        assert_eq!(rec.ppid, 40);
    }

    #[test]
    fn test_synthetic_table_failure_modes() {
        let mut table = SyntheticTable::new();
        table.insert(50, 10, "bash", 100).deny(10);

        assert!(table.read(50).is_observed());
        assert_eq!(table.read(10).status, ProcStatus::Denied);
        assert_eq!(table.read(999).status, ProcStatus::Vanished);
    }

    #[test]
    fn test_node_key_distinguishes_pid_reuse() {
        let mut table = SyntheticTable::new();
        table.insert(50, 1, "old", 100);
        let old_key = table.read(50).node_key();
        table.insert(50, 1, "new", 200);
        let new_key = table.read(50).node_key();
        assert_ne!(old_key, new_key);
    }
}
