// collectord/event_log.rs
// Append every schema-valid event to a JSONL stream, trigger or not.
// Incidents capture only decoy hits; this log keeps the full accepted feed.

use ghosttrail_core::RawEvent;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append one event as a compact JSON line. Opens in append mode so the
    /// stream survives daemon restarts.
    pub fn append(&self, raw: &RawEvent) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let line = serde_json::to_string(raw.as_value())?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}
