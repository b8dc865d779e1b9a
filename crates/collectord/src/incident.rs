//! Incident Engine: atomically materialize one directory per incident.
//!
//! The incident directory is a single logical resource. All artifacts are
//! written under a staging name that is never visible at the final path, then
//! published with one rename. An external observer sees either nothing or the
//! complete set; a crash mid-write leaves only droppings under `.staging/`,
//! which are swept at startup.
//!
//! Layout per incident:
//!   <name>/incident.json  — the normalized Alert
//!   <name>/lineage.txt    — ancestry chain, plain text
//!   <name>/lineage.dot    — ancestry chain, Graphviz digraph

use crate::lineage::{render_dot, render_text, LineageChain};
use chrono::{DateTime, Utc};
use ghosttrail_core::error::CommitError;
use ghosttrail_core::event::Alert;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const STAGING_DIR: &str = ".staging";
const MAX_NAME_ATTEMPTS: u32 = 16;

/// Handle to a committed incident.
#[derive(Debug, Clone)]
pub struct IncidentHandle {
    /// Directory name; doubles as the incident id. Lexicographically
    /// time-ordered.
    pub incident_id: String,
    pub dir: PathBuf,
}

pub struct IncidentEngine {
    base_dir: PathBuf,
    staging_dir: PathBuf,
    /// Disambiguating suffix allocator. The only serialized point in the
    /// pipeline; guarantees unique names under concurrent commits even when
    /// timestamps collide.
    seq: AtomicU64,
}

impl IncidentEngine {
    pub fn new(base_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_dir = base_dir.into();
        let staging_dir = base_dir.join(STAGING_DIR);
        fs::create_dir_all(&staging_dir)?;

        let engine = Self {
            base_dir,
            staging_dir,
            seq: AtomicU64::new(0),
        };
        engine.sweep_stale_staging();
        Ok(engine)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Remove leftovers from commits interrupted before publish. They were
    /// never visible at a final path, so deleting them is safe.
    fn sweep_stale_staging(&self) {
        let entries = match fs::read_dir(&self.staging_dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            tracing::warn!(path = %path.display(), "sweeping stale staging entry");
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            if let Err(e) = result {
                tracing::warn!(path = %path.display(), error = %e, "failed to sweep staging entry");
            }
        }
    }

    /// Candidate directory name: UTC timestamp plus a zero-padded monotonic
    /// counter. Two Alerts in the same millisecond still get distinct names.
    fn allocate_name(&self, ts: DateTime<Utc>) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:06}", ts.format("%Y%m%dT%H%M%S%.3fZ"), seq)
    }

    /// `commit(Alert, LineageChain) -> IncidentHandle`.
    ///
    /// Collisions at the final path are retried with a fresh suffix, never
    /// overwritten. Any failure before publish discards the staging
    /// directory and returns the error for reporting; the pipeline never
    /// retries a failed commit.
    pub fn commit(
        &self,
        alert: &Alert,
        chain: &LineageChain,
    ) -> Result<IncidentHandle, CommitError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = self.allocate_name(alert.observed_ts);
            let final_path = self.base_dir.join(&name);
            if final_path.exists() {
                continue;
            }

            // Staging path carries the pid so concurrent daemons sharing a
            // base directory cannot collide in staging either.
            let staging_path = self
                .staging_dir
                .join(format!("{}.{}", name, std::process::id()));

            if let Err(e) = self.write_artifacts(&staging_path, alert, chain) {
                let _ = fs::remove_dir_all(&staging_path);
                return Err(CommitError::Staging(e));
            }

            // The single atomic publish step.
            match fs::rename(&staging_path, &final_path) {
                Ok(()) => {
                    tracing::info!(
                        incident = %name,
                        alert_id = %alert.alert_id,
                        pid = alert.pid,
                        "incident committed"
                    );
                    return Ok(IncidentHandle {
                        incident_id: name,
                        dir: final_path,
                    });
                }
                Err(e) => {
                    let _ = fs::remove_dir_all(&staging_path);
                    if final_path.exists() {
                        // Lost the race for this name; try a fresh suffix.
                        continue;
                    }
                    return Err(CommitError::Publish(e));
                }
            }
        }

        Err(CommitError::DirectoryCollision {
            base: self.base_dir.display().to_string(),
            attempts: MAX_NAME_ATTEMPTS,
        })
    }

    fn write_artifacts(
        &self,
        staging_path: &Path,
        alert: &Alert,
        chain: &LineageChain,
    ) -> std::io::Result<()> {
        fs::create_dir_all(staging_path)?;

        let alert_json = serde_json::to_vec_pretty(alert)?;
        fs::write(staging_path.join("incident.json"), alert_json)?;
        fs::write(staging_path.join("lineage.txt"), render_text(chain))?;
        fs::write(staging_path.join("lineage.dot"), render_dot(chain))?;
        Ok(())
    }
}
