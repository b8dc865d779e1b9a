//! Daemon configuration with env var support.
//!
//! Parsed once at startup into an immutable value; the decoy registry built
//! from it is shared by reference and never mutated for the run.
//! Format: GHOSTTRAIL_<SETTING>=value.

use ghosttrail_core::DecoyRegistry;
use serde::Deserialize;
use std::path::PathBuf;

use crate::lineage::DEFAULT_MAX_DEPTH;

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for incident directories.
    pub incidents_dir: PathBuf,
    /// Exact decoy paths.
    pub decoy_paths: Vec<String>,
    /// Decoy directory prefixes (matched on component boundaries).
    pub decoy_prefixes: Vec<String>,
    /// Append-only JSONL log of every schema-valid event. `None` disables it.
    pub outfile: Option<PathBuf>,
    /// Maximum ancestry traversal depth.
    pub max_depth: usize,
    /// Concurrent pipeline workers.
    pub workers: usize,
    /// Event channel capacity.
    pub channel_capacity: usize,
}

/// On-disk decoy registry file (GHOSTTRAIL_DECOY_FILE).
#[derive(Debug, Deserialize)]
struct DecoyFile {
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    prefixes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            incidents_dir: default_incidents_dir(),
            decoy_paths: Vec::new(),
            decoy_prefixes: Vec::new(),
            outfile: Some(PathBuf::from("alerts.jsonl")),
            max_depth: DEFAULT_MAX_DEPTH,
            workers: DEFAULT_WORKERS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

fn default_incidents_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join("ghosttrail").join("incidents"),
        None => PathBuf::from("ghosttrail-incidents"),
    }
}

impl Config {
    /// Load from environment, falling back to defaults.
    ///
    /// GHOSTTRAIL_DECOYS is a ':'-separated path list; entries ending in '/'
    /// are registered as prefixes. GHOSTTRAIL_DECOY_FILE points at a JSON
    /// file with explicit `paths` and `prefixes` arrays; both sources are
    /// additive.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("GHOSTTRAIL_INCIDENTS_DIR") {
            if !dir.trim().is_empty() {
                config.incidents_dir = PathBuf::from(dir);
            }
        }

        if let Ok(list) = std::env::var("GHOSTTRAIL_DECOYS") {
            for entry in list.split(':').filter(|s| !s.trim().is_empty()) {
                if let Some(prefix) = entry.strip_suffix('/') {
                    config.decoy_prefixes.push(prefix.to_string());
                } else {
                    config.decoy_paths.push(entry.to_string());
                }
            }
        }

        if let Ok(path) = std::env::var("GHOSTTRAIL_DECOY_FILE") {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| format!("failed to read decoy file {}: {}", path, e))?;
            let file: DecoyFile = serde_json::from_str(&raw)
                .map_err(|e| format!("invalid decoy file {}: {}", path, e))?;
            config.decoy_paths.extend(file.paths);
            config.decoy_prefixes.extend(file.prefixes);
        }

        // Empty GHOSTTRAIL_OUTFILE turns the event log off.
        if let Ok(outfile) = std::env::var("GHOSTTRAIL_OUTFILE") {
            config.outfile = if outfile.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(outfile))
            };
        }

        if let Ok(depth) = std::env::var("GHOSTTRAIL_MAX_DEPTH") {
            config.max_depth = depth
                .parse()
                .map_err(|_| format!("invalid GHOSTTRAIL_MAX_DEPTH: {}", depth))?;
        }
        if let Ok(workers) = std::env::var("GHOSTTRAIL_WORKERS") {
            config.workers = workers
                .parse()
                .map_err(|_| format!("invalid GHOSTTRAIL_WORKERS: {}", workers))?;
        }
        if let Ok(capacity) = std::env::var("GHOSTTRAIL_CHANNEL_CAPACITY") {
            config.channel_capacity = capacity
                .parse()
                .map_err(|_| format!("invalid GHOSTTRAIL_CHANNEL_CAPACITY: {}", capacity))?;
        }

        Ok(config)
    }

    pub fn registry(&self) -> DecoyRegistry {
        DecoyRegistry::with_entries(self.decoy_paths.iter(), self.decoy_prefixes.iter())
    }
}
