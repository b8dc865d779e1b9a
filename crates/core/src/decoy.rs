//! Decoy registry: the set of planted paths whose access is always hostile.
//!
//! Immutable for the run. Built once at startup from configuration and shared
//! by reference across workers; matching is pure, so no synchronization is
//! needed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct DecoyRegistry {
    paths: BTreeSet<PathBuf>,
    prefixes: Vec<PathBuf>,
}

impl DecoyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from exact paths and directory prefixes.
    pub fn with_entries<P, Q>(paths: P, prefixes: Q) -> Self
    where
        P: IntoIterator,
        P::Item: Into<PathBuf>,
        Q: IntoIterator,
        Q::Item: Into<PathBuf>,
    {
        let mut reg = Self::new();
        for p in paths {
            reg.add_path(p);
        }
        for p in prefixes {
            reg.add_prefix(p);
        }
        reg
    }

    pub fn add_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(path.into());
    }

    pub fn add_prefix(&mut self, prefix: impl Into<PathBuf>) {
        self.prefixes.push(prefix.into());
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.prefixes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len() + self.prefixes.len()
    }

    /// The trigger-path predicate: exact match against a registered decoy, or
    /// component-boundary prefix match against a registered decoy directory.
    ///
    /// Component-boundary means `/srv/decoys` matches `/srv/decoys/payroll.xlsx`
    /// but not `/srv/decoys-old/file` — `Path::starts_with` semantics, not raw
    /// string prefixes.
    pub fn matches(&self, path: &str) -> bool {
        let candidate = Path::new(path);
        if self.paths.contains(candidate) {
            return true;
        }
        self.prefixes.iter().any(|p| candidate.starts_with(p))
    }
}
