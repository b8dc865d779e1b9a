//! Reject and commit error taxonomy.
//!
//! Walk-level outcomes (vanished/denied/cycle/depth) are not errors: they are
//! recorded inside the affected incident's own artifacts and never abort the
//! pipeline. Only the codes here are surfaced to the external reporting sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an inbound event did not become an Alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// Malformed inbound event. Permanently rejected, never retried.
    SchemaInvalid { message: String },
    /// Valid event that does not match the trigger predicate. Intentionally
    /// dropped; this is the system's sole noise-reduction mechanism.
    NotDecoyRelevant,
}

impl RejectReason {
    pub fn schema(message: impl Into<String>) -> Self {
        RejectReason::SchemaInvalid {
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::SchemaInvalid { .. } => "schema_invalid",
            RejectReason::NotDecoyRelevant => "not_decoy_relevant",
        }
    }

    /// Non-matching events are an expected no-op, not a reportable failure.
    pub fn is_reportable(&self) -> bool {
        matches!(self, RejectReason::SchemaInvalid { .. })
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::SchemaInvalid { message } => write!(f, "schema invalid: {}", message),
            RejectReason::NotDecoyRelevant => write!(f, "not decoy relevant"),
        }
    }
}

/// Why an incident could not be materialized. Fatal for that incident,
/// reported, never retried automatically: retrying an ancestry walk late may
/// capture a now-misleading lineage.
#[derive(Debug, Error)]
pub enum CommitError {
    /// Every allocated candidate name already existed. Collisions are retried
    /// internally with fresh disambiguators before this is returned.
    #[error("incident directory collision persisted after {attempts} attempts under {base}")]
    DirectoryCollision { base: String, attempts: u32 },

    /// Writing artifacts into the staging location failed. Nothing was
    /// published.
    #[error("failed to stage incident artifacts: {0}")]
    Staging(#[source] std::io::Error),

    /// The atomic rename to the final path failed. Nothing was published.
    #[error("failed to publish incident directory: {0}")]
    Publish(#[source] std::io::Error),
}

impl CommitError {
    pub fn code(&self) -> &'static str {
        match self {
            CommitError::DirectoryCollision { .. } => "directory_collision",
            CommitError::Staging(_) => "commit_failed",
            CommitError::Publish(_) => "commit_failed",
        }
    }
}

/// A single entry for the failure-reporting sink: a rejected event or a
/// failed commit, with its reason code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub ts: DateTime<Utc>,
    /// Reason code from the taxonomy (`schema_invalid`, `commit_failed`, ...).
    pub code: String,
    pub detail: String,
    /// Alert id when the failure happened after normalization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
}

impl FailureReport {
    pub fn rejected(reason: &RejectReason) -> Self {
        Self {
            ts: Utc::now(),
            code: reason.code().to_string(),
            detail: reason.to_string(),
            alert_id: None,
        }
    }

    pub fn commit_failed(alert_id: &str, error: &CommitError) -> Self {
        Self {
            ts: Utc::now(),
            code: error.code().to_string(),
            detail: error.to_string(),
            alert_id: Some(alert_id.to_string()),
        }
    }
}
