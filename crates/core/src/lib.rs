//! GhostTrail core: shared data model and event normalization.
//!
//! The core crate holds everything both the daemon and external tooling need
//! to agree on: the inbound event shape, the normalized Alert record, the
//! decoy registry, the reject/commit error taxonomy, and the Collector that
//! turns raw sensor output into Alerts.
//!
//! Anything platform-specific (process table reads, lineage walks, incident
//! directories) lives in the collectord crate.

pub mod collector;
pub mod decoy;
pub mod error;
pub mod event;

pub use collector::Collector;
pub use decoy::DecoyRegistry;
pub use error::{CommitError, FailureReport, RejectReason};
pub use event::{Alert, EventKind, RawEvent};
