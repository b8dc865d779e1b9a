//! Event Collector: validate inbound raw events and normalize the
//! decoy-relevant subset into Alerts.
//!
//! Validation is pure and deterministic; a malformed event is permanently
//! rejected. Order is fixed: schema first, trigger predicate second.

use crate::decoy::DecoyRegistry;
use crate::error::RejectReason;
use crate::event::{Alert, EventKind, RawEvent};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct Collector {
    registry: Arc<DecoyRegistry>,
}

impl Collector {
    pub fn new(registry: Arc<DecoyRegistry>) -> Self {
        Self { registry }
    }

    /// `normalize(RawEvent) -> Alert | rejected`.
    ///
    /// 1. Schema check: required fields present with correct primitive types,
    ///    event kind recognized. Failure names the offending field.
    /// 2. Decoy-trigger predicate: kind is the decoy-sensitive kind AND the
    ///    subject path matches the registry.
    pub fn normalize(&self, raw: &RawEvent) -> Result<Alert, RejectReason> {
        let (kind, path, pid, sensor_ts) = self.validate_schema(raw)?;

        if !self.is_decoy_trigger(kind, &path) {
            return Err(RejectReason::NotDecoyRelevant);
        }

        Ok(Alert::new(kind, path, pid, sensor_ts, raw.attributes()))
    }

    /// The hard filter: any interaction with a decoy is suspicious. A single
    /// predicate with no weighting, confidence, or thresholds.
    pub fn is_decoy_trigger(&self, kind: EventKind, path: &str) -> bool {
        kind.is_trigger() && self.registry.matches(path)
    }

    fn validate_schema(
        &self,
        raw: &RawEvent,
    ) -> Result<(EventKind, String, u32, DateTime<Utc>), RejectReason> {
        // Required fields, checked for presence before type so the message
        // distinguishes "missing" from "wrong type".
        for key in ["ts", "event_type", "pid", "path"] {
            if raw.get(key).is_none() {
                return Err(RejectReason::schema(format!(
                    "missing required field: {}",
                    key
                )));
            }
        }

        let ts_str = raw
            .get_str("ts")
            .ok_or_else(|| RejectReason::schema("invalid ts: must be a string"))?;
        let sensor_ts = DateTime::parse_from_rfc3339(ts_str)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| RejectReason::schema("invalid ts: must be RFC 3339"))?;

        let kind_str = raw
            .get_str("event_type")
            .ok_or_else(|| RejectReason::schema("invalid event_type: must be a string"))?;
        let kind = EventKind::parse(kind_str).ok_or_else(|| {
            RejectReason::schema(format!("invalid event_type: unrecognized kind '{}'", kind_str))
        })?;

        let pid = raw
            .get_u64("pid")
            .ok_or_else(|| RejectReason::schema("invalid pid: must be a non-negative integer"))?;
        let pid = u32::try_from(pid)
            .map_err(|_| RejectReason::schema("invalid pid: out of range"))?;

        let path = raw
            .get_str("path")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| RejectReason::schema("invalid path: must be a non-empty string"))?
            .to_string();

        // Optional fields are validated only when present.
        for key in ["comm", "exe"] {
            if let Some(v) = raw.get(key) {
                if !v.is_string() {
                    return Err(RejectReason::schema(format!(
                        "invalid {}: must be a string if present",
                        key
                    )));
                }
            }
        }
        if let Some(v) = raw.get("uid") {
            if !v.is_u64() {
                return Err(RejectReason::schema(
                    "invalid uid: must be a non-negative integer if present",
                ));
            }
        }

        Ok((kind, path, pid, sensor_ts))
    }
}
