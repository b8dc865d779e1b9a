use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Recognized inbound event kinds.
///
/// `FileOpen` is the decoy-sensitive kind: it is the only kind that can
/// produce an Alert. `Exec` is accepted by the schema (sensors emit it on the
/// same stream) but never matches the trigger predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FileOpen,
    Exec,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FileOpen => "file_open",
            EventKind::Exec => "exec",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file_open" => Some(EventKind::FileOpen),
            "exec" => Some(EventKind::Exec),
            _ => None,
        }
    }

    /// True for the kind whose decoy interaction opens an incident.
    pub fn is_trigger(&self) -> bool {
        matches!(self, EventKind::FileOpen)
    }
}

/// An unvalidated inbound event, exactly as the sensor delivered it.
///
/// Held as a raw JSON object so that schema validation can name the offending
/// field instead of failing inside a typed deserializer. Discarded after
/// normalization; the full object is preserved on the Alert for evidence.
#[derive(Debug, Clone)]
pub struct RawEvent {
    value: serde_json::Value,
}

impl RawEvent {
    /// Parse one newline-delimited JSON event. The top level must be an
    /// object; anything else is already malformed.
    pub fn from_json_line(line: &str) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| format!("invalid json: {}", e))?;
        if !value.is_object() {
            return Err("top-level JSON must be an object".to_string());
        }
        Ok(Self { value })
    }

    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        if value.is_object() {
            Some(Self { value })
        } else {
            None
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.value.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.value.get(key).and_then(|v| v.as_u64())
    }

    /// The event exactly as delivered, for the append-only event log.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.value
    }

    /// The full attribute map, preserved on the Alert as evidence.
    pub fn attributes(&self) -> BTreeMap<String, serde_json::Value> {
        self.value
            .as_object()
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }
}

/// A normalized, schema-valid decoy-access event.
///
/// An Alert exists only for events that passed schema validation AND matched
/// the decoy-trigger predicate. Immutable once created; owned by the pipeline
/// call that created it until persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Deterministic id: sha256 over (kind, decoy path, pid, sensor ts).
    pub alert_id: String,
    pub kind: EventKind,
    /// The decoy path the event matched.
    pub decoy_path: String,
    /// Pid of the process that touched the decoy.
    pub pid: u32,
    /// Timestamp reported by the sensor.
    pub sensor_ts: DateTime<Utc>,
    /// Wall clock captured at normalization time.
    pub observed_ts: DateTime<Utc>,
    /// Raw event attributes, preserved verbatim for evidence.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Alert {
    pub fn new(
        kind: EventKind,
        decoy_path: String,
        pid: u32,
        sensor_ts: DateTime<Utc>,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let observed_ts = Utc::now();
        let alert_id = Self::compute_alert_id(kind, &decoy_path, pid, sensor_ts);
        Self {
            alert_id,
            kind,
            decoy_path,
            pid,
            sensor_ts,
            observed_ts,
            attributes,
        }
    }

    /// One-line operator summary, surfaced per accepted event.
    pub fn summary(&self) -> String {
        let tag = match self.kind {
            EventKind::FileOpen => "FILE",
            EventKind::Exec => "EXEC",
        };
        let comm = self
            .attributes
            .get("comm")
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        format!(
            "[{}] {} pid={} comm={} -> {}",
            self.sensor_ts.to_rfc3339(),
            tag,
            self.pid,
            comm,
            self.decoy_path
        )
    }

    /// AlertId = hash(kind + path + pid + sensor ts), truncated.
    pub fn compute_alert_id(
        kind: EventKind,
        decoy_path: &str,
        pid: u32,
        sensor_ts: DateTime<Utc>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(decoy_path.as_bytes());
        hasher.update(pid.to_le_bytes());
        hasher.update(sensor_ts.timestamp_millis().to_le_bytes());
        format!("alr_{}", hex::encode(&hasher.finalize()[..16]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_roundtrip() {
        assert_eq!(EventKind::parse("file_open"), Some(EventKind::FileOpen));
        assert_eq!(EventKind::parse("exec"), Some(EventKind::Exec));
        assert_eq!(EventKind::parse("fork"), None);
        assert!(EventKind::FileOpen.is_trigger());
        assert!(!EventKind::Exec.is_trigger());
    }

    #[test]
    fn test_raw_event_rejects_non_object() {
        assert!(RawEvent::from_json_line("[1,2,3]").is_err());
        assert!(RawEvent::from_json_line("not json").is_err());
        assert!(RawEvent::from_json_line("{\"pid\": 42}").is_ok());
    }

    #[test]
    fn test_summary_line() {
        let ts = DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut attributes = BTreeMap::new();
        attributes.insert("comm".to_string(), serde_json::json!("cat"));
        let alert = Alert::new(
            EventKind::FileOpen,
            "/tmp/decoy.txt".to_string(),
            4321,
            ts,
            attributes,
        );

        let line = alert.summary();
        assert!(line.contains("FILE"));
        assert!(line.contains("pid=4321"));
        assert!(line.contains("comm=cat"));
        assert!(line.ends_with("-> /tmp/decoy.txt"));
    }

    #[test]
    fn test_alert_id_determinism() {
        let ts = DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let a = Alert::compute_alert_id(EventKind::FileOpen, "/tmp/decoy", 50, ts);
        let b = Alert::compute_alert_id(EventKind::FileOpen, "/tmp/decoy", 50, ts);
        let c = Alert::compute_alert_id(EventKind::FileOpen, "/tmp/decoy", 51, ts);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("alr_"));
    }
}
