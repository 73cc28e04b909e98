//! Event envelope published to the broker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Envelope version stamped onto every published event.
pub const ENVELOPE_VERSION: &str = "1.0";

/// Wire format for events crossing the broker.
///
/// The id is `source-{unix_ms}-{random}` so a single event can be traced
/// across consuming services. Consumers receive at-least-once and must
/// deduplicate on this id if duplicates matter to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub version: String,
}

impl EventEnvelope {
    /// Wraps a payload for publishing.
    pub fn new(event_type: impl Into<String>, data: Value, source: &str) -> Self {
        let timestamp = Utc::now();
        Self {
            id: generate_event_id(source, timestamp),
            event_type: event_type.into(),
            data,
            timestamp,
            source: source.to_string(),
            version: ENVELOPE_VERSION.to_string(),
        }
    }
}

/// Generates a traceable event id: `source-{unix_ms}-{random}`.
fn generate_event_id(source: &str, timestamp: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", source, timestamp.timestamp_millis(), &random[..8])
}
