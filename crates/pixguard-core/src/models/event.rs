use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ValidationOutcome;

/// Event type stamped on every result event.
pub const RESULT_EVENT_TYPE: &str = "image.validation.result";

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Success,
    Fail,
}

/// Transport headers of a result event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    /// Fresh per publish attempt; retries produce new ids
    pub event_id: String,
    pub event_type: String,
    pub trace_id: String,
    pub timestamp: String,
    pub source_service: String,
}

impl EventHeader {
    pub fn new(trace_id: &str, source_service: &str, now: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: RESULT_EVENT_TYPE.to_string(),
            trace_id: trace_id.to_string(),
            timestamp: format_timestamp(now),
            source_service: source_service.to_string(),
        }
    }

    /// Flatten into broker message headers.
    pub fn to_headers(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("event_id".to_string(), self.event_id.clone()),
            ("event_type".to_string(), self.event_type.clone()),
            ("trace_id".to_string(), self.trace_id.clone()),
            ("timestamp".to_string(), self.timestamp.clone()),
            ("source_service".to_string(), self.source_service.clone()),
        ])
    }
}

/// JSON body of a result event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBody {
    pub gid: String,
    pub status: EventStatus,
    pub completed_at: String,
    /// `null` for failure events
    pub validation_result: Option<ValidationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A correlated result event ready to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    pub header: EventHeader,
    pub body: EventBody,
}

impl OutboundEvent {
    pub fn success(
        gid: &str,
        trace_id: &str,
        source_service: &str,
        outcome: ValidationOutcome,
    ) -> Self {
        let now = Utc::now();
        Self {
            header: EventHeader::new(trace_id, source_service, now),
            body: EventBody {
                gid: gid.to_string(),
                status: EventStatus::Success,
                completed_at: format_timestamp(now),
                validation_result: Some(outcome),
                reason: None,
            },
        }
    }

    pub fn failure(gid: &str, trace_id: &str, source_service: &str, reason: String) -> Self {
        let now = Utc::now();
        Self {
            header: EventHeader::new(trace_id, source_service, now),
            body: EventBody {
                gid: gid.to_string(),
                status: EventStatus::Fail,
                completed_at: format_timestamp(now),
                validation_result: None,
                reason: Some(reason),
            },
        }
    }

    pub fn body_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.body)
    }
}
