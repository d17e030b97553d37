use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A validation job parsed from an inbound queue message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundRequest {
    /// Globally correlates a validation job across services
    pub gid: Uuid,
    /// `gid` exactly as the producer sent it, minus surrounding whitespace.
    /// Echoed back in events and documents so string-matching consumers correlate.
    pub gid_text: String,
    /// Key of the uploaded object inside `bucket`
    pub object_key: String,
    pub bucket: String,
    /// Carried unchanged from the inbound `trace_id` header to the result event
    pub trace_id: String,
}
