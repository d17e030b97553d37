//! Inbound message decoding.
//!
//! Body: `{"gid": "<uuid>", "objectKey" | "object_key" | "file_name": "...", "bucket": "..."}`.
//! Producers may send several of the key names at once; the first non-empty
//! one in that order wins.
//! The `trace_id` header is carried through to the result event; when it is
//! absent a fresh one is generated so the message can still be correlated
//! from here on.

use std::collections::BTreeMap;

use pixguard_core::models::InboundRequest;
use serde::Deserialize;
use uuid::Uuid;

pub const TRACE_ID_HEADER: &str = "trace_id";

/// Why a message body could not be turned into a request. Always permanent.
#[derive(Debug, thiserror::Error)]
pub enum ParseFailure {
    #[error("Malformed message body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Missing required field {0:?}")]
    MissingField(&'static str),

    #[error("gid {value:?} is not a valid UUID: {source}")]
    InvalidGid {
        value: String,
        #[source]
        source: uuid::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    gid: Option<String>,
    #[serde(rename = "objectKey")]
    object_key_camel: Option<String>,
    object_key: Option<String>,
    file_name: Option<String>,
    bucket: Option<String>,
}

impl RawRequest {
    fn key(&mut self) -> Option<String> {
        [
            self.object_key_camel.take(),
            self.object_key.take(),
            self.file_name.take(),
        ]
        .into_iter()
        .flatten()
        .find(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MessageCodec;

impl MessageCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(
        &self,
        body: &[u8],
        headers: &BTreeMap<String, String>,
    ) -> Result<InboundRequest, ParseFailure> {
        let mut raw: RawRequest = serde_json::from_slice(body)?;

        let gid_text = required(raw.gid.take(), "gid")?.trim().to_string();
        let object_key = required(raw.key(), "objectKey")?;
        let bucket = required(raw.bucket, "bucket")?;

        let gid = Uuid::parse_str(&gid_text).map_err(|source| ParseFailure::InvalidGid {
            value: gid_text.clone(),
            source,
        })?;

        let trace_id = match headers.get(TRACE_ID_HEADER).filter(|t| !t.trim().is_empty()) {
            Some(trace_id) => trace_id.clone(),
            None => {
                let generated = Uuid::new_v4().to_string();
                tracing::debug!(trace_id = %generated, "No trace_id header, generated one");
                generated
            }
        };

        Ok(InboundRequest {
            gid,
            gid_text,
            object_key,
            bucket,
            trace_id,
        })
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ParseFailure> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ParseFailure::MissingField(name))
}
