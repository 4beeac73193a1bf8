/// Message envelopes for governance change events
///
/// A raw stream record carries its sequence number and body; once decoded it
/// becomes a `StreamMessage` with routing headers and a payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use chrono::{DateTime, Utc};

/// One record as fetched from the stream, before decoding
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Stream sequence number (the offset)
    pub sequence: u64,

    /// Record body, possibly base64 encoded
    pub payload: Vec<u8>,

    /// Time the record was fetched
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(sequence: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            sequence,
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}

/// Routing headers carried by every change event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeaders {
    /// Entity type wire name (`CLOUD_GROUP`, ...)
    #[serde(default)]
    pub message_type: Option<String>,

    /// `CREATE`, `UPDATE` or `DELETE`
    #[serde(default)]
    pub operation: Option<String>,

    /// ISO-8601 event time
    #[serde(default)]
    pub event_time: Option<String>,

    #[serde(default)]
    pub tenancy_id: Option<String>,

    #[serde(default)]
    pub service_instance_id: Option<String>,
}

/// Decoded change event: headers plus one payload or a list of payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    pub headers: MessageHeaders,

    #[serde(default)]
    pub data: Value,
}

impl StreamMessage {
    pub fn new(headers: MessageHeaders, data: Value) -> Self {
        Self { headers, data }
    }

    /// Payloads carried by this message, flattening list data
    pub fn payloads(&self) -> Vec<&Value> {
        match &self.data {
            Value::Array(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }
}

/// Response returned by the function host after an invocation
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct InvocationResponse {
    pub message: String,
}

impl InvocationResponse {
    pub fn success() -> Self {
        Self {
            message: "Data has been transformed and loaded into the data store successfully!"
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headers_deserialize() {
        let message: StreamMessage = serde_json::from_value(json!({
            "headers": {
                "messageType": "ROLE",
                "operation": "CREATE",
                "eventTime": "2024-05-01T10:00:00Z",
                "tenancyId": "ten-1",
                "serviceInstanceId": "svc-1"
            },
            "data": [{"id": "r1"}, {"id": "r2"}]
        }))
        .unwrap();

        assert_eq!(message.headers.message_type.as_deref(), Some("ROLE"));
        assert_eq!(message.headers.service_instance_id.as_deref(), Some("svc-1"));
        assert_eq!(message.payloads().len(), 2);
    }

    #[test]
    fn test_single_payload() {
        let message = StreamMessage::new(MessageHeaders::default(), json!({"id": "x"}));
        assert_eq!(message.payloads(), vec![&json!({"id": "x"})]);
    }
}
