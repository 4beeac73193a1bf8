//! Stream record decoding and grouping.
//!
//! Record values arrive base64 encoded once (direct stream reads) or twice
//! (connector-hub deliveries). Decoding peels base64 layers until JSON
//! appears, then parses `data` again when it is JSON text.

use base64::Engine;
use indexmap::IndexMap;
use serde_json::Value;

use crate::nats::message_envelope::{MessageHeaders, RawMessage, StreamMessage};

use super::AdapterError;

/// Base64 layers peeled at most before giving up
const MAX_BASE64_LAYERS: usize = 2;

/// Messages keyed by entity type, then operation, in arrival order
pub type GroupedMessages = IndexMap<String, IndexMap<String, Vec<StreamMessage>>>;

fn looks_like_json(bytes: &[u8]) -> bool {
    matches!(
        bytes.iter().find(|b| !b.is_ascii_whitespace()),
        Some(b'{') | Some(b'[')
    )
}

/// Decode a record value into JSON, peeling up to two base64 layers
pub fn decode_value(bytes: &[u8]) -> Result<Value, AdapterError> {
    let mut current = bytes.to_vec();
    for _ in 0..MAX_BASE64_LAYERS {
        if looks_like_json(&current) {
            break;
        }
        let text = String::from_utf8(current)?;
        current = base64::engine::general_purpose::STANDARD.decode(text.trim())?;
    }
    if !looks_like_json(&current) {
        return Err(AdapterError::Format(
            "record value is neither JSON nor base64-encoded JSON".to_string(),
        ));
    }

    let mut value: Value = serde_json::from_slice(&current)?;
    if let Some(Value::String(text)) = value.get("data") {
        let data: Value = serde_json::from_str(text)?;
        value["data"] = data;
    }
    Ok(value)
}

/// Build a message from a decoded envelope; `None` when it has no headers
pub fn into_message(value: Value) -> Result<Option<StreamMessage>, AdapterError> {
    let Value::Object(mut envelope) = value else {
        return Err(AdapterError::Format("record value is not an object".to_string()));
    };
    let Some(headers) = envelope.remove("headers") else {
        return Ok(None);
    };
    let headers: MessageHeaders = serde_json::from_value(headers)?;
    let data = envelope.remove("data").unwrap_or(Value::Null);
    Ok(Some(StreamMessage::new(headers, data)))
}

/// Decode one record fetched from the stream
pub fn decode_raw_message(raw: &RawMessage) -> Result<Option<StreamMessage>, AdapterError> {
    into_message(decode_value(&raw.payload)?)
}

/// Decode a connector-hub delivery: a list of records whose `value` is base64 text.
///
/// Records that fail to decode are logged and skipped.
pub fn decode_connector_messages(body: &Value) -> Result<Vec<StreamMessage>, AdapterError> {
    let records = body
        .as_array()
        .ok_or_else(|| AdapterError::Format("connector delivery is not a list".to_string()))?;

    let mut messages = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let Some(value) = record.get("value").and_then(Value::as_str) else {
            tracing::warn!("Connector record {} has no value, skipping", index);
            continue;
        };
        match decode_value(value.as_bytes()).and_then(into_message) {
            Ok(Some(message)) => messages.push(message),
            Ok(None) => tracing::warn!("Connector record {} has no headers, dropping", index),
            Err(e) => tracing::error!("Cannot decode connector record {}: {}", index, e),
        }
    }
    Ok(messages)
}

/// Group messages by `headers.messageType` then `headers.operation`.
///
/// Messages missing either header are dropped.
pub fn group_messages(messages: impl IntoIterator<Item = StreamMessage>) -> GroupedMessages {
    let mut grouped = GroupedMessages::new();
    for message in messages {
        let (Some(message_type), Some(operation)) = (
            message.headers.message_type.clone(),
            message.headers.operation.clone(),
        ) else {
            tracing::warn!("Dropping message without messageType/operation headers");
            continue;
        };
        grouped
            .entry(message_type)
            .or_default()
            .entry(operation)
            .or_default()
            .push(message);
    }
    grouped
}
