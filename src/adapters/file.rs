//! Object-store file framing.
//!
//! Two framings are accepted:
//!
//! - newline-delimited (`.jsonl` / `.ndjson`): lines carrying `headers` set
//!   the shared metadata, every other line is one raw event
//! - a single envelope `{"headers": {...}, "data": ...}` where `data` is one
//!   payload, a list of payloads, or either of those encoded as JSON text

use serde_json::Value;

use crate::nats::message_envelope::MessageHeaders;

use super::AdapterError;

/// Where an object lives, as named by an object-store event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub namespace: String,
    pub bucket: String,
    pub object_name: String,
}

fn required_str<'a>(value: Option<&'a Value>, message: &str) -> Result<&'a str, AdapterError> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AdapterError::MissingField(message.to_string()))
}

impl ObjectLocation {
    /// Read the object coordinates from an object-store event body
    pub fn from_event(body: &Value) -> Result<Self, AdapterError> {
        let data = body
            .get("data")
            .ok_or_else(|| AdapterError::MissingField("Cannot process file - no data provided".to_string()))?;
        let details = data.get("additionalDetails").ok_or_else(|| {
            AdapterError::MissingField(
                "Cannot process file - not all of the necessary details have been provided."
                    .to_string(),
            )
        })?;

        let object_name = required_str(
            data.get("resourceName"),
            "Cannot process file - no object name provided.",
        )?;
        let bucket = required_str(
            details.get("bucketName"),
            "Cannot process file - no bucket information provided.",
        )?;
        let namespace = required_str(
            details.get("namespace"),
            "Cannot process file - no namespace information provided.",
        )?;

        Ok(Self {
            namespace: namespace.to_string(),
            bucket: bucket.to_string(),
            object_name: object_name.to_string(),
        })
    }
}

/// Contents of one downloaded object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileObject {
    pub headers: MessageHeaders,
    pub events: Vec<Value>,
}

fn merge_headers(target: &mut MessageHeaders, value: &Value) -> Result<(), AdapterError> {
    let headers: MessageHeaders = serde_json::from_value(value.clone())?;
    let MessageHeaders {
        message_type,
        operation,
        event_time,
        tenancy_id,
        service_instance_id,
    } = headers;
    if message_type.is_some() {
        target.message_type = message_type;
    }
    if operation.is_some() {
        target.operation = operation;
    }
    if event_time.is_some() {
        target.event_time = event_time;
    }
    if tenancy_id.is_some() {
        target.tenancy_id = tenancy_id;
    }
    if service_instance_id.is_some() {
        target.service_instance_id = service_instance_id;
    }
    Ok(())
}

/// `data` may itself be JSON text
fn unwrap_data(data: Value) -> Result<Value, AdapterError> {
    match data {
        Value::String(text) => Ok(serde_json::from_str(&text)?),
        other => Ok(other),
    }
}

fn is_line_delimited(object_name: &str) -> bool {
    object_name.ends_with(".jsonl") || object_name.ends_with(".ndjson")
}

impl FileObject {
    /// Parse object bytes, choosing the framing from the object name
    pub fn parse(object_name: &str, bytes: &[u8]) -> Result<Self, AdapterError> {
        let content = String::from_utf8(bytes.to_vec())?;
        if content.trim().is_empty() {
            return Err(AdapterError::Format(format!("object {} is empty", object_name)));
        }

        let object = if is_line_delimited(object_name) {
            Self::parse_lines(&content)?
        } else {
            Self::parse_envelope(&content)?
        };

        tracing::info!(
            "Extracted {} raw events of type {} from {}",
            object.events.len(),
            object.headers.message_type.as_deref().unwrap_or("<unknown>"),
            object_name
        );
        Ok(object)
    }

    fn parse_lines(content: &str) -> Result<Self, AdapterError> {
        let mut object = FileObject::default();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: Value = serde_json::from_str(line).map_err(|e| {
                AdapterError::Format(format!("line {} is not valid JSON: {}", number + 1, e))
            })?;
            match record.get("headers") {
                Some(headers) => {
                    merge_headers(&mut object.headers, headers)?;
                    if let Some(data) = record.get("data") {
                        object.push_data(unwrap_data(data.clone())?);
                    }
                }
                None => object.events.push(record),
            }
        }
        Ok(object)
    }

    fn parse_envelope(content: &str) -> Result<Self, AdapterError> {
        let outer: Value = serde_json::from_str(content)?;
        let mut object = FileObject::default();
        if let Some(headers) = outer.get("headers") {
            merge_headers(&mut object.headers, headers)?;
        }

        match outer.get("data").cloned().map(unwrap_data) {
            Some(Ok(data)) => object.push_data(data),
            Some(Err(e)) => tracing::error!("Failed to parse payload 'data' field: {}", e),
            None => tracing::warn!("Cannot process event content - no data field was found."),
        }
        Ok(object)
    }

    fn push_data(&mut self, data: Value) {
        match data {
            Value::Array(items) => self.events.extend(items),
            Value::Object(_) => self.events.push(data),
            _ => tracing::warn!("Cannot process event content - unknown format was found."),
        }
    }
}
