//! Per-entity transformers: raw payload in, flat rows out.
//!
//! Every transformer starts from its row type's defaults, stamps the envelope
//! columns from the [`EventContext`], overwrites only the fields present in
//! the payload and fans out list fields into one row per element.

pub mod access_bundle;
pub mod access_guardrail;
pub mod approval_workflow;
pub mod audit_events;
pub mod cloud_group;
pub mod cloud_policy;
pub mod common;
pub mod global_identity_collection;
pub mod identity;
pub mod orchestrated_system;
pub mod ownership_collection;
pub mod permission;
pub mod permission_assignment;
pub mod policy;
pub mod policy_statement_resource_mapping;
pub mod resource;
pub mod role;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::entity::{EntityError, PreparedRow};
use crate::extraction::Payload;
use crate::nats::message_envelope::{MessageHeaders, StreamMessage};
use crate::schema::{EntityType, Operation};

pub use common::{MemberOp, Overwrite};

/// Output format of envelope timestamps
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f %:z";

/// Envelope values copied onto every row of one event
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    pub entity_type: EntityType,
    pub operation: Operation,
    pub tenancy_id: Option<String>,
    pub service_instance_id: Option<String>,
    /// Already formatted with [`EVENT_TIME_FORMAT`]
    pub event_timestamp: Option<String>,
}

impl EventContext {
    pub fn new(entity_type: EntityType, operation: Operation) -> Self {
        Self {
            entity_type,
            operation,
            tenancy_id: None,
            service_instance_id: None,
            event_timestamp: None,
        }
    }

    pub fn with_tenancy(mut self, tenancy_id: impl Into<String>) -> Self {
        self.tenancy_id = Some(tenancy_id.into());
        self
    }

    pub fn with_service_instance(mut self, service_instance_id: impl Into<String>) -> Self {
        self.service_instance_id = Some(service_instance_id.into());
        self
    }

    /// Set the event time from a raw ISO-8601 value
    pub fn with_event_time(mut self, raw: &str) -> Result<Self, EntityError> {
        self.event_timestamp = Some(format_event_time(raw)?);
        Ok(self)
    }

    /// Overlay the values carried by message headers
    pub fn with_headers(&self, headers: &MessageHeaders) -> Result<Self, EntityError> {
        let mut ctx = self.clone();
        if let Some(tenancy_id) = headers.tenancy_id.as_ref() {
            ctx.tenancy_id = Some(tenancy_id.clone());
        }
        if let Some(sid) = headers.service_instance_id.as_ref() {
            ctx.service_instance_id = Some(sid.clone());
        }
        if let Some(event_time) = headers.event_time.as_deref() {
            ctx.event_timestamp = Some(format_event_time(event_time)?);
        }
        Ok(ctx)
    }

    pub fn is_delete(&self) -> bool {
        self.operation.is_delete()
    }
}

/// Normalize an ISO-8601 timestamp (with or without offset) to UTC
pub fn format_event_time(raw: &str) -> Result<String, EntityError> {
    let raw = raw.trim();
    let utc = match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => {
            let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
                .map_err(|_| EntityError::InvalidTimestamp(raw.to_string()))?;
            naive.and_utc()
        }
    };
    Ok(utc.format(EVENT_TIME_FORMAT).to_string())
}

/// Stamp envelope columns onto a typed row
pub trait Stamp {
    fn stamp(&mut self, ctx: &EventContext);
}

/// Flattens raw payloads of one entity type into prepared rows
pub trait Transformer: Send + Sync {
    fn entity_type(&self) -> EntityType;

    /// Flatten one raw payload into one or more rows
    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError>;

    /// Flatten one decoded stream message, copying its headers onto every row
    fn transform_stream_message(
        &self,
        ctx: &EventContext,
        message: &StreamMessage,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let ctx = ctx.with_headers(&message.headers)?;
        transform_events(self, &ctx, message.payloads())
    }

    /// Final pass over all rows produced for one invocation
    fn clean(&self, rows: Vec<PreparedRow>) -> Vec<PreparedRow> {
        rows
    }
}

/// Transform a sequence of payloads, skipping the ones that fail.
///
/// Malformed payloads are logged and dropped; fatal precondition errors abort.
pub fn transform_events<'a, T, I>(
    transformer: &T,
    ctx: &EventContext,
    payloads: I,
) -> Result<Vec<PreparedRow>, EntityError>
where
    T: Transformer + ?Sized,
    I: IntoIterator<Item = &'a Value>,
{
    let mut rows = Vec::new();
    for (index, value) in payloads.into_iter().enumerate() {
        match transformer.transform_raw_event(ctx, Payload::new(value)) {
            Ok(mut produced) => rows.append(&mut produced),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::error!(
                    entity_type = %ctx.entity_type,
                    operation = %ctx.operation,
                    event_index = index,
                    "Cannot process event: {}",
                    e
                );
            }
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_event_time_with_offset() {
        let formatted = format_event_time("2024-05-01T12:30:00.123+02:00").unwrap();
        assert_eq!(formatted, "2024-05-01 10:30:00.123000 +00:00");
    }

    #[test]
    fn test_format_event_time_without_offset() {
        let formatted = format_event_time("2024-05-01T12:30:00").unwrap();
        assert_eq!(formatted, "2024-05-01 12:30:00.000000 +00:00");
    }

    #[test]
    fn test_format_event_time_invalid() {
        assert!(matches!(
            format_event_time("yesterday"),
            Err(EntityError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_context_from_headers() {
        let ctx = EventContext::new(EntityType::Role, Operation::Create).with_tenancy("file-ten");
        let headers = MessageHeaders {
            service_instance_id: Some("svc".to_string()),
            event_time: Some("2024-01-02T03:04:05Z".to_string()),
            ..Default::default()
        };

        let merged = ctx.with_headers(&headers).unwrap();
        assert_eq!(merged.tenancy_id.as_deref(), Some("file-ten"));
        assert_eq!(merged.service_instance_id.as_deref(), Some("svc"));
        assert_eq!(
            merged.event_timestamp.as_deref(),
            Some("2024-01-02 03:04:05.000000 +00:00")
        );
    }

    #[test]
    fn test_transform_events_skips_malformed() {
        let transformer = role::RoleTransformer;
        let ctx = EventContext::new(EntityType::Role, Operation::Create);
        let payloads = vec![json!({"id": "r1"}), json!({"id": "r2", "createdOn": "soon"})];

        let rows = transform_events(&transformer, &ctx, payloads.iter()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("id"), Some("r1"));

        let ctx = EventContext::new(EntityType::PermissionAssignment, Operation::Delete);
        let payloads = vec![json!({"targetIdentityId": "t1", "ids": []})];
        let err = transform_events(
            &permission_assignment::PermissionAssignmentTransformer,
            &ctx,
            payloads.iter(),
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_stream_message_flattens_list() {
        let transformer = role::RoleTransformer;
        let ctx = EventContext::new(EntityType::Role, Operation::Update);
        let message = StreamMessage::new(
            MessageHeaders {
                tenancy_id: Some("ten".to_string()),
                service_instance_id: Some("svc".to_string()),
                event_time: Some("2024-01-02T03:04:05Z".to_string()),
                ..Default::default()
            },
            json!([{"id": "r1"}, {"id": "r2"}]),
        );

        let rows = transformer.transform_stream_message(&ctx, &message).unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.get_str("tenancy_id"), Some("ten"));
            assert_eq!(row.get_str("service_instance_id"), Some("svc"));
            assert_eq!(row.get_str("event_timestamp"), Some("2024-01-02 03:04:05.000000 +00:00"));
            assert_eq!(row.get_str("operation_type"), Some("UPDATE"));
        }
    }
}
