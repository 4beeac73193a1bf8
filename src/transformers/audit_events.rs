//! Audit events: append-only, one row per event.

use crate::entity::{EntityError, EntityRow, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::AuditEventRow;
use crate::schema::EntityType;
use crate::transformers::common::Overwrite;
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct AuditEventsTransformer;

impl Transformer for AuditEventsTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::AuditEvents
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut event = AuditEventRow::default();
        event.stamp(ctx);

        event.source.overwrite(payload.text("source"));
        event.audit_event_type.overwrite(payload.text("eventType"));
        event.audit_event_type_version.overwrite(payload.text("eventTypeVersion"));
        event.content_type.overwrite(payload.text("contentType"));
        event.region.overwrite(payload.text("region"));
        event.availability_domain.overwrite(payload.text("availabilityDomain"));

        event.identity_host.overwrite(payload.text("identity.host"));
        event.identity_user_agent.overwrite(payload.text("identity.userAgent"));
        event.identity_principal_id.overwrite(payload.text("identity.principalId"));

        event.request_time.overwrite(payload.text("request.requestTime"));
        event.request_id.overwrite(payload.text("request.id"));
        event.request_path.overwrite(payload.text("request.path"));
        event.request_action.overwrite(payload.text("request.action"));
        event.request_parameters.overwrite(payload.json("request.parameters"));
        event.request_headers.overwrite(payload.json("request.headers"));
        event.request_payload.overwrite(payload.json("request.payload"));

        event.response_time.overwrite(payload.text("response.responseTime"));
        event.response_status.overwrite(payload.text("response.status"));
        event.response_headers.overwrite(payload.json("response.headers"));
        event.response_payload.overwrite(payload.json("response.payload"));

        event.state_change.overwrite(payload.json("stateChange"));
        event.attributes.overwrite(payload.json("customAttributes"));

        Ok(vec![event.into_prepared()])
    }
}
