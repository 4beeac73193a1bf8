use crate::entity::{EntityError, EntityRow, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::AccessGuardrailRow;
use crate::schema::EntityType;
use crate::transformers::common::Overwrite;
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct AccessGuardrailTransformer;

impl Transformer for AccessGuardrailTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::AccessGuardrail
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut guardrail = AccessGuardrailRow::default();
        guardrail.stamp(ctx);

        guardrail.id.overwrite(payload.text("id"));
        guardrail.external_id.overwrite(payload.text("externalId"));
        guardrail.name.overwrite(payload.text("name"));
        guardrail.description.overwrite(payload.text("description"));

        if let Some(action) = payload.object("actionOnFailure") {
            guardrail.action_on_failure_action_type.overwrite(action.text("actionType"));
            guardrail
                .action_on_failure_revoke_after_number_of_days
                .overwrite(action.integer("revokeLaterAfterNumberOfDays")?);
            guardrail.action_on_failure_risk.overwrite(action.text("risk"));
            guardrail
                .action_on_failure_should_user_manager_be_notified
                .overwrite(action.text("shouldUserManagerBeNotified"));
        }

        guardrail.created_by_display_name.overwrite(payload.text("createdByRef.displayName"));
        guardrail.created_by_value.overwrite(payload.text("createdByRef.value"));
        guardrail.created_by_resource_type.overwrite(payload.text("createdByRef.resourceType"));
        guardrail.created_on.overwrite(payload.number("createdOn")?);
        guardrail.etag.overwrite(payload.text("etag"));
        guardrail
            .is_detective_violation_check_enabled
            .overwrite(payload.text("isDetectiveViolationCheckEnabled"));
        guardrail.lifecycle_state.overwrite(payload.text("lifecycleState"));
        guardrail.owner_display_name.overwrite(payload.text("owner.displayName"));
        guardrail.owner_value.overwrite(payload.text("owner.value"));
        guardrail
            .ownership_collection_id
            .overwrite(payload.text_any(&["ownerShipCollectionId", "ownershipCollectionId"]));
        guardrail.updated_by_display_name.overwrite(payload.text("updatedByRef.displayName"));
        guardrail.updated_by_value.overwrite(payload.text("updatedByRef.value"));
        guardrail.updated_by_resource_type.overwrite(payload.text("updatedByRef.resourceType"));
        guardrail.updated_on.overwrite(payload.number("updatedOn")?);
        guardrail.tags.overwrite(payload.text("tags"));
        guardrail.rules.overwrite(payload.json("rules"));
        guardrail.attributes.overwrite(payload.json("customAttributes"));

        Ok(vec![guardrail.into_prepared()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::FieldValue;
    use crate::schema::Operation;
    use serde_json::json;

    #[test]
    fn test_action_on_failure() {
        let ctx = EventContext::new(EntityType::AccessGuardrail, Operation::Create);
        let payload = json!({
            "id": "ag-1",
            "actionOnFailure": {
                "actionType": "REVOKE_LATER",
                "revokeLaterAfterNumberOfDays": 30,
                "shouldUserManagerBeNotified": true
            },
            "isDetectiveViolationCheckEnabled": false,
            "rules": [{"kind": "sod"}]
        });

        let rows = AccessGuardrailTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();

        let row = &rows[0];
        assert_eq!(
            row.get("action_on_failure_revoke_after_number_of_days"),
            Some(&FieldValue::Int(30))
        );
        assert_eq!(row.get_str("action_on_failure_should_user_manager_be_notified"), Some("true"));
        assert_eq!(row.get_str("is_detective_violation_check_enabled"), Some("false"));
        assert_eq!(row.get_str("rules"), Some(r#"[{"kind":"sod"}]"#));
        assert_eq!(row.get_str("action_on_failure_risk"), Some(""));
    }

    #[test]
    fn test_fractional_days_rejected() {
        let ctx = EventContext::new(EntityType::AccessGuardrail, Operation::Update);
        let payload = json!({"id": "ag-2", "actionOnFailure": {"revokeLaterAfterNumberOfDays": 1.5}});

        assert!(AccessGuardrailTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .is_err());
    }
}
