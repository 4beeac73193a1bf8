//! Access bundles, one row per bundled permission.

use crate::entity::{EntityError, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::AccessBundleRow;
use crate::schema::EntityType;
use crate::transformers::common::{expand, prepare, Overwrite};
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct AccessBundleTransformer;

impl Transformer for AccessBundleTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::AccessBundle
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut bundle = AccessBundleRow::default();
        bundle.stamp(ctx);

        bundle.id.overwrite(payload.text("id"));
        bundle.external_id.overwrite(payload.text("externalId"));
        bundle.name.overwrite(payload.text("name"));
        bundle.description.overwrite(payload.text("description"));
        bundle.display_name.overwrite(payload.text("displayName"));
        bundle.requestable_by.overwrite(payload.text("requestableBy"));
        bundle.status.overwrite(payload.text("status"));
        bundle.approval_workflow_id.overwrite(payload.text("approvalWorkflow.id"));
        bundle.approval_workflow_name.overwrite(payload.text("approvalWorkflow.name"));
        bundle.approval_workflow_description
            .overwrite(payload.text("approvalWorkflow.description"));
        bundle.access_guardrail_ids.overwrite(payload.json("accessGuardrailIds"));
        bundle.target_id.overwrite(payload.text("targetId"));
        bundle.tags.overwrite(payload.text("tags"));
        bundle.access_bundle_type.overwrite(payload.text("accessBundleType"));
        bundle.permission_ids.overwrite(payload.json("permissionIds"));
        bundle.created_by.overwrite(payload.text("createdBy"));
        bundle.created_by_display_name.overwrite(payload.text("createdByRef.displayName"));
        bundle.created_by_value.overwrite(payload.text("createdByRef.value"));
        bundle.created_by_resource_type.overwrite(payload.text("createdByRef.resourceType"));
        bundle.created_on.overwrite(payload.number("createdOn")?);
        bundle.updated_by.overwrite(payload.text("updatedBy"));
        bundle.updated_by_display_name.overwrite(payload.text("updatedByRef.displayName"));
        bundle.updated_by_value.overwrite(payload.text("updatedByRef.value"));
        bundle.updated_by_resource_type.overwrite(payload.text("updatedByRef.resourceType"));
        bundle.updated_on.overwrite(payload.number("updatedOn")?);
        bundle.ag_managed.overwrite(payload.text("agManaged"));
        bundle.owner_display_name.overwrite(payload.text("owner.displayName"));
        bundle.owner_value.overwrite(payload.text("owner.value"));
        bundle.ownership_collection_id
            .overwrite(payload.text_any(&["ownershipCollectionId", "ownerShipCollectionId"]));
        bundle.managed_by_ids.overwrite(payload.json("managedByIds"));
        bundle.owner_uids.overwrite(payload.json_any(&["ownerUIDs", "ownerUids"]));
        bundle.account_profile_exists.overwrite(payload.text("isAccountProfileExists"));
        bundle.account_profile_id.overwrite(payload.text("accountProfileId"));
        bundle.account_profile_name.overwrite(payload.text("accountProfileName"));
        bundle.auto_approval_if_no_violation.overwrite(payload.text("autoApproveIfNoViolation"));
        bundle.access_limit_type.overwrite(payload.text("accessLimitType"));
        bundle.expiration_time.overwrite(payload.number("expirationTime")?);
        bundle.notification_time.overwrite(payload.number("notificationTime")?);
        bundle.extension_time.overwrite(payload.number("extensionTime")?);
        bundle.extension_approval_workflow_id
            .overwrite(payload.text("extensionApprovalWorkflow.id"));
        bundle.extension_approval_workflow_name
            .overwrite(payload.text("extensionApprovalWorkflow.name"));
        bundle.extension_approval_workflow_description
            .overwrite(payload.text("extensionApprovalWorkflow.description"));
        bundle.attributes.overwrite(payload.json("customAttributes"));

        let rows = expand(&bundle, payload.list("permissionIds"), |row, permission| {
            row.permission_id.overwrite(permission.as_text());
            Ok(())
        })?;

        Ok(prepare(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::FieldValue;
    use crate::schema::Operation;
    use serde_json::json;

    #[test]
    fn test_permission_fan_out() {
        let ctx = EventContext::new(EntityType::AccessBundle, Operation::Create);
        let payload = json!({
            "id": "ab-1",
            "name": "db-admin",
            "approvalWorkflow": {"id": "aw-1", "name": "two-step"},
            "isAccountProfileExists": false,
            "expirationTime": 86400000,
            "permissionIds": ["p1", "p2", "p3"]
        });

        let rows = AccessBundleTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();

        assert_eq!(rows.len(), 3);
        let permissions: Vec<&str> =
            rows.iter().map(|r| r.get_str("permission_id").unwrap()).collect();
        assert_eq!(permissions, vec!["p1", "p2", "p3"]);

        let first = &rows[0];
        assert_eq!(first.get_str("approval_workflow_name"), Some("two-step"));
        assert_eq!(first.get_str("account_profile_exists"), Some("false"));
        assert_eq!(first.get("expiration_time"), Some(&FieldValue::Float(86400000.0)));
        assert_eq!(first.get_str("permission_ids"), Some(r#"["p1","p2","p3"]"#));
    }

    #[test]
    fn test_without_permissions() {
        let ctx = EventContext::new(EntityType::AccessBundle, Operation::Delete);
        let payload = json!({"id": "ab-2"});

        let rows = AccessBundleTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("permission_id"), Some(""));
        assert_eq!(rows[0].get_str("permission_ids"), Some("[]"));
    }

    #[test]
    fn test_scalar_permission_ids_keep_base_row() {
        let ctx = EventContext::new(EntityType::AccessBundle, Operation::Update);
        let payload = json!({"id": "ab-3", "name": "ops", "permissionIds": "p1"});

        let rows = AccessBundleTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("name"), Some("ops"));
        assert_eq!(rows[0].get_str("permission_id"), Some(""));
    }
}
