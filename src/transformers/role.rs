//! Roles, one row per granted access bundle.

use crate::entity::{EntityError, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::RoleRow;
use crate::schema::EntityType;
use crate::transformers::common::{expand, prepare, Overwrite};
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct RoleTransformer;

impl Transformer for RoleTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::Role
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut role = RoleRow::default();
        role.stamp(ctx);

        role.id.overwrite(payload.text("id"));
        role.external_id.overwrite(payload.text("externalId"));
        role.name.overwrite(payload.text("name"));
        role.description.overwrite(payload.text("description"));
        role.requestable_by.overwrite(payload.text("requestableBy"));
        role.status.overwrite(payload.text("status"));
        role.approval_workflow_id.overwrite(payload.text("approvalWorkflow.id"));
        role.approval_workflow_name.overwrite(payload.text("approvalWorkflow.name"));
        role.approval_workflow_description.overwrite(payload.text("approvalWorkflow.description"));
        role.created_by.overwrite(payload.text("createdBy"));
        role.created_on.overwrite(payload.number("createdOn")?);
        role.updated_by.overwrite(payload.text("updatedBy"));
        role.updated_on.overwrite(payload.number("updatedOn")?);
        role.ag_managed.overwrite(payload.text("agManaged"));
        role.owner_display_name.overwrite(payload.text("owner.displayName"));
        role.owner_value.overwrite(payload.text("owner.value"));
        role.ownership_collection_id
            .overwrite(payload.text_any(&["ownershipCollectionId", "ownerShipCollectionId"]));
        role.managed_by_ids.overwrite(payload.json("managedByIds"));
        role.owner_uids.overwrite(payload.json_any(&["ownerUIDs", "ownerUids"]));
        role.attributes.overwrite(payload.json("customAttributes"));

        let rows = expand(&role, payload.list("accessBundleIds"), |row, bundle| {
            row.access_bundle_id.overwrite(bundle.as_text());
            Ok(())
        })?;

        Ok(prepare(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Operation;
    use serde_json::json;

    #[test]
    fn test_bundle_fan_out() {
        let ctx = EventContext::new(EntityType::Role, Operation::Create)
            .with_tenancy("ten")
            .with_service_instance("svc");
        let payload = json!({
            "id": "role-1",
            "agManaged": true,
            "owner": {"displayName": "Ops", "value": "grp-ops"},
            "managedByIds": ["m1"],
            "accessBundleIds": ["ab-1", "ab-2"]
        });

        let rows = RoleTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_str("access_bundle_id"), Some("ab-1"));
        assert_eq!(rows[1].get_str("access_bundle_id"), Some("ab-2"));
        for row in &rows {
            assert_eq!(row.get_str("ag_managed"), Some("true"));
            assert_eq!(row.get_str("owner_value"), Some("grp-ops"));
            assert_eq!(row.get_str("managed_by_ids"), Some(r#"["m1"]"#));
            assert_eq!(row.get_str("event_object_type"), Some("ROLE"));
        }
    }
}
