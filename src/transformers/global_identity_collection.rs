//! Identity collections and their member changes.

use crate::entity::{EntityError, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::GlobalIdentityCollectionRow;
use crate::schema::EntityType;
use crate::transformers::common::{membership, prepare, Overwrite};
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct GlobalIdentityCollectionTransformer;

impl Transformer for GlobalIdentityCollectionTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::GlobalIdentityCollection
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut gic = GlobalIdentityCollectionRow::default();
        gic.stamp(ctx);

        gic.id.overwrite(payload.text("id"));
        gic.name.overwrite(payload.text("name"));
        gic.display_name.overwrite(payload.text("displayName"));
        gic.external_id.overwrite(payload.text("externalId"));
        gic.target_id.overwrite(payload.text("targetId"));
        gic.risk.overwrite(payload.number("agRisk.value")?);
        gic.identity_collection_description
            .overwrite(payload.text("identityCollectionDescription"));
        gic.identity_collection_type.overwrite(payload.text("identityCollectionType"));
        gic.is_managed_at_target.overwrite(payload.text("isManagedAtTarget"));
        gic.status.overwrite(payload.text("status"));
        gic.created_by.overwrite(payload.text("createdBy"));
        gic.created_by_display_name.overwrite(payload.text("createdByRef.displayName"));
        gic.created_by_value.overwrite(payload.text("createdByRef.value"));
        gic.created_by_resource_type.overwrite(payload.text("createdByRef.resourceType"));
        gic.created_on.overwrite(payload.number("createdOn")?);
        gic.updated_by.overwrite(payload.text("updatedBy"));
        gic.updated_by_display_name.overwrite(payload.text("updatedByRef.displayName"));
        gic.updated_by_value.overwrite(payload.text("updatedByRef.value"));
        gic.updated_by_resource_type.overwrite(payload.text("updatedByRef.resourceType"));
        gic.updated_on.overwrite(payload.number("updatedOn")?);
        gic.ag_managed.overwrite(payload.text("agManaged"));
        gic.owner_display_name.overwrite(payload.text("owner.displayName"));
        gic.owner_value.overwrite(payload.text("owner.value"));
        gic.ownership_collection_id
            .overwrite(payload.text_any(&["ownershipCollectionId", "ownerShipCollectionId"]));
        gic.tags.overwrite(payload.json("tags"));
        gic.managed_by_ids.overwrite(payload.json("managedByIds"));
        gic.owner_uids.overwrite(payload.json_any(&["ownerUIDs", "ownerUids"]));
        gic.access_guardrail_ids.overwrite(payload.json("accessGuardrailIds"));
        gic.attributes.overwrite(payload.json("customAttributes"));

        let rows = membership(
            &gic,
            payload.list("add.members"),
            payload.list("remove.members"),
            |row, op, member| {
                row.member_operation_type = op.as_str().to_string();
                row.member_global_id.overwrite(member.text("globalIdentityId"));
                row.membership_type.overwrite(member.text("membershipType"));
                Ok(())
            },
        )?;

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
    fn test_members_and_shared_fields() {
        let ctx = EventContext::new(EntityType::GlobalIdentityCollection, Operation::Update);
        let payload = json!({
            "id": "gic-1",
            "name": "engineering",
            "agRisk": {"value": 3},
            "tags": ["eng", "core"],
            "ownerUids": ["u1"],
            "createdByRef": {"displayName": "Admin", "value": "adm", "resourceType": "User"},
            "add": {"members": [{"globalIdentityId": "A"}, {"globalIdentityId": "B"}]},
            "remove": {"members": [{"globalIdentityId": "C"}]}
        });

        let rows = GlobalIdentityCollectionTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();

        let members: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| {
                (
                    r.get_str("member_global_id").unwrap(),
                    r.get_str("member_operation_type").unwrap(),
                )
            })
            .collect();
        assert_eq!(members, vec![("A", "add"), ("B", "add"), ("C", "remove")]);

        for row in &rows {
            assert_eq!(row.get_str("name"), Some("engineering"));
            assert_eq!(row.get("risk"), Some(&FieldValue::Float(3.0)));
            assert_eq!(row.get_str("tags"), Some(r#"["eng","core"]"#));
            assert_eq!(row.get_str("owner_uids"), Some(r#"["u1"]"#));
            assert_eq!(row.get_str("created_by_resource_type"), Some("User"));
        }
    }

    #[test]
    fn test_no_members() {
        let ctx = EventContext::new(EntityType::GlobalIdentityCollection, Operation::Create);
        let payload = json!({"id": "gic-2", "ownerShipCollectionId": "oc-1"});

        let rows = GlobalIdentityCollectionTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("member_global_id"), Some(""));
        assert_eq!(rows[0].get_str("ownership_collection_id"), Some("oc-1"));
        assert_eq!(rows[0].get_str("managed_by_ids"), Some("[]"));
    }
}
