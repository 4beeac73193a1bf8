//! Cloud groups and their identity memberships.

use crate::entity::{EntityError, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::CloudGroupRow;
use crate::schema::EntityType;
use crate::transformers::common::{id_segment, membership, prepare, Overwrite};
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct CloudGroupTransformer;

impl Transformer for CloudGroupTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::CloudGroup
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut group = CloudGroupRow::default();
        group.stamp(ctx);

        if let Some(id) = payload.text("id") {
            group.group_membership_type.overwrite(id_segment(&id, 1));
            group.id = id;
        }
        group.external_id.overwrite(payload.text("externalId"));
        group.target_id.overwrite(payload.text("targetId"));
        group.compartment_id.overwrite(payload.text("compartmentId"));
        group.name.overwrite(payload.text("name"));
        group.domain_id.overwrite(payload.text("domainId"));
        group.attributes.overwrite(payload.json("customAttributes"));

        let rows = membership(
            &group,
            payload.list("add.identities"),
            payload.list("remove.identities"),
            |row, op, identity| {
                row.identity_operation_type = op.as_str().to_string();
                row.identity_global_id.overwrite(identity.text("id"));
                row.identity_target_identity_id.overwrite(identity.text("targetIdentityId"));
                row.identity_external_id.overwrite(identity.text("externalId"));
                Ok(())
            },
        )?;

        Ok(prepare(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Operation;
    use serde_json::json;

    #[test]
    fn test_membership_fan_out() {
        let ctx = EventContext::new(EntityType::CloudGroup, Operation::Update).with_tenancy("ten");
        let payload = json!({
            "id": "ocid1.group.oc1..aaa",
            "name": "admins",
            "targetId": "tgt",
            "add": {"identities": [
                {"id": "gid-A", "targetIdentityId": "ti-A"},
                {"id": "gid-B", "targetIdentityId": "ti-B"}
            ]},
            "remove": {"identities": [{"id": "gid-C", "externalId": "ext-C"}]}
        });

        let rows = CloudGroupTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();

        assert_eq!(rows.len(), 3);
        let ops: Vec<&str> = rows
            .iter()
            .map(|r| r.get_str("identity_operation_type").unwrap())
            .collect();
        assert_eq!(ops, vec!["add", "add", "remove"]);
        assert_eq!(rows[2].get_str("identity_global_id"), Some("gid-C"));
        assert_eq!(rows[2].get_str("identity_external_id"), Some("ext-C"));

        for row in &rows {
            assert_eq!(row.get_str("id"), Some("ocid1.group.oc1..aaa"));
            assert_eq!(row.get_str("group_membership_type"), Some("group"));
            assert_eq!(row.get_str("name"), Some("admins"));
            assert_eq!(row.get_str("tenancy_id"), Some("ten"));
        }
    }

    #[test]
    fn test_no_members_single_row() {
        let ctx = EventContext::new(EntityType::CloudGroup, Operation::Create);
        let payload = json!({"id": "ocid1.dynamicgroup.oc1..x", "customAttributes": {"k": 1}});

        let rows = CloudGroupTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("identity_operation_type"), Some(""));
        assert_eq!(rows[0].get_str("identity_global_id"), Some(""));
        assert_eq!(rows[0].get_str("attributes"), Some(r#"{"k":1}"#));
    }
}
