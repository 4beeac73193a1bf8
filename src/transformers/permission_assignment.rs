//! Permission assignments of a target identity.
//!
//! Deletes carry the revoked permission ids in `ids`; creates and updates
//! carry `add` / `remove` assignment lists.

use crate::entity::{EntityError, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::PermissionAssignmentRow;
use crate::schema::EntityType;
use crate::transformers::common::{expand, membership, prepare, Overwrite};
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct PermissionAssignmentTransformer;

impl Transformer for PermissionAssignmentTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::PermissionAssignment
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut assignment = PermissionAssignmentRow::default();
        assignment.stamp(ctx);

        assignment.target_identity_id.overwrite(payload.text("targetIdentityId"));
        assignment.global_identity_id.overwrite(payload.text("globalIdentityId"));
        assignment.attributes.overwrite(payload.json("additionalProperties"));

        if ctx.is_delete() {
            let ids = payload.list("ids").filter(|ids| !ids.is_empty()).ok_or_else(|| {
                EntityError::EmptyIdentifierList {
                    entity_type: ctx.entity_type.as_str().to_string(),
                }
            })?;
            let rows = expand(&assignment, Some(ids), |row, id| {
                row.permission_id.overwrite(id.as_text());
                Ok(())
            })?;
            return Ok(prepare(rows));
        }

        let rows = membership(
            &assignment,
            payload.list("add"),
            payload.list("remove"),
            |row, op, grant| {
                row.identity_operation_type = op.as_str().to_string();
                row.assignment_id.overwrite(grant.text("id"));
                row.external_id.overwrite(grant.text("externalId"));
                row.target_id.overwrite(grant.text("targetId"));
                row.target_type.overwrite(grant.text("targetType"));
                row.grant_type.overwrite(grant.text("granttype"));
                row.permission_type.overwrite(grant.text("permissionType"));
                row.permission_id.overwrite(grant.text("permissionId"));
                row.permission_name.overwrite(grant.text("permissionName"));
                row.access_bundle_id.overwrite(grant.text("accessBundleId"));
                row.access_bundle_name.overwrite(grant.text("accessBundleName"));
                row.role_id.overwrite(grant.text("roleId"));
                row.role_name.overwrite(grant.text("roleName"));
                row.identity_group_id.overwrite(grant.text("identityGroupId"));
                row.identity_group_name.overwrite(grant.text("identityGroupName"));
                row.resource_id.overwrite(grant.text("resourceId"));
                row.resource_display_name.overwrite(grant.text("resourceDisplayName"));
                row.policy_id.overwrite(grant.text("policyId"));
                row.policy_name.overwrite(grant.text("policyName"));
                row.policy_rule_id.overwrite(grant.text("policyRuleId"));
                row.user_login.overwrite(grant.text("userLogin"));
                row.valid_from.overwrite(grant.number("validFrom")?);
                row.valid_to.overwrite(grant.number("validTo")?);
                row.assignment_attributes.overwrite(grant.json("customAttributes"));
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
    fn test_add_and_remove_grants() {
        let ctx = EventContext::new(EntityType::PermissionAssignment, Operation::Update);
        let payload = json!({
            "targetIdentityId": "ti-1",
            "globalIdentityId": "gi-1",
            "additionalProperties": {"source": "sync"},
            "add": [
                {"id": "a1", "permissionId": "p1", "accessBundleId": "ab1", "granttype": "DIRECT", "validFrom": 10},
                {"id": "a2", "permissionId": "p2"}
            ],
            "remove": [{"id": "a3", "permissionId": "p3"}]
        });

        let rows = PermissionAssignmentTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();

        assert_eq!(rows.len(), 3);
        let ops: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| {
                (
                    r.get_str("permission_id").unwrap(),
                    r.get_str("identity_operation_type").unwrap(),
                )
            })
            .collect();
        assert_eq!(ops, vec![("p1", "add"), ("p2", "add"), ("p3", "remove")]);
        assert_eq!(rows[0].get_str("grant_type"), Some("DIRECT"));
        assert_eq!(rows[0].get("valid_from"), Some(&FieldValue::Float(10.0)));
        assert_eq!(rows[1].get("valid_from"), Some(&FieldValue::Null));
        assert!(rows.iter().all(|r| r.get_str("attributes") == Some(r#"{"source":"sync"}"#)));
    }

    #[test]
    fn test_delete_fans_out_ids() {
        let ctx = EventContext::new(EntityType::PermissionAssignment, Operation::Delete);
        let payload = json!({"targetIdentityId": "ti-1", "ids": ["p1", "p2"]});

        let rows = PermissionAssignmentTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get_str("permission_id"), Some("p2"));
        assert!(rows.iter().all(|r| r.get_str("target_identity_id") == Some("ti-1")));
    }

    #[test]
    fn test_delete_without_ids_is_fatal() {
        let ctx = EventContext::new(EntityType::PermissionAssignment, Operation::Delete);

        for payload in [json!({"targetIdentityId": "ti-1"}), json!({"ids": []})] {
            let err = PermissionAssignmentTransformer
                .transform_raw_event(&ctx, Payload::new(&payload))
                .unwrap_err();
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_update_without_grants() {
        let ctx = EventContext::new(EntityType::PermissionAssignment, Operation::Create);
        let payload = json!({"targetIdentityId": "ti-2"});

        let rows = PermissionAssignmentTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("identity_operation_type"), Some(""));
    }
}
