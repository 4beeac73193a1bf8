//! Access policies, one row per policy rule.

use crate::entity::{EntityError, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::PolicyRow;
use crate::schema::EntityType;
use crate::transformers::common::{expand, prepare, Overwrite};
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct PolicyTransformer;

impl Transformer for PolicyTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::Policy
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut policy = PolicyRow::default();
        policy.stamp(ctx);

        policy.id.overwrite(payload.text("id"));
        policy.name.overwrite(payload.text("name"));
        policy.external_id.overwrite(payload.text("externalId"));
        policy.description.overwrite(payload.text("description"));
        policy.display_name.overwrite(payload.text("displayName"));
        policy.status.overwrite(payload.text("status"));
        policy.is_transformed_policy.overwrite(payload.text("isTransformedPolicy"));
        policy.constraints.overwrite(payload.text("constraints"));
        policy.tags.overwrite(payload.text("tags"));
        policy.policy_type.overwrite(payload.text("policyType"));
        policy.policy_version.overwrite(payload.text("policyVersion"));
        policy.target_id.overwrite(payload.text("targetId"));
        policy.target_policy_id.overwrite(payload.text("targetPolicyId"));
        policy.created_by.overwrite(payload.text("createdBy"));
        policy.created_by_display_name.overwrite(payload.text("createdByRef.displayName"));
        policy.created_by_value.overwrite(payload.text("createdByRef.value"));
        policy.created_by_resource_type.overwrite(payload.text("createdByRef.resourceType"));
        policy.created_on.overwrite(payload.number("createdOn")?);
        policy.updated_by.overwrite(payload.text("updatedBy"));
        policy.updated_by_display_name.overwrite(payload.text("updatedByRef.displayName"));
        policy.updated_by_value.overwrite(payload.text("updatedByRef.value"));
        policy.updated_by_resource_type.overwrite(payload.text("updatedByRef.resourceType"));
        policy.updated_on.overwrite(payload.number("updatedOn")?);
        policy.ag_risk.overwrite(payload.number("agRisk.value")?);
        policy.ag_managed.overwrite(payload.text("agManaged"));
        policy.owner_display_name.overwrite(payload.text("owner.displayName"));
        policy.owner_value.overwrite(payload.text("owner.value"));
        policy.ownership_collection_id
            .overwrite(payload.text_any(&["ownershipCollectionId", "ownerShipCollectionId"]));
        policy.managed_by_ids.overwrite(payload.json("managedByIds"));
        policy.owner_uids.overwrite(payload.json_any(&["ownerUIDs", "ownerUids"]));
        policy.attributes.overwrite(payload.json("customAttributes"));

        let rows = expand(&policy, payload.list("policyRules"), |row, rule| {
            row.policy_rule_id.overwrite(rule.text("id"));
            row.policy_rule_assignment_id.overwrite(rule.text("assignmentId"));
            row.policy_rule_identity_group_id.overwrite(rule.text("identityGroupId"));
            row.policy_rule_parsed_on.overwrite(rule.number("parsedOn")?);
            row.policy_rule_version.overwrite(rule.text("policyRuleVersion"));
            row.policy_rule_action.overwrite(rule.text("ruleAction"));
            row.policy_rule_statement.overwrite(rule.text("ruleStatement"));
            row.policy_rule_status.overwrite(rule.text("ruleStatus"));
            row.policy_rule_type.overwrite(rule.text("ruleType"));
            row.policy_rule_created_by.overwrite(rule.text("createdBy"));
            row.policy_rule_created_on.overwrite(rule.number("createdOn")?);
            row.policy_rule_updated_by.overwrite(rule.text("updatedBy"));
            row.policy_rule_updated_on.overwrite(rule.number("updatedOn")?);
            Ok(())
        })?;

        Ok(prepare(rows))
    }
}
