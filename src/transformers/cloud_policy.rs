//! Cloud policy statements, fanned out over resource types and subjects.

use crate::entity::{EntityError, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::CloudPolicyRow;
use crate::schema::EntityType;
use crate::transformers::common::{cartesian, prepare, Overwrite};
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct CloudPolicyTransformer;

impl Transformer for CloudPolicyTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::CloudPolicy
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut statement = CloudPolicyRow::default();
        statement.stamp(ctx);

        // deletes identify the statement itself
        if ctx.is_delete() {
            statement.policy_statement_id.overwrite(payload.text("id"));
        } else {
            statement.id.overwrite(payload.text("id"));
            statement.policy_statement_id.overwrite(payload.text("policyStatementId"));
        }
        statement.compartment_id.overwrite(payload.text("compartmentId"));
        statement.description.overwrite(payload.text("description"));
        statement.external_id.overwrite(payload.text("externalId"));
        statement.location.overwrite(payload.text("location.compartment"));
        statement.name.overwrite(payload.text("name"));
        statement.statement.overwrite(payload.text("statement"));
        statement.target_id.overwrite(payload.text("targetId"));
        statement.verb.overwrite(payload.text("verb"));
        statement.attributes.overwrite(payload.json("customAttributes"));

        let rows = cartesian(
            &statement,
            payload.list("resourceTypes"),
            payload.list("subjects"),
            |row, resource_type| {
                row.resource_type.overwrite(resource_type.as_text());
                Ok(())
            },
            |row, subject| {
                row.subject_id.overwrite(subject.text("id"));
                row.subject_name.overwrite(subject.text("name"));
                row.subject_type.overwrite(subject.text("type"));
                Ok(())
            },
        )?;

        Ok(prepare(rows))
    }
}
