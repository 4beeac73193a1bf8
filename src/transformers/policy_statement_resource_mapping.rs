//! Policy statement to resource mappings.

use crate::entity::{EntityError, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::PolicyStatementResourceMappingRow;
use crate::schema::EntityType;
use crate::transformers::common::{expand, prepare, Overwrite};
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct PolicyStatementResourceMappingTransformer;

impl Transformer for PolicyStatementResourceMappingTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::PolicyStatementResourceMapping
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut mapping = PolicyStatementResourceMappingRow::default();
        mapping.stamp(ctx);

        mapping.id.overwrite(payload.text("id"));
        mapping.compartment_id.overwrite(payload.text("compartmentId"));
        mapping.policy_external_id.overwrite(payload.text("externalId"));
        mapping.policy_statement_id.overwrite(payload.text("policyStatementId"));
        mapping.target_id.overwrite(payload.text("targetId"));
        mapping.attributes.overwrite(payload.json("customAttributes"));

        let rows = expand(&mapping, payload.list("resources"), |row, resource| {
            row.resource_id.overwrite(resource.text("id"));
            row.resource_external_id.overwrite(resource.text("externalId"));
            Ok(())
        })?;

        Ok(prepare(rows))
    }
}
