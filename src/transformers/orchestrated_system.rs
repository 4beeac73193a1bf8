use crate::entity::{EntityError, EntityRow, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::OrchestratedSystemRow;
use crate::schema::EntityType;
use crate::transformers::common::Overwrite;
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct OrchestratedSystemTransformer;

impl Transformer for OrchestratedSystemTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::OrchestratedSystem
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut system = OrchestratedSystemRow::default();
        system.stamp(ctx);

        system.id.overwrite(payload.text("id"));
        system.name.overwrite(payload.text("name"));
        system.system_type.overwrite(payload.text("type"));
        system.state.overwrite(payload.text("state"));
        system.created_by.overwrite(payload.text("createdBy"));
        system.target_mode.overwrite(payload.text("targetMode"));
        system.created_on.overwrite(payload.number("timeCreated")?);
        system.updated_on.overwrite(payload.number("timeUpdated")?);
        system.ownership_collection_id.overwrite(payload.text("ownershipCollectionId"));
        system.primary_owner.overwrite(payload.text("primaryOwner"));
        system.attributes.overwrite(payload.json("customAttributes"));

        Ok(vec![system.into_prepared()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::FieldValue;
    use crate::schema::Operation;
    use serde_json::json;

    #[test]
    fn test_type_column() {
        let ctx = EventContext::new(EntityType::OrchestratedSystem, Operation::Create);
        let payload = json!({"id": "os-1", "type": "ORACLE_DB", "timeCreated": 1700000000000i64});

        let rows = OrchestratedSystemTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();

        assert_eq!(rows[0].get_str("type"), Some("ORACLE_DB"));
        assert_eq!(rows[0].get("created_on"), Some(&FieldValue::Float(1700000000000.0)));
        assert_eq!(rows[0].get("updated_on"), Some(&FieldValue::Null));
    }
}
