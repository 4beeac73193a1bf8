use crate::entity::{EntityError, EntityRow, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::OwnershipCollectionRow;
use crate::schema::EntityType;
use crate::transformers::common::Overwrite;
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct OwnershipCollectionTransformer;

impl Transformer for OwnershipCollectionTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::OwnershipCollection
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut collection = OwnershipCollectionRow::default();
        collection.stamp(ctx);

        // live events reference the collection, deletes name it directly
        let id_field = if ctx.is_delete() { "id" } else { "ownershipCollectionId" };
        collection.id.overwrite(payload.text(id_field));
        collection.entity_id.overwrite(payload.text("entityId"));
        collection.entity_name.overwrite(payload.text("entityName"));
        collection.is_primary.overwrite(payload.text("isPrimary"));
        collection.external_id.overwrite(payload.text("externalId"));
        collection.resource_name.overwrite(payload.text("usageName"));
        collection.created_on.overwrite(payload.number("timeCreated")?);
        collection.updated_on.overwrite(payload.number("lastModified")?);
        collection.attributes.overwrite(payload.json("customAttributes"));

        Ok(vec![collection.into_prepared()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Operation;
    use serde_json::json;

    #[test]
    fn test_id_source_depends_on_operation() {
        let payload = json!({"id": "link-1", "ownershipCollectionId": "oc-1", "usageName": "db"});

        let ctx = EventContext::new(EntityType::OwnershipCollection, Operation::Create);
        let rows = OwnershipCollectionTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();
        assert_eq!(rows[0].get_str("id"), Some("oc-1"));
        assert_eq!(rows[0].get_str("resource_name"), Some("db"));

        let ctx = EventContext::new(EntityType::OwnershipCollection, Operation::Delete);
        let rows = OwnershipCollectionTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();
        assert_eq!(rows[0].get_str("id"), Some("link-1"));
    }
}
