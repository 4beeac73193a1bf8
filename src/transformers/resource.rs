use crate::entity::{EntityError, EntityRow, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::ResourceRow;
use crate::schema::EntityType;
use crate::transformers::common::Overwrite;
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct ResourceTransformer;

impl Transformer for ResourceTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::Resource
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut resource = ResourceRow::default();
        resource.stamp(ctx);

        resource.id.overwrite(payload.text("id"));
        resource.description.overwrite(payload.text("description"));
        resource.external_id.overwrite(payload.text("externalId"));
        resource.resource_name.overwrite(payload.text("resourceName"));
        resource.resource_type.overwrite(payload.text("resourceType"));
        resource.target_id.overwrite(payload.text("targetId"));
        // resources may belong to a tenancy other than the envelope's
        resource.tenancy_id.overwrite(payload.text("tenancyId"));
        resource.attributes.overwrite(payload.json("customAttributes"));

        Ok(vec![resource.into_prepared()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Operation;
    use serde_json::json;

    #[test]
    fn test_payload_tenancy_wins() {
        let ctx = EventContext::new(EntityType::Resource, Operation::Create).with_tenancy("envelope");
        let payload = json!({"id": "res-1", "resourceType": "bucket", "tenancyId": "owner"});

        let rows = ResourceTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();
        assert_eq!(rows[0].get_str("tenancy_id"), Some("owner"));
        assert_eq!(rows[0].get_str("resource_type"), Some("bucket"));

        let payload = json!({"id": "res-2"});
        let rows = ResourceTransformer
            .transform_raw_event(&ctx, Payload::new(&payload))
            .unwrap();
        assert_eq!(rows[0].get_str("tenancy_id"), Some("envelope"));
    }
}
