use crate::entity::{EntityError, EntityRow, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::PermissionRow;
use crate::schema::EntityType;
use crate::transformers::common::Overwrite;
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct PermissionTransformer;

impl Transformer for PermissionTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::Permission
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut permission = PermissionRow::default();
        permission.stamp(ctx);

        permission.id.overwrite(payload.text("id"));
        permission.external_id.overwrite(payload.text("externalId"));
        permission.name.overwrite(payload.text("name"));
        permission.description.overwrite(payload.text("description"));
        permission.display_name.overwrite(payload.text("displayName"));
        permission.permission_type_id.overwrite(payload.text("permissionTypeId"));
        permission.resource_id.overwrite(payload.text("resourceId"));
        permission.resource_name.overwrite(payload.text("resourceName"));
        permission.risk_level.overwrite(payload.text("riskLevel"));
        permission.status.overwrite(payload.text("status"));
        permission.target_id.overwrite(payload.text("targetId"));
        permission.user_defined_tags.overwrite(payload.json("userDefinedTags"));
        permission.owner_display_name.overwrite(payload.text("owner.displayName"));
        permission.owner_value.overwrite(payload.text("owner.value"));
        permission.attributes.overwrite(payload.json("customAttributes"));

        Ok(vec![permission.into_prepared()])
    }
}
