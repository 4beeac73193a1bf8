use crate::entity::{EntityError, EntityRow, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::ApprovalWorkflowRow;
use crate::schema::EntityType;
use crate::transformers::common::Overwrite;
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct ApprovalWorkflowTransformer;

impl Transformer for ApprovalWorkflowTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::ApprovalWorkflow
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let mut workflow = ApprovalWorkflowRow::default();
        workflow.stamp(ctx);

        workflow.id.overwrite(payload.text("id"));
        workflow.name.overwrite(payload.text("name"));
        workflow.description.overwrite(payload.text("description"));
        workflow.status.overwrite(payload.text("status"));
        workflow.created_by.overwrite(payload.text("createdBy"));
        workflow.created_on.overwrite(payload.number("createdOn")?);
        workflow.updated_by.overwrite(payload.text("updatedBy"));
        workflow.updated_on.overwrite(payload.number("updatedOn")?);
        workflow.version.overwrite(payload.text("version"));
        workflow.etag_version.overwrite(payload.text("etagVersion"));
        workflow.tags.overwrite(payload.text("tags"));
        workflow.summary.overwrite(payload.text("summary"));
        workflow.ownership_collection_id.overwrite(payload.text("ownershipCollectionId"));
        workflow.attributes.overwrite(payload.json("customAttributes"));

        Ok(vec![workflow.into_prepared()])
    }
}
