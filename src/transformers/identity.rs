//! Global identities with their target identities.

use crate::entity::{EntityError, PreparedRow};
use crate::extraction::Payload;
use crate::schema::tables::IdentityRow;
use crate::schema::EntityType;
use crate::transformers::common::{expand, id_segment, prepare, Overwrite};
use crate::transformers::{EventContext, Stamp, Transformer};

pub struct IdentityTransformer;

impl Transformer for IdentityTransformer {
    fn entity_type(&self) -> EntityType {
        EntityType::Identity
    }

    fn transform_raw_event(
        &self,
        ctx: &EventContext,
        payload: Payload<'_>,
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let global = payload.require("globalIdentity")?;

        let mut identity = IdentityRow::default();
        identity.stamp(ctx);

        if let Some(id) = global.text("id") {
            identity.identity_type.overwrite(id_segment(&id, 1));
            identity.id = id;
        }

        let Some(details) = global.object("identity") else {
            if ctx.is_delete() && !identity.id.is_empty() {
                return Ok(prepare(vec![identity]));
            }
            tracing::info!(id = %identity.id, "Skipping event - orphaned target identities");
            return Ok(Vec::new());
        };

        identity.ag_status.overwrite(details.text("agStatus"));
        identity.ag_sub_type.overwrite(details.text("agSubType"));
        identity.display_name.overwrite(details.text("displayName"));
        identity.location.overwrite(details.text("location"));
        identity.risk.overwrite(details.number("agRisk.value")?);
        identity.ag_risk_attributes.overwrite(details.json("agRisk.customAttributes"));
        identity.status.overwrite(details.text("status"));
        identity.username.overwrite(details.text("userName"));
        identity.last_name.overwrite(details.text("name.familyName"));
        identity.first_name.overwrite(details.text("name.givenName"));
        identity.identity_attributes = details.value().to_string();

        let targets = global.list("targetIdentities");
        if targets.is_some() {
            identity.ti_operation_type = ctx.operation.as_str().to_string();
        }

        let rows = expand(&identity, targets, |row, ti| {
            row.ti_event_timestamp.overwrite(ctx.event_timestamp.clone());
            row.ti_external_id.overwrite(ti.text("externalId"));
            row.ti_id.overwrite(ti.text("id"));
            row.ti_target_id.overwrite(ti.text("targetId"));
            row.ti_domain_id.overwrite(ti.text("domainId"));
            if let Some(target) = ti.object("identity") {
                row.ti_attributes = target.value().to_string();
                row.ti_identity_status.overwrite(target.text("status"));
                row.ti_identity_name.overwrite(target.json("name"));
            }
            Ok(())
        })?;

        Ok(prepare(rows))
    }

    /// Rows without a global identity id cannot be keyed
    fn clean(&self, rows: Vec<PreparedRow>) -> Vec<PreparedRow> {
        rows.into_iter()
            .filter(|row| row.get_str("id").map(|id| !id.is_empty()).unwrap_or(false))
            .collect()
    }
}
