//! Transformer registry mapping entity types to their transformers.
//!
//! Lookup is explicit: every built-in transformer is registered by
//! [`TransformerRegistry::with_builtin`]. Unknown or disabled entity types
//! resolve to nothing and contribute zero rows.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::entity::{EntityError, PreparedRow};
use crate::nats::message_envelope::StreamMessage;
use crate::schema::{EntityType, Operation};
use crate::transformers::{
    access_bundle::AccessBundleTransformer, access_guardrail::AccessGuardrailTransformer,
    approval_workflow::ApprovalWorkflowTransformer, audit_events::AuditEventsTransformer,
    cloud_group::CloudGroupTransformer, cloud_policy::CloudPolicyTransformer,
    global_identity_collection::GlobalIdentityCollectionTransformer,
    identity::IdentityTransformer, orchestrated_system::OrchestratedSystemTransformer,
    ownership_collection::OwnershipCollectionTransformer, permission::PermissionTransformer,
    permission_assignment::PermissionAssignmentTransformer, policy::PolicyTransformer,
    policy_statement_resource_mapping::PolicyStatementResourceMappingTransformer,
    resource::ResourceTransformer, role::RoleTransformer, transform_events, EventContext,
    Transformer,
};

/// Builds a transformer instance
pub type TransformerCtor = fn() -> Box<dyn Transformer>;

/// Registry of transformer constructors keyed by entity type
pub struct TransformerRegistry {
    constructors: HashMap<EntityType, TransformerCtor>,
    enabled: Option<BTreeSet<EntityType>>,
}

impl TransformerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
            enabled: None,
        }
    }

    /// Registry holding every built-in transformer
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(EntityType::Identity, || Box::new(IdentityTransformer));
        registry.register(EntityType::CloudGroup, || Box::new(CloudGroupTransformer));
        registry.register(EntityType::CloudPolicy, || Box::new(CloudPolicyTransformer));
        registry.register(EntityType::Resource, || Box::new(ResourceTransformer));
        registry.register(EntityType::PolicyStatementResourceMapping, || {
            Box::new(PolicyStatementResourceMappingTransformer)
        });
        registry.register(EntityType::GlobalIdentityCollection, || {
            Box::new(GlobalIdentityCollectionTransformer)
        });
        registry.register(EntityType::AccessBundle, || Box::new(AccessBundleTransformer));
        registry.register(EntityType::Permission, || Box::new(PermissionTransformer));
        registry.register(EntityType::PermissionAssignment, || {
            Box::new(PermissionAssignmentTransformer)
        });
        registry.register(EntityType::Policy, || Box::new(PolicyTransformer));
        registry.register(EntityType::Role, || Box::new(RoleTransformer));
        registry.register(EntityType::AccessGuardrail, || Box::new(AccessGuardrailTransformer));
        registry.register(EntityType::ApprovalWorkflow, || Box::new(ApprovalWorkflowTransformer));
        registry.register(EntityType::OwnershipCollection, || {
            Box::new(OwnershipCollectionTransformer)
        });
        registry.register(EntityType::OrchestratedSystem, || {
            Box::new(OrchestratedSystemTransformer)
        });
        registry.register(EntityType::AuditEvents, || Box::new(AuditEventsTransformer));
        registry
    }

    /// Register (or replace) the constructor for an entity type
    pub fn register(&mut self, entity_type: EntityType, ctor: TransformerCtor) {
        self.constructors.insert(entity_type, ctor);
    }

    /// Limit resolution to the given entity types
    pub fn restrict(mut self, allowed: impl IntoIterator<Item = EntityType>) -> Self {
        self.enabled = Some(allowed.into_iter().collect());
        self
    }

    fn is_enabled(&self, entity_type: EntityType) -> bool {
        self.enabled
            .as_ref()
            .map_or(true, |enabled| enabled.contains(&entity_type))
    }

    /// Resolve the transformer for an entity type and operation.
    ///
    /// All operations of one entity type share a transformer; the operation
    /// only reaches it through the [`EventContext`].
    pub fn resolve(
        &self,
        entity_type: EntityType,
        operation: Operation,
    ) -> Option<Box<dyn Transformer>> {
        if !self.is_enabled(entity_type) {
            tracing::warn!("Entity type {} is not enabled, skipping {}", entity_type, operation);
            return None;
        }
        match self.constructors.get(&entity_type) {
            Some(ctor) => Some(ctor()),
            None => {
                tracing::error!("No transformer registered for {} {}", entity_type, operation);
                None
            }
        }
    }

    /// Resolve by wire names; unknown names are logged and resolve to nothing
    pub fn resolve_name(&self, entity_type: &str, operation: &str) -> Option<Box<dyn Transformer>> {
        let parsed = entity_type
            .parse::<EntityType>()
            .and_then(|e| operation.parse::<Operation>().map(|o| (e, o)));
        match parsed {
            Ok((entity_type, operation)) => self.resolve(entity_type, operation),
            Err(e) => {
                tracing::error!("Cannot resolve transformer: {}", e);
                None
            }
        }
    }

    /// Transform a group of raw payloads sharing one context.
    ///
    /// An unresolvable entity type yields no rows.
    pub fn transform<'a, I>(&self, ctx: &EventContext, events: I) -> Result<Vec<PreparedRow>, EntityError>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let Some(transformer) = self.resolve(ctx.entity_type, ctx.operation) else {
            return Ok(Vec::new());
        };
        let rows = transform_events(transformer.as_ref(), ctx, events)?;
        Ok(transformer.clean(rows))
    }

    /// Transform a group of decoded stream messages sharing one entity type and operation
    pub fn transform_messages(
        &self,
        ctx: &EventContext,
        messages: &[StreamMessage],
    ) -> Result<Vec<PreparedRow>, EntityError> {
        let Some(transformer) = self.resolve(ctx.entity_type, ctx.operation) else {
            return Ok(Vec::new());
        };
        let mut rows = Vec::new();
        for message in messages {
            match transformer.transform_stream_message(ctx, message) {
                Ok(mut message_rows) => rows.append(&mut message_rows),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::error!("Skipping {} message: {}", ctx.entity_type, e),
            }
        }
        Ok(transformer.clean(rows))
    }

    /// Check if a transformer is registered and enabled
    pub fn has_transformer(&self, entity_type: EntityType) -> bool {
        self.constructors.contains_key(&entity_type) && self.is_enabled(entity_type)
    }

    /// Registered and enabled entity types, sorted
    pub fn entity_types(&self) -> Vec<EntityType> {
        let mut types: Vec<EntityType> = self
            .constructors
            .keys()
            .copied()
            .filter(|t| self.is_enabled(*t))
            .collect();
        types.sort();
        types
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::message_envelope::MessageHeaders;
    use serde_json::json;

    #[test]
    fn test_builtin_covers_every_entity_type() {
        let registry = TransformerRegistry::with_builtin();

        for entity_type in EntityType::GOVERNED {
            let transformer = registry.resolve(entity_type, Operation::Create).unwrap();
            assert_eq!(transformer.entity_type(), entity_type);
        }
        assert!(registry.has_transformer(EntityType::AuditEvents));
    }

    #[test]
    fn test_unknown_name_resolves_to_nothing() {
        let registry = TransformerRegistry::with_builtin();

        assert!(registry.resolve_name("TENANT", "CREATE").is_none());
        assert!(registry.resolve_name("ROLE", "UPSERT").is_none());
        assert!(registry.resolve_name("role", "create").is_some());
    }

    #[test]
    fn test_restricted_registry() {
        let registry = TransformerRegistry::with_builtin().restrict([EntityType::Role]);

        assert!(registry.resolve(EntityType::Identity, Operation::Update).is_none());
        assert_eq!(registry.entity_types(), vec![EntityType::Role]);

        let ctx = EventContext::new(EntityType::Identity, Operation::Update);
        let events = [json!({"globalIdentity": {"id": "g.USER.1"}})];
        let rows = registry.transform(&ctx, events.iter()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_transform_group() {
        let registry = TransformerRegistry::with_builtin();
        let ctx = EventContext::new(EntityType::Role, Operation::Create).with_tenancy("ten");
        let events = [
            json!({"id": "r1", "accessBundleIds": ["a", "b"]}),
            json!({"id": "r2"}),
        ];

        let rows = registry.transform(&ctx, events.iter()).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.get_str("tenancy_id") == Some("ten")));
    }

    #[test]
    fn test_transform_messages() {
        let registry = TransformerRegistry::with_builtin();
        let ctx = EventContext::new(EntityType::Permission, Operation::Update);
        let headers = MessageHeaders {
            message_type: Some("PERMISSION".to_string()),
            operation: Some("UPDATE".to_string()),
            tenancy_id: Some("ten-1".to_string()),
            ..Default::default()
        };
        let messages = vec![
            StreamMessage::new(headers.clone(), json!([{"id": "p1"}, {"id": "p2"}])),
            StreamMessage::new(headers, json!({"id": "p3"})),
        ];

        let rows = registry.transform_messages(&ctx, &messages).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.get_str("id").unwrap()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
        assert!(rows.iter().all(|r| r.get_str("tenancy_id") == Some("ten-1")));
    }
}
