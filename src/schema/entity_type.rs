//! Entity types and event operations.

use std::fmt;
use std::str::FromStr;

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

use crate::entity::EntityError;

/// A governed-resource category with its own relational schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Identity,
    CloudGroup,
    CloudPolicy,
    Resource,
    PolicyStatementResourceMapping,
    GlobalIdentityCollection,
    AccessBundle,
    Permission,
    PermissionAssignment,
    Policy,
    Role,
    AccessGuardrail,
    ApprovalWorkflow,
    OwnershipCollection,
    OrchestratedSystem,
    AuditEvents,
}

impl EntityType {
    /// Every entity type handled by the governance pipelines (audit events excluded)
    pub const GOVERNED: [EntityType; 15] = [
        EntityType::Identity,
        EntityType::CloudGroup,
        EntityType::CloudPolicy,
        EntityType::Resource,
        EntityType::PolicyStatementResourceMapping,
        EntityType::GlobalIdentityCollection,
        EntityType::AccessBundle,
        EntityType::Permission,
        EntityType::PermissionAssignment,
        EntityType::Policy,
        EntityType::Role,
        EntityType::AccessGuardrail,
        EntityType::ApprovalWorkflow,
        EntityType::OwnershipCollection,
        EntityType::OrchestratedSystem,
    ];

    /// Wire name as carried in `headers.messageType`
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Identity => "IDENTITY",
            EntityType::CloudGroup => "CLOUD_GROUP",
            EntityType::CloudPolicy => "CLOUD_POLICY",
            EntityType::Resource => "RESOURCE",
            EntityType::PolicyStatementResourceMapping => "POLICY_STATEMENT_RESOURCE_MAPPING",
            EntityType::GlobalIdentityCollection => "GLOBAL_IDENTITY_COLLECTION",
            EntityType::AccessBundle => "ACCESS_BUNDLE",
            EntityType::Permission => "PERMISSION",
            EntityType::PermissionAssignment => "PERMISSION_ASSIGNMENT",
            EntityType::Policy => "POLICY",
            EntityType::Role => "ROLE",
            EntityType::AccessGuardrail => "ACCESS_GUARDRAIL",
            EntityType::ApprovalWorkflow => "APPROVAL_WORKFLOW",
            EntityType::OwnershipCollection => "OWNERSHIP_COLLECTION",
            EntityType::OrchestratedSystem => "ORCHESTRATED_SYSTEM",
            EntityType::AuditEvents => "AUDIT_EVENTS",
        }
    }

    /// Lower snake-case stem used for table names (`identity`, `cloud_group`, ...)
    pub fn table_stem(&self) -> String {
        self.as_str().to_lowercase()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = EntityError;

    /// Accepts the wire name or any casing of it (`cloudGroup`, `cloud-group`, ...)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_case(Case::UpperSnake);
        EntityType::GOVERNED
            .iter()
            .chain(std::iter::once(&EntityType::AuditEvents))
            .find(|t| t.as_str() == normalized)
            .copied()
            .ok_or_else(|| EntityError::UnknownEntityType(s.to_string()))
    }
}

/// Change operation carried in `headers.operation`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Operation::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operation {
    type Err = EntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CREATE" => Ok(Operation::Create),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            _ => Err(EntityError::UnknownOperation(s.to_string())),
        }
    }
}
