//! Typed rows and table layouts for every entity type.

use crate::entity::EntityRow;
use crate::entity_row;
use crate::schema::{ColumnDef, DeleteKey, EntityType};

/// Static layout shared by an entity's history and state tables
#[derive(Debug)]
pub struct TableSpec {
    pub entity_type: EntityType,
    pub columns: &'static [ColumnDef],
    /// Uniqueness key of the state table
    pub unique_key: &'static [&'static str],
    pub delete_key: DeleteKey,
    /// Membership-operation column routing `remove` rows to deletes
    pub removal_column: Option<&'static str>,
    /// Whether a state table exists next to the history table
    pub state_table: bool,
}

const SCOPE: &[&str] = &["id", "service_instance_id", "tenancy_id"];

entity_row! {
    pub struct IdentityRow {
        id: Text,
        ag_status: Text,
        ag_sub_type: Text,
        display_name: Text,
        location: Text,
        risk: Number,
        ag_risk_attributes: Json,
        status: Text,
        username: Text,
        last_name: Text,
        first_name: Text,
        identity_attributes: Json,
        ti_external_id: Text,
        ti_id: Text,
        ti_target_id: Text,
        ti_domain_id: Text,
        ti_identity_name: Text,
        ti_identity_status: Text,
        ti_operation_type: Text,
        ti_event_timestamp: Timestamp,
        ti_attributes: Json,
        identity_type: Text,
    }
}

pub static IDENTITY: TableSpec = TableSpec {
    entity_type: EntityType::Identity,
    columns: IdentityRow::COLUMNS,
    unique_key: &["id", "ti_id", "service_instance_id", "tenancy_id"],
    delete_key: DeleteKey::of(SCOPE),
    removal_column: None,
    state_table: true,
};

entity_row! {
    pub struct CloudGroupRow {
        id: Text,
        external_id: Text,
        target_id: Text,
        compartment_id: Text,
        name: Text,
        domain_id: Text,
        identity_operation_type: Text,
        identity_external_id: Text,
        identity_global_id: Text,
        identity_target_identity_id: Text,
        group_membership_type: Text,
        attributes: Json,
    }
}

pub static CLOUD_GROUP: TableSpec = TableSpec {
    entity_type: EntityType::CloudGroup,
    columns: CloudGroupRow::COLUMNS,
    unique_key: &[
        "id",
        "identity_global_id",
        "identity_target_identity_id",
        "target_id",
        "service_instance_id",
        "tenancy_id",
    ],
    delete_key: DeleteKey::with_optional(SCOPE, "identity_global_id"),
    removal_column: Some("identity_operation_type"),
    state_table: true,
};

entity_row! {
    pub struct CloudPolicyRow {
        id: Text,
        compartment_id: Text,
        description: Text,
        external_id: Text,
        location: Text,
        name: Text,
        policy_statement_id: Text,
        resource_type: Text,
        statement: Text,
        subject_id: Text,
        subject_name: Text,
        subject_type: Text,
        target_id: Text,
        verb: Text,
        attributes: Json,
    }
}

pub static CLOUD_POLICY: TableSpec = TableSpec {
    entity_type: EntityType::CloudPolicy,
    columns: CloudPolicyRow::COLUMNS,
    unique_key: &["id", "policy_statement_id", "service_instance_id", "tenancy_id"],
    delete_key: DeleteKey::of(&["policy_statement_id", "service_instance_id", "tenancy_id"]),
    removal_column: None,
    state_table: true,
};

entity_row! {
    pub struct ResourceRow {
        id: Text,
        description: Text,
        external_id: Text,
        resource_name: Text,
        resource_type: Text,
        target_id: Text,
        attributes: Json,
    }
}

pub static RESOURCE: TableSpec = TableSpec {
    entity_type: EntityType::Resource,
    columns: ResourceRow::COLUMNS,
    unique_key: SCOPE,
    delete_key: DeleteKey::of(SCOPE),
    removal_column: None,
    state_table: true,
};

entity_row! {
    pub struct PolicyStatementResourceMappingRow {
        id: Text,
        compartment_id: Text,
        policy_external_id: Text,
        policy_statement_id: Text,
        resource_id: Text,
        resource_external_id: Text,
        target_id: Text,
        attributes: Json,
    }
}

pub static POLICY_STATEMENT_RESOURCE_MAPPING: TableSpec = TableSpec {
    entity_type: EntityType::PolicyStatementResourceMapping,
    columns: PolicyStatementResourceMappingRow::COLUMNS,
    unique_key: &[
        "id",
        "policy_statement_id",
        "resource_id",
        "service_instance_id",
        "tenancy_id",
    ],
    delete_key: DeleteKey::of(SCOPE),
    removal_column: None,
    state_table: true,
};

entity_row! {
    pub struct GlobalIdentityCollectionRow {
        id: Text,
        name: Text,
        display_name: Text,
        member_operation_type: Text,
        member_global_id: Text,
        membership_type: Text,
        external_id: Text,
        target_id: Text,
        identity_collection_description: Text,
        risk: Number,
        identity_collection_type: Text,
        is_managed_at_target: Text,
        status: Text,
        created_by: Text,
        created_by_display_name: Text,
        created_by_value: Text,
        created_by_resource_type: Text,
        created_on: Number,
        updated_by: Text,
        updated_by_display_name: Text,
        updated_by_value: Text,
        updated_by_resource_type: Text,
        updated_on: Number,
        ag_managed: Text,
        owner_display_name: Text,
        owner_value: Text,
        ownership_collection_id: Text,
        tags: Text,
        managed_by_ids: JsonList,
        owner_uids: JsonList,
        access_guardrail_ids: JsonList,
        attributes: Json,
    }
}

pub static GLOBAL_IDENTITY_COLLECTION: TableSpec = TableSpec {
    entity_type: EntityType::GlobalIdentityCollection,
    columns: GlobalIdentityCollectionRow::COLUMNS,
    unique_key: &["id", "member_global_id", "service_instance_id", "tenancy_id"],
    delete_key: DeleteKey::with_optional(SCOPE, "member_global_id"),
    removal_column: Some("member_operation_type"),
    state_table: true,
};

entity_row! {
    pub struct AccessBundleRow {
        id: Text,
        external_id: Text,
        name: Text,
        description: Text,
        display_name: Text,
        requestable_by: Text,
        status: Text,
        approval_workflow_id: Text,
        approval_workflow_name: Text,
        approval_workflow_description: Text,
        access_guardrail_ids: JsonList,
        target_id: Text,
        tags: Text,
        access_bundle_type: Text,
        permission_id: Text,
        permission_ids: JsonList,
        created_by: Text,
        created_by_display_name: Text,
        created_by_value: Text,
        created_by_resource_type: Text,
        created_on: Number,
        updated_by: Text,
        updated_by_display_name: Text,
        updated_by_value: Text,
        updated_by_resource_type: Text,
        updated_on: Number,
        ag_managed: Text,
        owner_display_name: Text,
        owner_value: Text,
        ownership_collection_id: Text,
        managed_by_ids: JsonList,
        owner_uids: JsonList,
        account_profile_exists: Text,
        account_profile_id: Text,
        account_profile_name: Text,
        auto_approval_if_no_violation: Text,
        access_limit_type: Text,
        expiration_time: Number,
        notification_time: Number,
        extension_time: Number,
        extension_approval_workflow_id: Text,
        extension_approval_workflow_name: Text,
        extension_approval_workflow_description: Text,
        attributes: Json,
    }
}

pub static ACCESS_BUNDLE: TableSpec = TableSpec {
    entity_type: EntityType::AccessBundle,
    columns: AccessBundleRow::COLUMNS,
    unique_key: &["id", "permission_id", "service_instance_id", "tenancy_id"],
    delete_key: DeleteKey::of(SCOPE),
    removal_column: None,
    state_table: true,
};

entity_row! {
    pub struct PermissionRow {
        id: Text,
        external_id: Text,
        name: Text,
        description: Text,
        display_name: Text,
        permission_type_id: Text,
        resource_id: Text,
        resource_name: Text,
        risk_level: Text,
        status: Text,
        target_id: Text,
        user_defined_tags: Json,
        owner_display_name: Text,
        owner_value: Text,
        attributes: Json,
    }
}

pub static PERMISSION: TableSpec = TableSpec {
    entity_type: EntityType::Permission,
    columns: PermissionRow::COLUMNS,
    unique_key: SCOPE,
    delete_key: DeleteKey::of(SCOPE),
    removal_column: None,
    state_table: true,
};

entity_row! {
    pub struct PermissionAssignmentRow {
        target_identity_id: Text,
        global_identity_id: Text,
        identity_operation_type: Text,
        assignment_id: Text,
        external_id: Text,
        target_id: Text,
        target_type: Text,
        grant_type: Text,
        permission_type: Text,
        permission_id: Text,
        permission_name: Text,
        access_bundle_id: Text,
        access_bundle_name: Text,
        role_id: Text,
        role_name: Text,
        identity_group_id: Text,
        identity_group_name: Text,
        resource_id: Text,
        resource_display_name: Text,
        policy_id: Text,
        policy_name: Text,
        policy_rule_id: Text,
        user_login: Text,
        valid_from: Number,
        valid_to: Number,
        assignment_attributes: Json,
        attributes: Json,
    }
}

pub static PERMISSION_ASSIGNMENT: TableSpec = TableSpec {
    entity_type: EntityType::PermissionAssignment,
    columns: PermissionAssignmentRow::COLUMNS,
    unique_key: &[
        "target_identity_id",
        "permission_id",
        "access_bundle_id",
        "service_instance_id",
        "tenancy_id",
    ],
    delete_key: DeleteKey::with_optional(
        &["target_identity_id", "service_instance_id", "tenancy_id"],
        "permission_id",
    ),
    removal_column: Some("identity_operation_type"),
    state_table: true,
};

entity_row! {
    pub struct PolicyRow {
        id: Text,
        name: Text,
        external_id: Text,
        description: Text,
        display_name: Text,
        status: Text,
        is_transformed_policy: Text,
        constraints: Text,
        tags: Text,
        policy_type: Text,
        policy_version: Text,
        target_id: Text,
        target_policy_id: Text,
        policy_rule_id: Text,
        policy_rule_assignment_id: Text,
        policy_rule_identity_group_id: Text,
        policy_rule_parsed_on: Number,
        policy_rule_version: Text,
        policy_rule_action: Text,
        policy_rule_statement: Text,
        policy_rule_status: Text,
        policy_rule_type: Text,
        policy_rule_created_by: Text,
        policy_rule_created_on: Number,
        policy_rule_updated_by: Text,
        policy_rule_updated_on: Number,
        created_by: Text,
        created_by_display_name: Text,
        created_by_resource_type: Text,
        created_by_value: Text,
        created_on: Number,
        updated_by: Text,
        updated_by_display_name: Text,
        updated_by_resource_type: Text,
        updated_by_value: Text,
        updated_on: Number,
        ag_risk: Number,
        ag_managed: Text,
        owner_display_name: Text,
        owner_value: Text,
        ownership_collection_id: Text,
        managed_by_ids: JsonList,
        owner_uids: JsonList,
        attributes: Json,
    }
}

pub static POLICY: TableSpec = TableSpec {
    entity_type: EntityType::Policy,
    columns: PolicyRow::COLUMNS,
    unique_key: &["id", "policy_rule_id", "service_instance_id", "tenancy_id"],
    delete_key: DeleteKey::of(SCOPE),
    removal_column: None,
    state_table: true,
};

entity_row! {
    pub struct RoleRow {
        id: Text,
        external_id: Text,
        name: Text,
        description: Text,
        requestable_by: Text,
        status: Text,
        approval_workflow_id: Text,
        approval_workflow_name: Text,
        approval_workflow_description: Text,
        access_bundle_id: Text,
        created_by: Text,
        created_on: Number,
        updated_by: Text,
        updated_on: Number,
        ag_managed: Text,
        owner_display_name: Text,
        owner_value: Text,
        ownership_collection_id: Text,
        managed_by_ids: JsonList,
        owner_uids: JsonList,
        attributes: Json,
    }
}

pub static ROLE: TableSpec = TableSpec {
    entity_type: EntityType::Role,
    columns: RoleRow::COLUMNS,
    unique_key: &["id", "access_bundle_id", "service_instance_id", "tenancy_id"],
    delete_key: DeleteKey::of(SCOPE),
    removal_column: None,
    state_table: true,
};

entity_row! {
    pub struct AccessGuardrailRow {
        id: Text,
        external_id: Text,
        name: Text,
        description: Text,
        action_on_failure_action_type: Text,
        action_on_failure_revoke_after_number_of_days: Integer,
        action_on_failure_risk: Text,
        action_on_failure_should_user_manager_be_notified: Text,
        created_by_display_name: Text,
        created_by_resource_type: Text,
        created_by_value: Text,
        created_on: Number,
        etag: Text,
        is_detective_violation_check_enabled: Text,
        lifecycle_state: Text,
        owner_display_name: Text,
        owner_value: Text,
        ownership_collection_id: Text,
        rules: JsonList,
        tags: Text,
        updated_by_display_name: Text,
        updated_by_resource_type: Text,
        updated_by_value: Text,
        updated_on: Number,
        attributes: Json,
    }
}

pub static ACCESS_GUARDRAIL: TableSpec = TableSpec {
    entity_type: EntityType::AccessGuardrail,
    columns: AccessGuardrailRow::COLUMNS,
    unique_key: SCOPE,
    delete_key: DeleteKey::of(SCOPE),
    removal_column: None,
    state_table: true,
};

entity_row! {
    pub struct ApprovalWorkflowRow {
        id: Text,
        name: Text,
        description: Text,
        status: Text,
        created_by: Text,
        created_on: Number,
        updated_by: Text,
        updated_on: Number,
        version: Text,
        etag_version: Text,
        tags: Text,
        summary: Text,
        ownership_collection_id: Text,
        attributes: Json,
    }
}

pub static APPROVAL_WORKFLOW: TableSpec = TableSpec {
    entity_type: EntityType::ApprovalWorkflow,
    columns: ApprovalWorkflowRow::COLUMNS,
    unique_key: SCOPE,
    delete_key: DeleteKey::of(SCOPE),
    removal_column: None,
    state_table: true,
};

entity_row! {
    pub struct OwnershipCollectionRow {
        id: Text,
        entity_id: Text,
        entity_name: Text,
        is_primary: Text,
        external_id: Text,
        resource_name: Text,
        created_on: Number,
        updated_on: Number,
        attributes: Json,
    }
}

pub static OWNERSHIP_COLLECTION: TableSpec = TableSpec {
    entity_type: EntityType::OwnershipCollection,
    columns: OwnershipCollectionRow::COLUMNS,
    unique_key: &["id", "entity_id", "service_instance_id", "tenancy_id"],
    delete_key: DeleteKey::of(SCOPE),
    removal_column: None,
    state_table: true,
};

entity_row! {
    pub struct OrchestratedSystemRow {
        id: Text,
        name: Text,
        system_type: Text = "type",
        state: Text,
        created_by: Text,
        created_on: Number,
        updated_on: Number,
        target_mode: Text,
        ownership_collection_id: Text,
        primary_owner: Text,
        attributes: Json,
    }
}

pub static ORCHESTRATED_SYSTEM: TableSpec = TableSpec {
    entity_type: EntityType::OrchestratedSystem,
    columns: OrchestratedSystemRow::COLUMNS,
    unique_key: SCOPE,
    delete_key: DeleteKey::of(SCOPE),
    removal_column: None,
    state_table: true,
};

entity_row! {
    pub struct AuditEventRow {
        source: Text,
        audit_event_type: Text,
        audit_event_type_version: Text,
        content_type: Text,
        region: Text,
        availability_domain: Text,
        identity_host: Text,
        identity_user_agent: Text,
        identity_principal_id: Text,
        request_time: Text,
        request_id: Text,
        request_path: Text,
        request_action: Text,
        request_parameters: Json,
        request_headers: Json,
        request_payload: Json,
        response_time: Text,
        response_status: Text,
        response_headers: Json,
        response_payload: Json,
        state_change: Json,
        attributes: Json,
    }
}

pub static AUDIT_EVENTS: TableSpec = TableSpec {
    entity_type: EntityType::AuditEvents,
    columns: AuditEventRow::COLUMNS,
    unique_key: &[],
    delete_key: DeleteKey::of(&[]),
    removal_column: None,
    state_table: false,
};

pub static ALL_SPECS: [&TableSpec; 16] = [
    &IDENTITY,
    &CLOUD_GROUP,
    &CLOUD_POLICY,
    &RESOURCE,
    &POLICY_STATEMENT_RESOURCE_MAPPING,
    &GLOBAL_IDENTITY_COLLECTION,
    &ACCESS_BUNDLE,
    &PERMISSION,
    &PERMISSION_ASSIGNMENT,
    &POLICY,
    &ROLE,
    &ACCESS_GUARDRAIL,
    &APPROVAL_WORKFLOW,
    &OWNERSHIP_COLLECTION,
    &ORCHESTRATED_SYSTEM,
    &AUDIT_EVENTS,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_columns_appended() {
        let names: Vec<&str> = CloudGroupRow::COLUMNS.iter().map(|c| c.name).collect();
        let tail = &names[names.len() - 5..];
        assert_eq!(
            tail,
            &[
                "event_object_type",
                "operation_type",
                "tenancy_id",
                "service_instance_id",
                "event_timestamp"
            ]
        );
    }

    #[test]
    fn test_renamed_column() {
        assert!(OrchestratedSystemRow::COLUMNS.iter().any(|c| c.name == "type"));
        let row = OrchestratedSystemRow {
            system_type: "DISCONNECTED".to_string(),
            ..Default::default()
        };
        assert_eq!(row.into_prepared().get_str("type"), Some("DISCONNECTED"));
    }

    #[test]
    fn test_one_spec_per_entity_type() {
        for entity_type in EntityType::GOVERNED {
            let count = ALL_SPECS.iter().filter(|s| s.entity_type == entity_type).count();
            assert_eq!(count, 1, "{}", entity_type);
        }
    }
}
