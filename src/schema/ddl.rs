//! DDL for the warehouse tables and the offset tracker.

use std::fmt::Write;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::ConfigError;
use crate::schema::{ColumnKind, EntitySchema, SchemaRegistry};

/// Name of the table holding stream offset ranges
pub const OFFSET_TABLE: &str = "stream_offset_tracker";

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]{0,62}$").expect("valid regex"))
}

/// Check that a schema name is a plain SQL identifier
pub fn validate_schema_name(schema: &str) -> Result<(), ConfigError> {
    if identifier_pattern().is_match(schema) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key: "DFA_ADW_DFA_SCHEMA".to_string(),
            value: schema.to_string(),
            reason: "not a valid SQL identifier".to_string(),
        })
    }
}

/// Qualified table name (`schema.table`)
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

fn column_line(name: &str, kind: ColumnKind, sql_type: &str, length: Option<u32>) -> String {
    let mut line = match length {
        Some(len) => format!("    {} {}({})", name, sql_type, len),
        None => format!("    {} {}", name, sql_type),
    };
    match kind {
        ColumnKind::Text => line.push_str(" DEFAULT ''"),
        ColumnKind::Json => line.push_str(" DEFAULT '{}'"),
        ColumnKind::JsonList => line.push_str(" DEFAULT '[]'"),
        ColumnKind::Timestamp => line.push_str(" DEFAULT CURRENT_TIMESTAMP"),
        ColumnKind::Number | ColumnKind::Integer => {}
    }
    line
}

/// `CREATE TABLE` for one registered schema
pub fn create_table(schema: &str, table: &EntitySchema) -> String {
    let lines: Vec<String> = table
        .columns()
        .iter()
        .map(|c| column_line(c.name, c.kind, c.sql_type(), c.length()))
        .collect();

    let mut sql = String::new();
    let _ = writeln!(sql, "CREATE TABLE IF NOT EXISTS {} (", qualified(schema, &table.table_name));
    let _ = writeln!(sql, "{}", lines.join(",\n"));
    sql.push(')');
    sql
}

/// Unique index plus named constraint for a state table; empty for history tables
pub fn create_unique_constraint(schema: &str, table: &EntitySchema) -> Vec<String> {
    let key = table.unique_key();
    if key.is_empty() {
        return Vec::new();
    }

    // the index carries the constraint's name, so attaching it renames nothing
    // and a later bootstrap finds it under the same name
    let constraint = table.constraint_name();
    let target = qualified(schema, &table.table_name);

    let create_index = format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
        constraint,
        target,
        key.join(", ")
    );

    let mut add_constraint = String::new();
    let _ = writeln!(add_constraint, "DO $$ BEGIN");
    let _ = writeln!(
        add_constraint,
        "    IF NOT EXISTS (SELECT 1 FROM pg_constraint WHERE conname = '{}' AND conrelid = '{}'::regclass) THEN",
        constraint, target
    );
    let _ = writeln!(
        add_constraint,
        "        ALTER TABLE {} ADD CONSTRAINT {} UNIQUE USING INDEX {};",
        target, constraint, constraint
    );
    let _ = writeln!(add_constraint, "    END IF;");
    add_constraint.push_str("END $$");

    vec![create_index, add_constraint]
}

/// DDL for the offset tracker table
pub fn create_offset_table(schema: &str) -> Vec<String> {
    let target = qualified(schema, OFFSET_TABLE);
    let mut sql = String::new();
    let _ = writeln!(sql, "CREATE TABLE IF NOT EXISTS {} (", target);
    let _ = writeln!(sql, "    id BIGSERIAL PRIMARY KEY,");
    let _ = writeln!(sql, "    \"offset\" BIGINT NOT NULL,");
    let _ = writeln!(sql, "    end_offset BIGINT NOT NULL,");
    let _ = writeln!(sql, "    application VARCHAR(255) NOT NULL,");
    let _ = writeln!(sql, "    start_date TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,");
    let _ = writeln!(sql, "    end_date TIMESTAMPTZ");
    sql.push(')');

    let index = format!(
        "CREATE INDEX IF NOT EXISTS idx_{}_application ON {} (application, start_date)",
        OFFSET_TABLE, target
    );

    vec![sql, index]
}

/// Every statement needed to bootstrap the warehouse, in execution order
pub fn bootstrap_statements(schema: &str) -> Result<Vec<String>, ConfigError> {
    validate_schema_name(schema)?;

    let mut statements = Vec::new();
    for table in SchemaRegistry::global().schemas() {
        statements.push(create_table(schema, table));
        statements.extend(create_unique_constraint(schema, table));
    }
    statements.extend(create_offset_table(schema));
    Ok(statements)
}

/// `DROP TABLE` for every registered table and the offset tracker
pub fn drop_statements(schema: &str) -> Result<Vec<String>, ConfigError> {
    validate_schema_name(schema)?;

    let mut statements: Vec<String> = SchemaRegistry::global()
        .schemas()
        .into_iter()
        .map(|t| format!("DROP TABLE IF EXISTS {}", qualified(schema, &t.table_name)))
        .collect();
    statements.push(format!("DROP TABLE IF EXISTS {}", qualified(schema, OFFSET_TABLE)));
    Ok(statements)
}

/// Join statements into a script suitable for psql
pub fn render_script(statements: &[String]) -> String {
    let mut script = String::new();
    for statement in statements {
        let _ = writeln!(script, "{};\n", statement);
    }
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityType, TableKind};

    #[test]
    fn test_validate_schema_name() {
        assert!(validate_schema_name("public").is_ok());
        assert!(validate_schema_name("dfa_schema_1").is_ok());
        assert!(validate_schema_name("public; DROP TABLE x").is_err());
        assert!(validate_schema_name("1abc").is_err());
        assert!(validate_schema_name("").is_err());
    }

    #[test]
    fn test_create_state_table() {
        let table = SchemaRegistry::global()
            .get(EntityType::Role, TableKind::State)
            .unwrap();
        let sql = create_table("public", table);

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS public.role_state ("));
        assert!(sql.contains("    id VARCHAR(32767) DEFAULT ''"));
        assert!(sql.contains("    created_on NUMERIC"));
        assert!(sql.contains("    managed_by_ids TEXT DEFAULT '[]'"));
        assert!(sql.contains("    event_timestamp TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP"));
    }

    #[test]
    fn test_unique_constraint_only_for_state() {
        let registry = SchemaRegistry::global();
        let state = registry.get(EntityType::Role, TableKind::State).unwrap();
        let ts = registry.get(EntityType::Role, TableKind::TimeSeries).unwrap();

        let statements = create_unique_constraint("public", state);
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0],
            "CREATE UNIQUE INDEX IF NOT EXISTS role_state_uk ON public.role_state \
             (id, access_bundle_id, service_instance_id, tenancy_id)"
        );
        assert!(statements[1].contains("ADD CONSTRAINT role_state_uk UNIQUE USING INDEX role_state_uk;"));
        assert!(statements[1].contains("conrelid = 'public.role_state'::regclass"));

        assert!(create_unique_constraint("public", ts).is_empty());
    }

    #[test]
    fn test_rerun_bootstrap_names_one_index_per_key() {
        let statements = bootstrap_statements("public").unwrap();
        let index_names: Vec<&str> = statements
            .iter()
            .filter_map(|s| s.strip_prefix("CREATE UNIQUE INDEX IF NOT EXISTS "))
            .filter_map(|s| s.split_whitespace().next())
            .collect();

        assert!(!index_names.is_empty());
        assert!(index_names.iter().all(|name| name.ends_with("_uk")));
        for name in &index_names {
            let attach = format!("ADD CONSTRAINT {} UNIQUE USING INDEX {};", name, name);
            assert!(statements.iter().any(|s| s.contains(&attach)));
        }
    }

    #[test]
    fn test_bootstrap_covers_every_table() {
        let statements = bootstrap_statements("dfa").unwrap();
        let creates = statements
            .iter()
            .filter(|s| s.starts_with("CREATE TABLE"))
            .count();

        // 15 entity types with two tables, audit events, offset tracker
        assert_eq!(creates, 15 * 2 + 1 + 1);
        assert!(statements.iter().any(|s| s.contains("dfa.stream_offset_tracker")));
    }

    #[test]
    fn test_drop_rejects_bad_schema() {
        assert!(drop_statements("bad schema").is_err());
        let drops = drop_statements("public").unwrap();
        assert!(drops.contains(&"DROP TABLE IF EXISTS public.audit_events".to_string()));
    }
}
