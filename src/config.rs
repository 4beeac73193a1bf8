//! Invocation configuration.
//!
//! Values come from the environment (optionally primed from `.env` by the
//! binaries) and may be overridden by a YAML file:
//!
//! ```yaml
//! batch_size: 5000
//! schema: dfa
//! valid_entity_types: [ROLE, PERMISSION]
//! nats:
//!   url: nats://broker:4222
//!   stream_name: GOVERNANCE
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::nats::NatsConfig;
use crate::schema::EntityType;

/// Default number of prepared rows per writer call
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default number of stream records fetched per invocation
pub const DEFAULT_FETCH_LIMIT: usize = 1000;

/// Default warehouse pool size
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// Default wait for a pooled warehouse connection
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;

#[derive(Debug)]
pub enum ConfigError {
    /// A required setting is absent
    Missing(String),
    /// A setting is present but unusable
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "Missing required setting {}", key),
            ConfigError::Invalid { key, value, reason } => {
                write!(f, "Invalid value '{}' for {}: {}", value, key, reason)
            }
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Yaml(e) => write!(f, "Failed to parse config file: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Yaml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Yaml(e)
    }
}

/// Settings shared by every handler
#[derive(Clone)]
pub struct EtlConfig {
    pub database_url: Option<String>,
    /// Rows per writer call in the file pipeline
    pub batch_size: usize,
    /// Stream records fetched per invocation
    pub fetch_limit: usize,
    /// Warehouse schema used for DDL and qualified table names
    pub schema: String,
    pub object_store_root: String,
    /// Narrows the entity catalogue when set
    pub valid_entity_types: Option<BTreeSet<EntityType>>,
    pub function_name: Option<String>,
    /// Drop and recreate every table before bootstrapping
    pub recreate_tables: bool,
    /// Upper bound on pooled warehouse connections
    pub pool_size: u32,
    pub connection_timeout_secs: u64,
    pub nats: NatsConfig,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            batch_size: DEFAULT_BATCH_SIZE,
            fetch_limit: DEFAULT_FETCH_LIMIT,
            schema: "public".to_string(),
            object_store_root: "./object-store".to_string(),
            valid_entity_types: None,
            function_name: None,
            recreate_tables: false,
            pool_size: DEFAULT_POOL_SIZE,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            nats: NatsConfig::default(),
        }
    }
}

/// YAML overrides; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverrides {
    database_url: Option<String>,
    batch_size: Option<usize>,
    fetch_limit: Option<usize>,
    schema: Option<String>,
    object_store_root: Option<String>,
    valid_entity_types: Option<Vec<String>>,
    function_name: Option<String>,
    recreate_tables: Option<bool>,
    pool_size: Option<u32>,
    connection_timeout_secs: Option<u64>,
    #[serde(default)]
    nats: NatsOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NatsOverrides {
    url: Option<String>,
    stream_name: Option<String>,
    subject: Option<String>,
}

impl EtlConfig {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = EtlConfig::default();

        config.database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        config.batch_size = parse_size(lookup("DFA_BATCH_SIZE"), "DFA_BATCH_SIZE", DEFAULT_BATCH_SIZE);
        config.fetch_limit =
            parse_size(lookup("AUDIT_FILE_SIZE"), "AUDIT_FILE_SIZE", DEFAULT_FETCH_LIMIT);

        if let Some(schema) = lookup("DFA_ADW_DFA_SCHEMA").filter(|v| !v.trim().is_empty()) {
            config.schema = schema.trim().to_string();
        }
        if let Some(root) = lookup("DFA_OBJECT_STORE_ROOT").filter(|v| !v.trim().is_empty()) {
            config.object_store_root = root;
        }
        if let Some(types) = lookup("DFA_VALID_ENTITY_TYPES") {
            let names: Vec<String> = types.split(',').map(|s| s.trim().to_string()).collect();
            config.valid_entity_types = parse_entity_types(&names)?;
        }
        config.function_name = lookup("DFA_FUNCTION_NAME").filter(|v| !v.trim().is_empty());
        config.recreate_tables = lookup("DFA_RECREATE_DFA_ADW_TABLES")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        config.pool_size =
            parse_size(lookup("DFA_DB_POOL_SIZE"), "DFA_DB_POOL_SIZE", DEFAULT_POOL_SIZE as usize)
                .min(u32::MAX as usize) as u32;
        config.connection_timeout_secs = parse_size(
            lookup("DFA_DB_CONNECTION_TIMEOUT_SECS"),
            "DFA_DB_CONNECTION_TIMEOUT_SECS",
            DEFAULT_CONNECTION_TIMEOUT_SECS as usize,
        ) as u64;

        if let Some(url) = lookup("NATS_URL") {
            config.nats.url = url;
        }
        if let Some(stream) = lookup("NATS_STREAM") {
            config.nats.stream_name = stream;
        }
        if let Some(subject) = lookup("NATS_SUBJECT") {
            config.nats.subject = subject;
        }

        crate::schema::ddl::validate_schema_name(&config.schema)?;
        Ok(config)
    }

    /// Apply overrides from a YAML file
    pub fn with_yaml<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        self.with_yaml_str(&contents)
    }

    pub fn with_yaml_str(mut self, contents: &str) -> Result<Self, ConfigError> {
        let overrides: ConfigOverrides = serde_yaml::from_str(contents)?;

        if let Some(url) = overrides.database_url {
            self.database_url = Some(url);
        }
        if let Some(size) = overrides.batch_size {
            self.batch_size = nonzero(size, "batch_size")?;
        }
        if let Some(limit) = overrides.fetch_limit {
            self.fetch_limit = nonzero(limit, "fetch_limit")?;
        }
        if let Some(schema) = overrides.schema {
            crate::schema::ddl::validate_schema_name(&schema)?;
            self.schema = schema;
        }
        if let Some(root) = overrides.object_store_root {
            self.object_store_root = root;
        }
        if let Some(types) = overrides.valid_entity_types {
            self.valid_entity_types = parse_entity_types(&types)?;
        }
        if let Some(name) = overrides.function_name {
            self.function_name = Some(name);
        }
        if let Some(recreate) = overrides.recreate_tables {
            self.recreate_tables = recreate;
        }
        if let Some(size) = overrides.pool_size {
            self.pool_size = nonzero(size as usize, "pool_size")? as u32;
        }
        if let Some(secs) = overrides.connection_timeout_secs {
            self.connection_timeout_secs = nonzero(secs as usize, "connection_timeout_secs")? as u64;
        }
        if let Some(url) = overrides.nats.url {
            self.nats.url = url;
        }
        if let Some(stream) = overrides.nats.stream_name {
            self.nats.stream_name = stream;
        }
        if let Some(subject) = overrides.nats.subject {
            self.nats.subject = subject;
        }
        Ok(self)
    }

    /// Connection string for warehouse-backed runs
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("DATABASE_URL".to_string()))
    }

    pub fn require_function_name(&self) -> Result<&str, ConfigError> {
        self.function_name
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("DFA_FUNCTION_NAME".to_string()))
    }
}

/// Positive integer setting; anything else falls back to the default
fn parse_size(raw: Option<String>, key: &str, default: usize) -> usize {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<usize>() {
        Ok(size) if size > 0 => size,
        _ => {
            tracing::warn!("Invalid {} '{}', using {}", key, raw, default);
            default
        }
    }
}

fn nonzero(value: usize, key: &str) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    Ok(value)
}

fn parse_entity_types(names: &[String]) -> Result<Option<BTreeSet<EntityType>>, ConfigError> {
    let mut types = BTreeSet::new();
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        let entity_type = name.parse::<EntityType>().map_err(|e| ConfigError::Invalid {
            key: "DFA_VALID_ENTITY_TYPES".to_string(),
            value: name.to_string(),
            reason: e.to_string(),
        })?;
        types.insert(entity_type);
    }
    Ok(if types.is_empty() { None } else { Some(types) })
}
