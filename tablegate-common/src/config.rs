//! Configuration types for tablegate

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grant::Grant;
use crate::types::Operation;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TablegateConfig {
    /// Static table policy
    pub policy: PolicyConfig,
    /// Database connection configuration
    pub database: DatabaseConfig,
    /// Grants written to the grant store at start-up
    pub grants: Vec<Grant>,
}

impl TablegateConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject settings the policy layer cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.policy.max_records_per_request == 0 {
            return Err(Error::ConfigError(
                "policy.max_records_per_request must be greater than zero".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(Error::ConfigError(
                "database.max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-wide table policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Tables reachable through the API (empty = all tables)
    pub allowed_tables: Vec<String>,
    /// Tables that can never be reached, even if also allowed
    pub restricted_tables: Vec<String>,
    /// Operation switches; a missing entry counts as disabled
    pub allowed_operations: HashMap<Operation, bool>,
    /// Upper bound on rows returned by one select
    pub max_records_per_request: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_tables: vec![],
            restricted_tables: vec![
                "users".to_string(),
                "password_resets".to_string(),
                "migrations".to_string(),
                "failed_jobs".to_string(),
                "personal_access_tokens".to_string(),
                "tablegate_grants".to_string(),
            ],
            allowed_operations: Operation::ALL.into_iter().map(|op| (op, true)).collect(),
            max_records_per_request: 1000,
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL
    pub url: String,
    /// Connection pool size
    pub max_connections: u32,
    /// Create the database file if it does not exist
    pub create_if_missing: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://tablegate.db".to_string(),
            max_connections: 10,
            create_if_missing: true,
        }
    }
}
