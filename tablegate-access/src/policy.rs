//! Static table policy

use std::collections::{HashMap, HashSet};

use tablegate_common::config::PolicyConfig;
use tablegate_common::error::{Error, Result};
use tablegate_common::types::Operation;

/// Process-wide policy built once from configuration and never mutated
#[derive(Debug, Clone)]
pub struct PolicyStore {
    allowed_tables: HashSet<String>,
    restricted_tables: HashSet<String>,
    allowed_operations: HashMap<Operation, bool>,
    max_records_per_request: usize,
}

impl PolicyStore {
    /// Create a policy store from configuration
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            allowed_tables: config.allowed_tables.iter().cloned().collect(),
            restricted_tables: config.restricted_tables.iter().cloned().collect(),
            allowed_operations: config.allowed_operations.clone(),
            max_records_per_request: config.max_records_per_request,
        }
    }

    /// Check if an operation is switched on; unset means off
    pub fn is_operation_allowed(&self, operation: Operation) -> bool {
        self.allowed_operations
            .get(&operation)
            .copied()
            .unwrap_or(false)
    }

    /// Check a table against the restricted list, then the allowed list
    pub fn validate_table(&self, table: &str) -> Result<()> {
        if self.restricted_tables.contains(table) {
            return Err(Error::TableRestricted(table.to_string()));
        }

        if !self.allowed_tables.is_empty() && !self.allowed_tables.contains(table) {
            return Err(Error::TableNotAllowed(table.to_string()));
        }

        Ok(())
    }

    /// Maximum rows a single select may return
    pub fn max_records_per_request(&self) -> usize {
        self.max_records_per_request
    }

    /// Clamp a requested limit to the policy maximum.
    ///
    /// A missing or zero limit means "as many as allowed".
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(limit) if limit > 0 => limit.min(self.max_records_per_request),
            _ => self.max_records_per_request,
        }
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(allowed: &[&str], restricted: &[&str]) -> PolicyStore {
        PolicyStore::new(&PolicyConfig {
            allowed_tables: allowed.iter().map(|t| (*t).to_string()).collect(),
            restricted_tables: restricted.iter().map(|t| (*t).to_string()).collect(),
            ..PolicyConfig::default()
        })
    }

    #[test]
    fn test_restricted_table() {
        let store = policy(&[], &["users"]);
        assert!(matches!(
            store.validate_table("users"),
            Err(Error::TableRestricted(t)) if t == "users"
        ));
        assert!(store.validate_table("posts").is_ok());
    }

    #[test]
    fn test_allowed_list() {
        let store = policy(&["posts"], &[]);
        assert!(store.validate_table("posts").is_ok());
        assert!(matches!(
            store.validate_table("comments"),
            Err(Error::TableNotAllowed(_))
        ));
    }

    #[test]
    fn test_restricted_wins_over_allowed() {
        let store = policy(&["users", "posts"], &["users"]);
        assert!(matches!(
            store.validate_table("users"),
            Err(Error::TableRestricted(_))
        ));
    }

    #[test]
    fn test_operation_defaults_to_disabled() {
        let mut config = PolicyConfig::default();
        config.allowed_operations.clear();
        config.allowed_operations.insert(Operation::Select, true);
        config.allowed_operations.insert(Operation::Delete, false);
        let store = PolicyStore::new(&config);

        assert!(store.is_operation_allowed(Operation::Select));
        assert!(!store.is_operation_allowed(Operation::Delete));
        assert!(!store.is_operation_allowed(Operation::Insert));
    }

    #[test]
    fn test_clamp_limit() {
        let store = PolicyStore::new(&PolicyConfig {
            max_records_per_request: 100,
            ..PolicyConfig::default()
        });

        assert_eq!(store.clamp_limit(None), 100);
        assert_eq!(store.clamp_limit(Some(0)), 100);
        assert_eq!(store.clamp_limit(Some(10)), 10);
        assert_eq!(store.clamp_limit(Some(5000)), 100);
    }
}
