//! Per-user, per-table grant records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clause::Clause;
use crate::types::{Operation, UserId};

/// Column allow/deny lists of a grant.
///
/// When `allowed` is non-empty it decides alone; `denied` is only consulted
/// when `allowed` is empty. Both empty means every column is permitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnRestrictions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub denied: Vec<String>,
}

impl ColumnRestrictions {
    pub fn allow(columns: &[&str]) -> Self {
        Self {
            allowed: columns.iter().map(|c| (*c).to_string()).collect(),
            denied: vec![],
        }
    }

    pub fn deny(columns: &[&str]) -> Self {
        Self {
            allowed: vec![],
            denied: columns.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    /// No restriction recorded
    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_empty() && self.denied.is_empty()
    }

    /// Check if a column is allowed under these restrictions
    pub fn is_column_allowed(&self, column: &str) -> bool {
        if !self.allowed.is_empty() {
            return self.allowed.iter().any(|c| c == column);
        }
        !self.denied.iter().any(|c| c == column)
    }
}

/// Permission record for one `(user_id, table_name)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    /// Unique grant ID
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// User the grant belongs to
    pub user_id: UserId,
    /// Table the grant covers
    #[serde(alias = "table")]
    pub table_name: String,
    #[serde(default)]
    pub can_select: bool,
    #[serde(default)]
    pub can_insert: bool,
    #[serde(default)]
    pub can_update: bool,
    #[serde(default)]
    pub can_delete: bool,
    /// Column allow/deny lists
    #[serde(default)]
    pub column_restrictions: ColumnRestrictions,
    /// Row filter ANDed into every select, update and delete
    #[serde(default)]
    pub where_conditions: Vec<Clause>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Grant {
    /// Create a grant that allows nothing yet
    pub fn new(user_id: UserId, table_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            table_name: table_name.to_string(),
            can_select: false,
            can_insert: false,
            can_update: false,
            can_delete: false,
            column_restrictions: ColumnRestrictions::default(),
            where_conditions: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    /// Enable one operation
    pub fn allow(mut self, operation: Operation) -> Self {
        match operation {
            Operation::Select => self.can_select = true,
            Operation::Insert => self.can_insert = true,
            Operation::Update => self.can_update = true,
            Operation::Delete => self.can_delete = true,
        }
        self
    }

    /// Enable all four operations
    pub fn allow_all(self) -> Self {
        Operation::ALL
            .into_iter()
            .fold(self, |grant, op| grant.allow(op))
    }

    /// Restrict to an explicit column list
    pub fn with_allowed_columns(mut self, columns: &[&str]) -> Self {
        self.column_restrictions = ColumnRestrictions::allow(columns);
        self
    }

    /// Hide a set of columns
    pub fn with_denied_columns(mut self, columns: &[&str]) -> Self {
        self.column_restrictions = ColumnRestrictions::deny(columns);
        self
    }

    /// Add a mandatory row filter
    pub fn with_condition(mut self, clause: Clause) -> Self {
        self.where_conditions.push(clause);
        self
    }

    /// Check if the grant allows a specific operation
    pub fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::Select => self.can_select,
            Operation::Insert => self.can_insert,
            Operation::Update => self.can_update,
            Operation::Delete => self.can_delete,
        }
    }

    pub fn is_column_allowed(&self, column: &str) -> bool {
        self.column_restrictions.is_column_allowed(column)
    }
}
