//! Common types for tablegate

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of an authenticated user
pub type UserId = i64;

/// Identifier assigned by the backend to an inserted row
pub type RowId = i64;

/// A single table row keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Column marker meaning "every column of the table"
pub const WILDCARD: &str = "*";

// ============================================================================
// Operations
// ============================================================================

/// CRUD operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Select,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "select" => Ok(Operation::Select),
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            _ => Err(Error::UnknownOperation(s.to_string())),
        }
    }
}

// ============================================================================
// Principal
// ============================================================================

/// The authenticated caller of an operation.
///
/// Supplied by whatever authenticated the request; fixed for the lifetime
/// of that request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Principal {
    /// Bypasses every per-table grant
    Admin { id: UserId },
    /// Subject to the grant recorded for `(id, table)`
    User { id: UserId },
}

impl Principal {
    pub fn admin(id: UserId) -> Self {
        Principal::Admin { id }
    }

    pub fn user(id: UserId) -> Self {
        Principal::User { id }
    }

    pub fn id(&self) -> UserId {
        match self {
            Principal::Admin { id } | Principal::User { id } => *id,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin { .. })
    }
}

// ============================================================================
// Ordering
// ============================================================================

/// Sort direction for ORDER BY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(Error::InvalidRequest(format!(
                "order direction must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// One ORDER BY entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: SortDirection::Desc,
        }
    }
}

// ============================================================================
// Identifiers
// ============================================================================

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern compiles"));

/// Check that a table or column name is a plain SQL identifier.
///
/// Only `[A-Za-z_][A-Za-z0-9_]*` is accepted, so names can never carry
/// quoting, schema qualifiers or expressions into generated SQL.
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

/// Whether a column list is the `["*"]` wildcard
pub fn is_wildcard(columns: &[String]) -> bool {
    columns.is_empty() || (columns.len() == 1 && columns[0] == WILDCARD)
}

// ============================================================================
// API Error Types
// ============================================================================

/// Error body returned to API callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, status: u16) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<&Error> for ApiError {
    fn from(err: &Error) -> Self {
        let api = ApiError::new(err.error_code(), err.to_string(), err.status_code());
        match err {
            Error::UnsafeDelete(_) => api.with_hint("Add at least one where condition"),
            Error::UnknownOperation(_) => {
                api.with_hint("Use one of: select, insert, update, delete")
            }
            _ => api,
        }
    }
}
