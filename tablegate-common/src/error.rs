//! Error types for tablegate

use thiserror::Error;

use crate::types::Operation;

/// Errors raised while validating, rewriting or executing a table operation
#[derive(Error, Debug)]
pub enum Error {
    // Policy Errors
    #[error("Access to table '{0}' is restricted")]
    TableRestricted(String),

    #[error("Access to table '{0}' is not allowed")]
    TableNotAllowed(String),

    #[error("{} operation is not allowed", .0.as_str().to_uppercase())]
    OperationDisabled(Operation),

    // Authorization Errors
    #[error("You don't have permission to perform {operation} operations on table {table}")]
    PermissionDenied { operation: Operation, table: String },

    #[error("No columns are allowed for {operation} on table {table}")]
    NoColumnsAllowed { operation: Operation, table: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Request Errors
    #[error("DELETE operations on table '{0}' require where conditions")]
    UnsafeDelete(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid where clause: {0}")]
    InvalidClause(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Grant Errors
    #[error("Grant not found: {0}")]
    GrantNotFound(String),

    // Backend Errors
    #[error("Database error: {0}")]
    StoreError(String),

    // General Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for tablegate operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP status code for each error type
impl Error {
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::UnsafeDelete(_)
            | Self::UnknownOperation(_)
            | Self::InvalidIdentifier(_)
            | Self::InvalidClause(_)
            | Self::InvalidRequest(_)
            | Self::JsonError(_) => 400,

            // 403 Forbidden
            Self::Unauthorized(_)
            | Self::TableRestricted(_)
            | Self::TableNotAllowed(_)
            | Self::OperationDisabled(_)
            | Self::PermissionDenied { .. }
            | Self::NoColumnsAllowed { .. } => 403,

            // 404 Not Found
            Self::GrantNotFound(_) => 404,

            // 500 Internal Server Error
            Self::StoreError(_) | Self::ConfigError(_) | Self::IoError(_) => 500,
        }
    }

    /// Error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TableRestricted(_) => "table_restricted",
            Self::TableNotAllowed(_) => "table_not_allowed",
            Self::OperationDisabled(_) => "operation_disabled",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::NoColumnsAllowed { .. } => "no_columns_allowed",
            Self::Unauthorized(_) => "unauthorized",
            Self::UnsafeDelete(_) => "unsafe_delete",
            Self::UnknownOperation(_) => "unknown_operation",
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::InvalidClause(_) => "invalid_clause",
            Self::InvalidRequest(_) => "invalid_request",
            Self::GrantNotFound(_) => "grant_not_found",
            Self::StoreError(_) => "database_error",
            Self::ConfigError(_) => "config_error",
            Self::IoError(_) => "io_error",
            Self::JsonError(_) => "json_error",
        }
    }

    /// Whether the failure was detected before anything touched the backend
    pub fn is_validation(&self) -> bool {
        self.status_code() < 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(Error::TableRestricted("users".into()).status_code(), 403);
        assert_eq!(Error::UnsafeDelete("posts".into()).status_code(), 400);
        assert_eq!(
            Error::PermissionDenied {
                operation: Operation::Delete,
                table: "posts".into()
            }
            .status_code(),
            403
        );
        assert_eq!(Error::StoreError("boom".into()).status_code(), 500);
        assert_eq!(Error::GrantNotFound("x".into()).status_code(), 404);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::OperationDisabled(Operation::Insert).error_code(),
            "operation_disabled"
        );
        assert_eq!(
            Error::NoColumnsAllowed {
                operation: Operation::Select,
                table: "t".into()
            }
            .error_code(),
            "no_columns_allowed"
        );
    }

    #[test]
    fn test_messages_name_the_subject() {
        let err = Error::OperationDisabled(Operation::Select);
        assert_eq!(err.to_string(), "SELECT operation is not allowed");

        let err = Error::PermissionDenied {
            operation: Operation::Update,
            table: "orders".into(),
        };
        assert!(err.to_string().contains("update"));
        assert!(err.to_string().contains("orders"));
    }

    #[test]
    fn test_store_errors_are_not_validation() {
        assert!(!Error::StoreError("x".into()).is_validation());
        assert!(Error::UnsafeDelete("t".into()).is_validation());
    }
}
