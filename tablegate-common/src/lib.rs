//! tablegate common types and utilities
//!
//! Shared types, configuration, grant records, row-filter clauses and error
//! handling for the tablegate crates.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clause;
pub mod config;
pub mod error;
pub mod grant;
pub mod types;

pub use clause::{Clause, Condition, Operator};
pub use config::{DatabaseConfig, PolicyConfig, TablegateConfig};
pub use error::{Error, Result};
pub use grant::{ColumnRestrictions, Grant};
pub use types::{ApiError, OrderBy, Operation, Principal, Row, RowId, SortDirection, UserId};
