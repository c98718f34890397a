//! Permission-aware query mediation for tablegate
//!
//! Turns a generic table operation from an authenticated caller into a
//! statement that honors table policy, per-user grants, column restrictions
//! and mandatory row filters, then runs it on a backend:
//! - In-memory tables for development and tests
//! - SQLite through sea-query and sqlx
//! - Grant storage in SQLite alongside the data

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod mediator;
pub mod request;
pub mod sqlite_backend;
pub mod sqlite_grants;

pub use backend::{InMemoryBackend, QueryBackend, SelectQuery};
pub use mediator::{ExecutionOutcome, PreparedOperation, QueryMediator};
pub use request::{OperationRequest, RequestData};
pub use sqlite_backend::SqliteBackend;
pub use sqlite_grants::SqliteGrantStore;
