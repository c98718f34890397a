//! Access control for tablegate
//!
//! - Static table policy (allowed/restricted tables, operation switches,
//!   result-size cap)
//! - Per-user, per-table grant storage and administration
//! - Column filtering against grant allow/deny lists
//! - Merging of grant-mandated row filters into caller filters

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod admin;
pub mod columns;
pub mod conditions;
pub mod policy;
pub mod store;

pub use admin::GrantAdmin;
pub use columns::ColumnFilter;
pub use conditions::{merge, merge_with_grant};
pub use policy::PolicyStore;
pub use store::{GrantRepository, InMemoryGrantStore};
pub use tablegate_common::grant::{ColumnRestrictions, Grant};
