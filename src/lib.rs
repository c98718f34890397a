//! tablegate: permission-aware table access
//!
//! Exposes relational tables to authenticated callers through a single
//! mediation layer:
//!
//! - **Table policy** - allowed/restricted tables, operation switches and a
//!   cap on result size
//! - **Grants** - per-user, per-table operation flags, column allow/deny
//!   lists and mandatory row filters
//! - **Mediation** - every select/insert/update/delete is authorized and
//!   rewritten before it reaches the database

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub use tablegate_access as access;
pub use tablegate_common as common;
pub use tablegate_query as query;

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::info;

use tablegate_access::{GrantAdmin, GrantRepository, PolicyStore};
use tablegate_common::config::TablegateConfig;
use tablegate_common::error::Result;
use tablegate_common::types::Principal;
use tablegate_query::{
    ExecutionOutcome, OperationRequest, QueryMediator, SqliteBackend, SqliteGrantStore,
};

/// A configured tablegate instance over one SQLite database
pub struct TablegateService {
    config: TablegateConfig,
    backend: SqliteBackend,
    mediator: QueryMediator,
    admin: GrantAdmin,
}

impl TablegateService {
    /// Connect to the database, prepare grant storage and seed configured grants
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or a seed grant is
    /// rejected.
    pub async fn new(config: TablegateConfig) -> Result<Self> {
        info!("Opening database {}", config.database.url);
        let backend = SqliteBackend::connect(&config.database).await?;
        let grants: Arc<dyn GrantRepository> =
            Arc::new(SqliteGrantStore::new(backend.pool().clone()).await?);

        for grant in &config.grants {
            let stored = grants.upsert_grant(grant.clone()).await?;
            info!(
                "Seeded grant for user {} on {}",
                stored.user_id, stored.table_name
            );
        }

        let policy = Arc::new(PolicyStore::new(&config.policy));
        let mediator = QueryMediator::new(policy, grants.clone(), Arc::new(backend.clone()));
        let admin = GrantAdmin::new(grants);

        Ok(Self {
            config,
            backend,
            mediator,
            admin,
        })
    }

    /// Parse and execute a JSON operation request
    ///
    /// # Errors
    /// Returns the mediation error (policy, authorization, validation or
    /// store failure).
    pub async fn execute_json(
        &self,
        request: JsonValue,
        principal: &Principal,
    ) -> Result<ExecutionOutcome> {
        let request = OperationRequest::from_json(request)?;
        self.mediator.execute(&request, principal).await
    }

    #[must_use]
    pub fn mediator(&self) -> &QueryMediator {
        &self.mediator
    }

    #[must_use]
    pub fn admin(&self) -> &GrantAdmin {
        &self.admin
    }

    #[must_use]
    pub fn backend(&self) -> &SqliteBackend {
        &self.backend
    }

    #[must_use]
    pub fn config(&self) -> &TablegateConfig {
        &self.config
    }
}
