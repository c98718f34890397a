//! Grant administration
//!
//! Creating and revoking grants is reserved for admins. Any principal may read
//! its own grants.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use tablegate_common::clause::validate_clauses;
use tablegate_common::error::{Error, Result};
use tablegate_common::grant::Grant;
use tablegate_common::types::{validate_identifier, Principal, UserId};

use crate::store::GrantRepository;

/// Admin-facing grant management on top of a [`GrantRepository`]
#[derive(Clone)]
pub struct GrantAdmin {
    store: Arc<dyn GrantRepository>,
}

impl GrantAdmin {
    pub fn new(store: Arc<dyn GrantRepository>) -> Self {
        Self { store }
    }

    /// Create or replace the grant for `(grant.user_id, grant.table_name)`
    pub async fn grant(&self, principal: &Principal, grant: Grant) -> Result<Grant> {
        require_admin(principal, "grant")?;
        validate_identifier(&grant.table_name)?;
        validate_clauses(&grant.where_conditions)?;
        for column in grant
            .column_restrictions
            .allowed
            .iter()
            .chain(&grant.column_restrictions.denied)
        {
            validate_identifier(column)?;
        }

        let stored = self.store.upsert_grant(grant).await?;
        info!(
            "Granted access on {} to user {} (select={}, insert={}, update={}, delete={})",
            stored.table_name,
            stored.user_id,
            stored.can_select,
            stored.can_insert,
            stored.can_update,
            stored.can_delete
        );
        Ok(stored)
    }

    /// Delete a grant by ID
    pub async fn revoke(&self, principal: &Principal, id: Uuid) -> Result<()> {
        require_admin(principal, "revoke")?;
        self.store.revoke_grant(id).await?;
        info!("Revoked grant {}", id);
        Ok(())
    }

    /// List grants. Users only see their own; admins may name any user.
    pub async fn list(&self, principal: &Principal, user_id: Option<UserId>) -> Result<Vec<Grant>> {
        let target = user_id.unwrap_or_else(|| principal.id());
        if target != principal.id() && !principal.is_admin() {
            warn!(
                "User {} attempted to list grants of user {}",
                principal.id(),
                target
            );
            return Err(Error::Unauthorized(
                "only admins can list other users' grants".to_string(),
            ));
        }
        self.store.grants_for_user(target).await
    }

    /// The caller's grant for one table
    pub async fn show(&self, principal: &Principal, table: &str) -> Result<Grant> {
        self.store
            .find_grant(principal.id(), table)
            .await?
            .ok_or_else(|| Error::GrantNotFound(table.to_string()))
    }
}

fn require_admin(principal: &Principal, action: &str) -> Result<()> {
    if principal.is_admin() {
        return Ok(());
    }
    warn!("User {} attempted to {} a grant", principal.id(), action);
    Err(Error::Unauthorized(format!("only admins can {action} grants")))
}
