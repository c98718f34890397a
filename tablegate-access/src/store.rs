//! Grant storage

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use tablegate_common::error::{Error, Result};
use tablegate_common::grant::Grant;
use tablegate_common::types::UserId;

/// Storage contract for grant records.
///
/// Grants are unique per `(user_id, table_name)`; every implementation must
/// keep that invariant through `upsert_grant`.
#[async_trait::async_trait]
pub trait GrantRepository: Send + Sync {
    /// Look up the grant for one user and table
    async fn find_grant(&self, user_id: UserId, table: &str) -> Result<Option<Grant>>;

    /// Create the grant, or replace the one recorded for the same user and table.
    ///
    /// An existing record keeps its `id` and `created_at`.
    async fn upsert_grant(&self, grant: Grant) -> Result<Grant>;

    /// Delete a grant by ID
    async fn revoke_grant(&self, id: Uuid) -> Result<()>;

    /// All grants held by a user, ordered by table name
    async fn grants_for_user(&self, user_id: UserId) -> Result<Vec<Grant>>;
}

/// In-memory grant store
pub struct InMemoryGrantStore {
    /// Grants by (user_id, table_name)
    grants: Arc<RwLock<HashMap<(UserId, String), Grant>>>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self {
            grants: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a store pre-populated with grants
    pub fn with_grants(grants: impl IntoIterator<Item = Grant>) -> Self {
        let store = Self::new();
        {
            let mut map = store.grants.write();
            for grant in grants {
                map.insert((grant.user_id, grant.table_name.clone()), grant);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.grants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.read().is_empty()
    }
}

impl Default for InMemoryGrantStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GrantRepository for InMemoryGrantStore {
    async fn find_grant(&self, user_id: UserId, table: &str) -> Result<Option<Grant>> {
        Ok(self
            .grants
            .read()
            .get(&(user_id, table.to_string()))
            .cloned())
    }

    async fn upsert_grant(&self, mut grant: Grant) -> Result<Grant> {
        let key = (grant.user_id, grant.table_name.clone());
        let mut grants = self.grants.write();

        if let Some(existing) = grants.get(&key) {
            grant.id = existing.id;
            grant.created_at = existing.created_at;
        }
        grant.updated_at = Utc::now();

        grants.insert(key, grant.clone());
        Ok(grant)
    }

    async fn revoke_grant(&self, id: Uuid) -> Result<()> {
        let mut grants = self.grants.write();
        let original_len = grants.len();
        grants.retain(|_, g| g.id != id);

        if grants.len() == original_len {
            return Err(Error::GrantNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn grants_for_user(&self, user_id: UserId) -> Result<Vec<Grant>> {
        let mut grants: Vec<Grant> = self
            .grants
            .read()
            .values()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect();
        grants.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        Ok(grants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablegate_common::types::Operation;

    #[tokio::test]
    async fn test_find_grant() {
        let store = InMemoryGrantStore::with_grants([
            Grant::new(1, "posts").allow(Operation::Select),
            Grant::new(2, "posts").allow(Operation::Delete),
        ]);

        let grant = store.find_grant(1, "posts").await.unwrap().unwrap();
        assert!(grant.can_select);
        assert!(!grant.can_delete);

        assert!(store.find_grant(1, "comments").await.unwrap().is_none());
        assert!(store.find_grant(3, "posts").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_identity() {
        let store = InMemoryGrantStore::new();

        let first = store
            .upsert_grant(Grant::new(1, "posts").allow(Operation::Select))
            .await
            .unwrap();
        let second = store
            .upsert_grant(Grant::new(1, "posts").allow(Operation::Insert))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(store.len(), 1);

        let stored = store.find_grant(1, "posts").await.unwrap().unwrap();
        assert!(!stored.can_select);
        assert!(stored.can_insert);
    }

    #[tokio::test]
    async fn test_revoke() {
        let store = InMemoryGrantStore::new();
        let grant = store.upsert_grant(Grant::new(1, "posts")).await.unwrap();

        store.revoke_grant(grant.id).await.unwrap();
        assert!(store.is_empty());

        assert!(matches!(
            store.revoke_grant(grant.id).await,
            Err(Error::GrantNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_grants_for_user_sorted() {
        let store = InMemoryGrantStore::with_grants([
            Grant::new(1, "zebra"),
            Grant::new(1, "alpha"),
            Grant::new(2, "beta"),
        ]);

        let tables: Vec<String> = store
            .grants_for_user(1)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.table_name)
            .collect();
        assert_eq!(tables, vec!["alpha", "zebra"]);
    }
}
