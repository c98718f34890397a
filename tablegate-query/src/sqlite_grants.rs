//! Grant storage in SQLite
//!
//! Grants live in `tablegate_grants`, next to the tables they protect. Column
//! restrictions and row filters are stored as JSON text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row as _, SqlitePool};
use uuid::Uuid;

use tablegate_access::store::GrantRepository;
use tablegate_common::error::{Error, Result};
use tablegate_common::grant::Grant;
use tablegate_common::types::UserId;

use crate::sqlite_backend::store_error;

const CREATE_TABLE: &str = r#"CREATE TABLE IF NOT EXISTS tablegate_grants (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    table_name TEXT NOT NULL,
    can_select BOOLEAN NOT NULL DEFAULT 0,
    can_insert BOOLEAN NOT NULL DEFAULT 0,
    can_update BOOLEAN NOT NULL DEFAULT 0,
    can_delete BOOLEAN NOT NULL DEFAULT 0,
    column_restrictions TEXT NOT NULL DEFAULT '{}',
    where_conditions TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(user_id, table_name)
)"#;

const SELECT_COLUMNS: &str = "id, user_id, table_name, can_select, can_insert, can_update, \
     can_delete, column_restrictions, where_conditions, created_at, updated_at";

/// Grant repository backed by a SQLite table
#[derive(Clone)]
pub struct SqliteGrantStore {
    pool: SqlitePool,
}

impl SqliteGrantStore {
    /// Create the store and its table if needed
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(store_error)
}

fn row_to_grant(row: &SqliteRow) -> Result<Grant> {
    let id: String = row.try_get("id").map_err(store_error)?;
    let restrictions: String = row.try_get("column_restrictions").map_err(store_error)?;
    let conditions: String = row.try_get("where_conditions").map_err(store_error)?;
    let created_at: String = row.try_get("created_at").map_err(store_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(store_error)?;

    Ok(Grant {
        id: Uuid::parse_str(&id).map_err(store_error)?,
        user_id: row.try_get("user_id").map_err(store_error)?,
        table_name: row.try_get("table_name").map_err(store_error)?,
        can_select: row.try_get("can_select").map_err(store_error)?,
        can_insert: row.try_get("can_insert").map_err(store_error)?,
        can_update: row.try_get("can_update").map_err(store_error)?,
        can_delete: row.try_get("can_delete").map_err(store_error)?,
        column_restrictions: serde_json::from_str(&restrictions).map_err(store_error)?,
        where_conditions: serde_json::from_str(&conditions).map_err(store_error)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait]
impl GrantRepository for SqliteGrantStore {
    async fn find_grant(&self, user_id: UserId, table: &str) -> Result<Option<Grant>> {
        let sql = format!(
            "SELECT {} FROM tablegate_grants WHERE user_id = ?1 AND table_name = ?2",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.as_ref().map(row_to_grant).transpose()
    }

    async fn upsert_grant(&self, grant: Grant) -> Result<Grant> {
        let restrictions = serde_json::to_string(&grant.column_restrictions)?;
        let conditions = serde_json::to_string(&grant.where_conditions)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"INSERT INTO tablegate_grants (id, user_id, table_name, can_select, can_insert,
                   can_update, can_delete, column_restrictions, where_conditions, created_at,
                   updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
               ON CONFLICT(user_id, table_name) DO UPDATE SET
                   can_select = excluded.can_select,
                   can_insert = excluded.can_insert,
                   can_update = excluded.can_update,
                   can_delete = excluded.can_delete,
                   column_restrictions = excluded.column_restrictions,
                   where_conditions = excluded.where_conditions,
                   updated_at = excluded.updated_at"#,
        )
        .bind(grant.id.to_string())
        .bind(grant.user_id)
        .bind(&grant.table_name)
        .bind(grant.can_select)
        .bind(grant.can_insert)
        .bind(grant.can_update)
        .bind(grant.can_delete)
        .bind(restrictions)
        .bind(conditions)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        self.find_grant(grant.user_id, &grant.table_name)
            .await?
            .ok_or_else(|| Error::StoreError("grant vanished after upsert".to_string()))
    }

    async fn revoke_grant(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM tablegate_grants WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(Error::GrantNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn grants_for_user(&self, user_id: UserId) -> Result<Vec<Grant>> {
        let sql = format!(
            "SELECT {} FROM tablegate_grants WHERE user_id = ?1 ORDER BY table_name",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.iter().map(row_to_grant).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablegate_common::clause::{Clause, Operator};
    use tablegate_common::config::DatabaseConfig;
    use tablegate_common::types::Operation;

    async fn store() -> SqliteGrantStore {
        let pool = crate::sqlite_backend::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            create_if_missing: true,
        })
        .await
        .unwrap();
        SqliteGrantStore::new(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let store = store().await;

        let grant = Grant::new(7, "orders")
            .allow(Operation::Select)
            .with_denied_columns(&["internal_notes"])
            .with_condition(Clause::eq("user_id", 7))
            .with_condition(Clause::leaf("status", Operator::In, serde_json::json!(["open", "held"])));
        let stored = store.upsert_grant(grant.clone()).await.unwrap();
        assert_eq!(stored.id, grant.id);

        let found = store.find_grant(7, "orders").await.unwrap().unwrap();
        assert!(found.can_select);
        assert!(!found.can_delete);
        assert_eq!(found.column_restrictions, grant.column_restrictions);
        assert_eq!(found.where_conditions, grant.where_conditions);

        assert!(store.find_grant(8, "orders").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let store = store().await;

        let first = store
            .upsert_grant(Grant::new(7, "orders").allow(Operation::Select))
            .await
            .unwrap();
        let second = store
            .upsert_grant(Grant::new(7, "orders").allow(Operation::Delete))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(!second.can_select);
        assert!(second.can_delete);
        assert_eq!(store.grants_for_user(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_and_list() {
        let store = store().await;
        let a = store.upsert_grant(Grant::new(7, "orders")).await.unwrap();
        store.upsert_grant(Grant::new(7, "invoices")).await.unwrap();

        let tables: Vec<String> = store
            .grants_for_user(7)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.table_name)
            .collect();
        assert_eq!(tables, vec!["invoices", "orders"]);

        store.revoke_grant(a.id).await.unwrap();
        assert!(matches!(
            store.revoke_grant(a.id).await,
            Err(Error::GrantNotFound(_))
        ));
        assert_eq!(store.grants_for_user(7).await.unwrap().len(), 1);
    }
}
