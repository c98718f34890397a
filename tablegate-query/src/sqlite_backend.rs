//! SQLite backend
//!
//! SQL is generated with sea-query so identifiers are quoted and values
//! escaped; statements run on an sqlx pool.

use std::str::FromStr;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sea_query::{
    Alias, Asterisk, Cond, DeleteStatement, Expr, Iden, Order, Query, SelectStatement,
    SimpleExpr, SqliteQueryBuilder, UpdateStatement,
};
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row as _, SqlitePool, TypeInfo, ValueRef};

use tablegate_common::clause::{Clause, Condition, Operator};
use tablegate_common::config::DatabaseConfig;
use tablegate_common::error::{Error, Result};
use tablegate_common::types::{is_wildcard, Row, RowId, SortDirection};

use crate::backend::{QueryBackend, SelectQuery};

/// Dynamic table/column identifier
#[derive(Debug, Clone)]
struct DynIden(String);

impl Iden for DynIden {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

pub(crate) fn store_error(err: impl std::fmt::Display) -> Error {
    Error::StoreError(err.to_string())
}

/// Open a SQLite pool from configuration
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| Error::ConfigError(format!("invalid database url: {}", e)))?
        .create_if_missing(config.create_if_missing);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .map_err(store_error)
}

/// Table backend over a SQLite database
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect using the `[database]` configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Ok(Self::new(connect(config).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a statement that does not come from a request (schema setup)
    pub async fn execute_raw(&self, sql: &str) -> Result<u64> {
        tracing::debug!("Executing SQL: {}", sql);
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected())
    }

    fn build_select(query: &SelectQuery) -> Result<String> {
        let mut statement = Query::select();
        statement.from(DynIden(query.table.clone()));

        if is_wildcard(&query.columns) {
            statement.column(Asterisk);
        } else {
            statement.columns(query.columns.iter().map(|c| DynIden(c.clone())));
        }

        if !query.conditions.is_empty() {
            statement.cond_where(conditions_to_cond(&query.conditions)?);
        }

        for order in &query.order_by {
            let direction = match order.direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            statement.order_by(DynIden(order.column.clone()), direction);
        }

        statement.limit(query.limit as u64);
        if let Some(offset) = query.offset {
            statement.offset(offset as u64);
        }

        Ok(statement.to_string(SqliteQueryBuilder))
    }

    fn build_insert(table: &str, data: &Row) -> Result<String> {
        let mut statement = Query::insert();
        statement
            .into_table(DynIden(table.to_string()))
            .columns(data.keys().map(|k| DynIden(k.clone())));

        let values: Vec<SimpleExpr> = data.values().map(json_to_expr).collect();
        statement.values(values).map_err(store_error)?;

        Ok(statement.to_string(SqliteQueryBuilder))
    }

    fn build_update(table: &str, data: &Row, conditions: &[Clause]) -> Result<String> {
        let mut statement: UpdateStatement = Query::update();
        statement.table(DynIden(table.to_string())).values(
            data.iter()
                .map(|(column, value)| (DynIden(column.clone()), json_to_expr(value))),
        );
        if !conditions.is_empty() {
            statement.cond_where(conditions_to_cond(conditions)?);
        }
        Ok(statement.to_string(SqliteQueryBuilder))
    }

    fn build_delete(table: &str, conditions: &[Clause]) -> Result<String> {
        let mut statement: DeleteStatement = Query::delete();
        statement.from_table(DynIden(table.to_string()));
        if !conditions.is_empty() {
            statement.cond_where(conditions_to_cond(conditions)?);
        }
        Ok(statement.to_string(SqliteQueryBuilder))
    }

    fn build_exists(table: &str, conditions: &[Clause]) -> Result<String> {
        let mut statement: SelectStatement = Query::select();
        statement
            .expr_as(Expr::val(1), Alias::new("present"))
            .from(DynIden(table.to_string()))
            .limit(1);
        if !conditions.is_empty() {
            statement.cond_where(conditions_to_cond(conditions)?);
        }
        Ok(statement.to_string(SqliteQueryBuilder))
    }
}

#[async_trait]
impl QueryBackend for SqliteBackend {
    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let sql = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
        tracing::debug!("Executing SQL: {}", sql);

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        let columns = rows
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_error)?;

        if columns.is_empty() {
            return Err(Error::StoreError(format!("no such table: {}", table)));
        }
        Ok(columns)
    }

    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        let sql = Self::build_select(query)?;
        tracing::debug!("Executing SQL: {}", sql);

        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.iter().map(row_to_json).collect()
    }

    async fn insert(&self, table: &str, data: &Row) -> Result<RowId> {
        let sql = Self::build_insert(table, data)?;
        tracing::debug!("Executing SQL: {}", sql);

        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.last_insert_rowid())
    }

    async fn update(&self, table: &str, data: &Row, conditions: &[Clause]) -> Result<u64> {
        let sql = Self::build_update(table, data, conditions)?;
        tracing::debug!("Executing SQL: {}", sql);

        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, table: &str, conditions: &[Clause]) -> Result<u64> {
        let sql = Self::build_delete(table, conditions)?;
        tracing::debug!("Executing SQL: {}", sql);

        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected())
    }

    async fn exists(&self, table: &str, conditions: &[Clause]) -> Result<bool> {
        let sql = Self::build_exists(table, conditions)?;
        tracing::debug!("Executing SQL: {}", sql);

        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.is_some())
    }
}

// ============================================================================
// Clause translation
// ============================================================================

fn conditions_to_cond(clauses: &[Clause]) -> Result<Cond> {
    clauses.iter().try_fold(Cond::all(), add_clause)
}

/// Add one clause to a condition group; leaves and raw fragments are added
/// as plain expressions, composites as nested groups
fn add_clause(cond: Cond, clause: &Clause) -> Result<Cond> {
    Ok(match clause {
        Clause::Leaf(condition) => cond.add(condition_to_expr(condition)?),
        Clause::And(clauses) => cond.add(conditions_to_cond(clauses)?),
        Clause::Or(clauses) => cond.add(clauses.iter().try_fold(Cond::any(), add_clause)?),
        Clause::Raw(fragment) => cond.add(Expr::cust(fragment.as_str())),
    })
}

fn condition_to_expr(condition: &Condition) -> Result<SimpleExpr> {
    let column = Expr::col(DynIden(condition.column.clone()));
    let value = &condition.value;

    let expr = match (condition.operator, value) {
        (Operator::Eq, JsonValue::Null) => column.is_null(),
        (Operator::Ne, JsonValue::Null) => column.is_not_null(),
        (Operator::Eq, v) => column.eq(json_to_expr(v)),
        (Operator::Ne, v) => column.ne(json_to_expr(v)),
        (Operator::Gt, v) => column.gt(json_to_expr(v)),
        (Operator::Lt, v) => column.lt(json_to_expr(v)),
        (Operator::Gte, v) => column.gte(json_to_expr(v)),
        (Operator::Lte, v) => column.lte(json_to_expr(v)),
        (Operator::In, JsonValue::Array(items)) => column.is_in(items.iter().map(json_to_expr)),
        (Operator::NotIn, JsonValue::Array(items)) => {
            column.is_not_in(items.iter().map(json_to_expr))
        }
        (Operator::Like, v) => column.like(like_pattern(v)),
        (Operator::NotLike, v) => column.not_like(like_pattern(v)),
        (op, _) => {
            return Err(Error::InvalidClause(format!(
                "operator '{}' on column '{}' requires a list value",
                op, condition.column
            )))
        }
    };
    Ok(expr)
}

fn like_pattern(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert a JSON value to a SQL literal. Arrays and objects are stored as
/// JSON text.
fn json_to_expr(value: &JsonValue) -> SimpleExpr {
    match value {
        JsonValue::Null => Expr::val(Option::<String>::None).into(),
        JsonValue::Bool(b) => Expr::val(*b).into(),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Expr::val(i).into(),
            None => Expr::val(n.as_f64().unwrap_or_default()).into(),
        },
        JsonValue::String(s) => Expr::val(s.as_str()).into(),
        other => Expr::val(other.to_string()).into(),
    }
}

// ============================================================================
// Row decoding
// ============================================================================

fn row_to_json(row: &SqliteRow) -> Result<Row> {
    let mut object = Row::new();

    for (index, column) in row.columns().iter().enumerate() {
        let name = sqlx::Column::name(column).to_string();

        let type_name = {
            let raw = row.try_get_raw(index).map_err(store_error)?;
            if raw.is_null() {
                object.insert(name, JsonValue::Null);
                continue;
            }
            raw.type_info().name().to_ascii_uppercase()
        };

        let value = match type_name.as_str() {
            "INTEGER" | "INT" | "BIGINT" => {
                JsonValue::from(row.try_get::<i64, _>(index).map_err(store_error)?)
            }
            "REAL" | "FLOAT" | "DOUBLE" => {
                JsonValue::from(row.try_get::<f64, _>(index).map_err(store_error)?)
            }
            "BOOLEAN" => JsonValue::Bool(row.try_get::<bool, _>(index).map_err(store_error)?),
            "BLOB" => {
                let bytes = row.try_get::<Vec<u8>, _>(index).map_err(store_error)?;
                JsonValue::String(STANDARD.encode(bytes))
            }
            "NUMERIC" => match row.try_get::<i64, _>(index) {
                Ok(i) => JsonValue::from(i),
                Err(_) => JsonValue::from(row.try_get::<f64, _>(index).map_err(store_error)?),
            },
            _ => JsonValue::String(row.try_get::<String, _>(index).map_err(store_error)?),
        };
        object.insert(name, value);
    }

    Ok(object)
}
