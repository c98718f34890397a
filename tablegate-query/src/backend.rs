//! Table backends
//!
//! A backend executes already-authorized statements. It knows nothing about
//! principals or grants; everything it receives has been filtered and scoped
//! by the mediator.

use std::cmp::Ordering;
use std::collections::HashMap;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use tablegate_common::clause::{Clause, Condition, Operator};
use tablegate_common::error::{Error, Result};
use tablegate_common::types::{is_wildcard, OrderBy, Row, RowId, SortDirection};

/// A fully rewritten SELECT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub table: String,
    /// Projection; `["*"]` selects every column
    pub columns: Vec<String>,
    /// Implicitly ANDed
    pub conditions: Vec<Clause>,
    pub order_by: Vec<OrderBy>,
    /// Always set; the mediator clamps it to the policy maximum
    pub limit: usize,
    pub offset: Option<usize>,
}

/// Unified statement interface for table stores
///
/// Every failure is reported as [`Error::StoreError`].
#[async_trait::async_trait]
pub trait QueryBackend: Send + Sync {
    /// Column names of a table in declaration order
    async fn table_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Execute a SELECT
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>>;

    /// Insert one row and return its identifier
    async fn insert(&self, table: &str, data: &Row) -> Result<RowId>;

    /// Update matching rows and return how many were affected
    async fn update(&self, table: &str, data: &Row, conditions: &[Clause]) -> Result<u64>;

    /// Delete matching rows and return how many were affected
    async fn delete(&self, table: &str, conditions: &[Clause]) -> Result<u64>;

    /// Whether at least one row matches
    async fn exists(&self, table: &str, conditions: &[Clause]) -> Result<bool>;
}

struct MemoryTable {
    columns: Vec<String>,
    unique: Vec<String>,
    rows: Vec<Row>,
    next_id: RowId,
}

impl MemoryTable {
    fn check_columns<'a>(&self, name: &str, columns: impl IntoIterator<Item = &'a String>) -> Result<()> {
        for column in columns {
            if !self.columns.contains(column) {
                return Err(Error::StoreError(format!(
                    "table {} has no column named {}",
                    name, column
                )));
            }
        }
        Ok(())
    }

    /// Reject `candidate` if it collides with a row other than `skip`
    fn check_unique(&self, name: &str, candidate: &Row, skip: Option<usize>) -> Result<()> {
        for column in &self.unique {
            let Some(value) = candidate.get(column).filter(|v| !v.is_null()) else {
                continue;
            };
            let collides = self
                .rows
                .iter()
                .enumerate()
                .any(|(i, row)| Some(i) != skip && row.get(column) == Some(value));
            if collides {
                return Err(Error::StoreError(format!(
                    "UNIQUE constraint failed: {}.{}",
                    name, column
                )));
            }
        }
        Ok(())
    }
}

/// In-memory table store for development/testing
///
/// Tables are declared up front. Every table has an auto-increment integer
/// `id` column that is also unique.
pub struct InMemoryBackend {
    tables: parking_lot::RwLock<HashMap<String, MemoryTable>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    /// Declare a table. `id` is added if missing.
    pub fn with_table(self, name: &str, columns: &[&str], unique: &[&str]) -> Self {
        self.create_table(name, columns, unique);
        self
    }

    /// Declare (or replace) a table
    pub fn create_table(&self, name: &str, columns: &[&str], unique: &[&str]) {
        let mut all: Vec<String> = vec!["id".to_string()];
        all.extend(
            columns
                .iter()
                .filter(|c| **c != "id")
                .map(|c| (*c).to_string()),
        );

        let mut unique_columns = vec!["id".to_string()];
        unique_columns.extend(unique.iter().filter(|c| **c != "id").map(|c| (*c).to_string()));

        self.tables.write().insert(
            name.to_string(),
            MemoryTable {
                columns: all,
                unique: unique_columns,
                rows: vec![],
                next_id: 1,
            },
        );
    }

    /// Snapshot of every row in a table, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn no_such_table(table: &str) -> Error {
    Error::StoreError(format!("no such table: {}", table))
}

#[async_trait::async_trait]
impl QueryBackend for InMemoryBackend {
    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| no_such_table(table))
    }

    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        let tables = self.tables.read();
        let table = tables
            .get(&query.table)
            .ok_or_else(|| no_such_table(&query.table))?;

        let projection: Vec<String> = if is_wildcard(&query.columns) {
            table.columns.clone()
        } else {
            query.columns.clone()
        };
        table.check_columns(&query.table, &projection)?;
        table.check_columns(&query.table, query.order_by.iter().map(|o| &o.column))?;

        let mut matched = Vec::new();
        for row in &table.rows {
            if matches_all(row, &query.conditions)? {
                matched.push(row);
            }
        }

        matched.sort_by(|a, b| {
            for order in &query.order_by {
                let ordering = sort_key(a.get(&order.column)).cmp_values(&sort_key(b.get(&order.column)));
                let ordering = match order.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        Ok(matched
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit)
            .map(|row| {
                projection
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(JsonValue::Null)))
                    .collect()
            })
            .collect())
    }

    async fn insert(&self, table: &str, data: &Row) -> Result<RowId> {
        let mut tables = self.tables.write();
        let memory = tables.get_mut(table).ok_or_else(|| no_such_table(table))?;
        memory.check_columns(table, data.keys())?;

        let id = match data.get("id") {
            Some(JsonValue::Number(n)) => n.as_i64().ok_or_else(|| {
                Error::StoreError("datatype mismatch: id must be an integer".to_string())
            })?,
            None | Some(JsonValue::Null) => memory.next_id,
            Some(_) => {
                return Err(Error::StoreError(
                    "datatype mismatch: id must be an integer".to_string(),
                ))
            }
        };

        let mut row: Row = memory
            .columns
            .iter()
            .map(|c| (c.clone(), data.get(c).cloned().unwrap_or(JsonValue::Null)))
            .collect();
        row.insert("id".to_string(), JsonValue::from(id));

        memory.check_unique(table, &row, None)?;
        memory.rows.push(row);
        memory.next_id = memory.next_id.max(id + 1);
        Ok(id)
    }

    async fn update(&self, table: &str, data: &Row, conditions: &[Clause]) -> Result<u64> {
        let mut tables = self.tables.write();
        let memory = tables.get_mut(table).ok_or_else(|| no_such_table(table))?;
        memory.check_columns(table, data.keys())?;

        let mut targets = Vec::new();
        for (i, row) in memory.rows.iter().enumerate() {
            if matches_all(row, conditions)? {
                targets.push(i);
            }
        }

        // Validate every change before applying any, so a failed update
        // leaves the table untouched
        let mut updated = Vec::with_capacity(targets.len());
        for &i in &targets {
            let mut row = memory.rows[i].clone();
            for (column, value) in data {
                row.insert(column.clone(), value.clone());
            }
            memory.check_unique(table, &row, Some(i))?;
            updated.push((i, row));
        }
        for (i, row) in updated {
            memory.rows[i] = row;
        }

        Ok(targets.len() as u64)
    }

    async fn delete(&self, table: &str, conditions: &[Clause]) -> Result<u64> {
        let mut tables = self.tables.write();
        let memory = tables.get_mut(table).ok_or_else(|| no_such_table(table))?;

        let mut keep = Vec::with_capacity(memory.rows.len());
        for row in &memory.rows {
            keep.push(!matches_all(row, conditions)?);
        }

        let original_len = memory.rows.len();
        let mut flags = keep.into_iter();
        memory.rows.retain(|_| flags.next().unwrap_or(true));
        Ok((original_len - memory.rows.len()) as u64)
    }

    async fn exists(&self, table: &str, conditions: &[Clause]) -> Result<bool> {
        let tables = self.tables.read();
        let memory = tables.get(table).ok_or_else(|| no_such_table(table))?;

        for row in &memory.rows {
            if matches_all(row, conditions)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// ============================================================================
// Clause evaluation
// ============================================================================

fn matches_all(row: &Row, clauses: &[Clause]) -> Result<bool> {
    for clause in clauses {
        if !matches(row, clause)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches(row: &Row, clause: &Clause) -> Result<bool> {
    match clause {
        Clause::Leaf(condition) => matches_condition(row, condition),
        Clause::And(clauses) => matches_all(row, clauses),
        Clause::Or(clauses) => {
            for clause in clauses {
                if matches(row, clause)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Clause::Raw(_) => Err(Error::StoreError(
            "raw clauses are not supported by the in-memory backend".to_string(),
        )),
    }
}

fn matches_condition(row: &Row, condition: &Condition) -> Result<bool> {
    let Some(actual) = row.get(&condition.column) else {
        return Err(Error::StoreError(format!(
            "no such column: {}",
            condition.column
        )));
    };
    let expected = &condition.value;

    if expected.is_null() {
        return Ok(match condition.operator {
            Operator::Eq => actual.is_null(),
            Operator::Ne => !actual.is_null(),
            _ => false,
        });
    }
    // SQL comparisons against NULL are never true
    if actual.is_null() {
        return Ok(false);
    }

    let result = match condition.operator {
        Operator::Eq => compare(actual, expected) == Some(Ordering::Equal),
        Operator::Ne => compare(actual, expected).is_some_and(|o| o != Ordering::Equal),
        Operator::Gt => compare(actual, expected) == Some(Ordering::Greater),
        Operator::Lt => compare(actual, expected) == Some(Ordering::Less),
        Operator::Gte => compare(actual, expected).is_some_and(|o| o != Ordering::Less),
        Operator::Lte => compare(actual, expected).is_some_and(|o| o != Ordering::Greater),
        Operator::In => list(expected)
            .iter()
            .any(|v| compare(actual, v) == Some(Ordering::Equal)),
        Operator::NotIn => !list(expected)
            .iter()
            .any(|v| compare(actual, v) == Some(Ordering::Equal)),
        Operator::Like => like(actual, expected)?,
        Operator::NotLike => !like(actual, expected)?,
    };
    Ok(result)
}

fn list(value: &JsonValue) -> &[JsonValue] {
    value.as_array().map_or(&[][..], Vec::as_slice)
}

/// Compare two scalars of the same kind; mixed kinds do not compare
fn compare(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like(actual: &JsonValue, pattern: &JsonValue) -> Result<bool> {
    let text = match actual {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    let pattern = match pattern {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut expr = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');

    let re = RegexBuilder::new(&expr)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| Error::StoreError(e.to_string()))?;
    Ok(re.is_match(&text))
}

/// Total order used for ORDER BY: NULL, then numbers, then text
enum SortKey<'a> {
    Null,
    Number(f64),
    Text(&'a str),
    Other(String),
}

fn sort_key(value: Option<&JsonValue>) -> SortKey<'_> {
    match value {
        None | Some(JsonValue::Null) => SortKey::Null,
        Some(JsonValue::Number(n)) => SortKey::Number(n.as_f64().unwrap_or(0.0)),
        Some(JsonValue::Bool(b)) => SortKey::Number(if *b { 1.0 } else { 0.0 }),
        Some(JsonValue::String(s)) => SortKey::Text(s),
        Some(other) => SortKey::Other(other.to_string()),
    }
}

impl SortKey<'_> {
    fn rank(&self) -> u8 {
        match self {
            SortKey::Null => 0,
            SortKey::Number(_) => 1,
            SortKey::Text(_) => 2,
            SortKey::Other(_) => 3,
        }
    }

    fn cmp_values(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Other(a), SortKey::Other(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}
