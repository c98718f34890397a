//! Operation requests
//!
//! Requests arrive as JSON:
//!
//! ```json
//! {
//!   "operation": "select",
//!   "table": "orders",
//!   "columns": ["id", "total"],
//!   "where": [{"column": "total", "operator": ">", "value": 100}],
//!   "order_by": [{"column": "id", "direction": "desc"}],
//!   "limit": 20
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use tablegate_common::clause::{validate_clauses, Clause};
use tablegate_common::error::{Error, Result};
use tablegate_common::types::{validate_identifier, Operation, OrderBy, Row, WILDCARD};

/// Insert/update payload: one row, or several for a batch insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestData {
    Single(Row),
    Batch(Vec<Row>),
}

impl RequestData {
    /// Rows in submission order
    pub fn rows(&self) -> Vec<&Row> {
        match self {
            RequestData::Single(row) => vec![row],
            RequestData::Batch(rows) => rows.iter().collect(),
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, RequestData::Batch(_))
    }
}

/// A normalized table operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation: Operation,
    pub table: String,
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RequestData>,
    #[serde(default, rename = "where")]
    pub conditions: Vec<Clause>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub upsert: bool,
}

fn default_columns() -> Vec<String> {
    vec![WILDCARD.to_string()]
}

impl OperationRequest {
    pub fn new(operation: Operation, table: &str) -> Self {
        Self {
            operation,
            table: table.to_string(),
            columns: default_columns(),
            data: None,
            conditions: vec![],
            order_by: vec![],
            limit: None,
            offset: None,
            upsert: false,
        }
    }

    pub fn select(table: &str) -> Self {
        Self::new(Operation::Select, table)
    }

    pub fn insert(table: &str, row: JsonValue) -> Self {
        Self::new(Operation::Insert, table).with_data(row)
    }

    pub fn update(table: &str, row: JsonValue) -> Self {
        Self::new(Operation::Update, table).with_data(row)
    }

    pub fn delete(table: &str) -> Self {
        Self::new(Operation::Delete, table)
    }

    /// Parse a request from JSON.
    ///
    /// The operation name is matched case-insensitively; an unrecognized one
    /// is reported as [`Error::UnknownOperation`] rather than a parse error.
    pub fn from_json(mut value: JsonValue) -> Result<Self> {
        let object = value
            .as_object_mut()
            .ok_or_else(|| Error::InvalidRequest("request must be a JSON object".to_string()))?;

        let operation: Operation = match object.get("operation") {
            Some(JsonValue::String(name)) => name.parse()?,
            Some(other) => return Err(Error::UnknownOperation(other.to_string())),
            None => {
                return Err(Error::InvalidRequest(
                    "missing field 'operation'".to_string(),
                ))
            }
        };
        object.insert(
            "operation".to_string(),
            JsonValue::String(operation.as_str().to_string()),
        );

        serde_json::from_value(value).map_err(|e| Error::InvalidRequest(e.to_string()))
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        Self::from_json(serde_json::from_str(input)?)
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Set the payload from a JSON object or array of objects.
    ///
    /// Anything else leaves the payload empty, which validation rejects.
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = serde_json::from_value(data).ok();
        self
    }

    pub fn with_condition(mut self, clause: Clause) -> Self {
        self.conditions.push(clause);
        self
    }

    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    /// Check names, clause shapes and payload shape for the operation
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.table)?;

        if self.columns.iter().any(|c| c == WILDCARD) {
            if self.columns.len() > 1 {
                return Err(Error::InvalidIdentifier(
                    "'*' cannot be combined with other columns".to_string(),
                ));
            }
        } else {
            self.columns
                .iter()
                .try_for_each(|c| validate_identifier(c))?;
        }

        validate_clauses(&self.conditions)?;
        self.order_by
            .iter()
            .try_for_each(|o| validate_identifier(&o.column))?;

        match self.operation {
            Operation::Insert => match &self.data {
                Some(RequestData::Single(row)) => validate_row(row),
                Some(RequestData::Batch(rows)) if !rows.is_empty() => {
                    rows.iter().try_for_each(validate_row)
                }
                Some(RequestData::Batch(_)) => Err(Error::InvalidRequest(
                    "batch insert needs at least one row".to_string(),
                )),
                None => Err(Error::InvalidRequest(
                    "insert requires 'data'".to_string(),
                )),
            },
            Operation::Update => match &self.data {
                Some(RequestData::Single(row)) => validate_row(row),
                Some(RequestData::Batch(_)) => Err(Error::InvalidRequest(
                    "update 'data' must be a single object".to_string(),
                )),
                None => Err(Error::InvalidRequest(
                    "update requires 'data'".to_string(),
                )),
            },
            Operation::Select | Operation::Delete => Ok(()),
        }
    }
}

fn validate_row(row: &Row) -> Result<()> {
    if row.is_empty() {
        return Err(Error::InvalidRequest("'data' must not be empty".to_string()));
    }
    row.keys().try_for_each(|k| validate_identifier(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tablegate_common::clause::Operator;
    use tablegate_common::types::SortDirection;

    #[test]
    fn test_parse_select() {
        let request = OperationRequest::from_json(json!({
            "operation": "SELECT",
            "table": "orders",
            "where": [{"column": "total", "operator": ">", "value": 100}],
            "order_by": [{"column": "id", "direction": "DESC"}],
            "limit": 20
        }))
        .unwrap();

        assert_eq!(request.operation, Operation::Select);
        assert_eq!(request.columns, vec!["*"]);
        assert_eq!(request.conditions, vec![Clause::leaf("total", Operator::Gt, 100)]);
        assert_eq!(request.order_by[0].direction, SortDirection::Desc);
        assert_eq!(request.limit, Some(20));
        request.validate().unwrap();
    }

    #[test]
    fn test_unknown_operation() {
        let result = OperationRequest::from_json(json!({"operation": "merge", "table": "t"}));
        assert!(matches!(result, Err(Error::UnknownOperation(op)) if op == "merge"));

        let result = OperationRequest::from_json(json!({"table": "t"}));
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_batch_data() {
        let request = OperationRequest::from_json(json!({
            "operation": "insert",
            "table": "t",
            "data": [{"a": 1}, {"a": 2}]
        }))
        .unwrap();

        let data = request.data.as_ref().unwrap();
        assert!(data.is_batch());
        assert_eq!(data.rows().len(), 2);
        request.validate().unwrap();
    }

    #[test]
    fn test_invalid_identifiers() {
        let request = OperationRequest::select("orders; drop table x");
        assert!(matches!(request.validate(), Err(Error::InvalidIdentifier(_))));

        let request = OperationRequest::select("orders").with_columns(&["*", "id"]);
        assert!(matches!(request.validate(), Err(Error::InvalidIdentifier(_))));

        let request = OperationRequest::insert("orders", json!({"to tal": 1}));
        assert!(matches!(request.validate(), Err(Error::InvalidIdentifier(_))));
    }

    #[test]
    fn test_payload_shape() {
        let request = OperationRequest::new(Operation::Insert, "orders");
        assert!(matches!(request.validate(), Err(Error::InvalidRequest(_))));

        let request = OperationRequest::insert("orders", json!([]));
        assert!(matches!(request.validate(), Err(Error::InvalidRequest(_))));

        let request = OperationRequest::update("orders", json!([{"a": 1}]));
        assert!(matches!(request.validate(), Err(Error::InvalidRequest(_))));

        let request = OperationRequest::update("orders", json!({}));
        assert!(matches!(request.validate(), Err(Error::InvalidRequest(_))));

        assert!(OperationRequest::delete("orders").validate().is_ok());
    }

    #[test]
    fn test_invalid_clause() {
        let request = OperationRequest::select("orders")
            .with_condition(Clause::leaf("id", Operator::In, 3));
        assert!(matches!(request.validate(), Err(Error::InvalidClause(_))));
    }

    #[test]
    fn test_leaf_without_value() {
        let result = OperationRequest::from_json(json!({
            "operation": "delete",
            "table": "orders",
            "where": [{"column": "user_id", "operator": "="}]
        }));
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }
}
