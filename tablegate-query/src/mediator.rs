//! Query mediation
//!
//! Every request passes through the same pipeline:
//! operation switch, table policy, grant lookup (skipped for admins), column
//! filtering, row-filter merging, limit clamping and the delete guard. Only
//! then is the backend called.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use tablegate_access::columns::ColumnFilter;
use tablegate_access::conditions::merge_with_grant;
use tablegate_access::policy::PolicyStore;
use tablegate_access::store::GrantRepository;
use tablegate_common::clause::Clause;
use tablegate_common::error::{Error, Result};
use tablegate_common::grant::Grant;
use tablegate_common::types::{Operation, Principal, Row, RowId, UserId};

use crate::backend::{QueryBackend, SelectQuery};
use crate::request::{OperationRequest, RequestData};

/// A request after authorization and rewriting, ready to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum PreparedOperation {
    Select(SelectQuery),
    Insert {
        table: String,
        rows: Vec<Row>,
        batch: bool,
    },
    Update {
        table: String,
        data: Row,
        conditions: Vec<Clause>,
        upsert: bool,
    },
    Delete {
        table: String,
        conditions: Vec<Clause>,
    },
}

/// Result of an executed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Rows(Vec<Row>),
    Inserted(RowId),
    InsertedBatch(Vec<RowId>),
    Updated(u64),
    /// An upsert found no matching row and inserted one
    Upserted(RowId),
    Deleted(u64),
}

/// Authorizes, rewrites and executes table operations
#[derive(Clone)]
pub struct QueryMediator {
    policy: Arc<PolicyStore>,
    grants: Arc<dyn GrantRepository>,
    backend: Arc<dyn QueryBackend>,
}

impl QueryMediator {
    pub fn new(
        policy: Arc<PolicyStore>,
        grants: Arc<dyn GrantRepository>,
        backend: Arc<dyn QueryBackend>,
    ) -> Self {
        Self {
            policy,
            grants,
            backend,
        }
    }

    pub fn policy(&self) -> &PolicyStore {
        &self.policy
    }

    /// Authorize and execute a request
    pub async fn execute(
        &self,
        request: &OperationRequest,
        principal: &Principal,
    ) -> Result<ExecutionOutcome> {
        let prepared = self.prepare(request, principal).await?;
        self.run(prepared).await.map_err(|e| {
            error!("{} on {} failed: {}", request.operation, request.table, e);
            e
        })
    }

    /// Authorize and rewrite a request without touching any data
    pub async fn prepare(
        &self,
        request: &OperationRequest,
        principal: &Principal,
    ) -> Result<PreparedOperation> {
        let operation = request.operation;
        let table = request.table.as_str();
        debug!(
            "Preparing {} on {} for user {} (admin: {})",
            operation,
            table,
            principal.id(),
            principal.is_admin()
        );

        if !self.policy.is_operation_allowed(operation) {
            warn!("Rejected {} on {}: operation disabled", operation, table);
            return Err(Error::OperationDisabled(operation));
        }

        if let Err(e) = self.policy.validate_table(table) {
            warn!("Rejected {} on {}: {}", operation, table, e);
            return Err(e);
        }

        request.validate()?;

        let grant = match principal {
            Principal::Admin { .. } => None,
            Principal::User { id } => {
                if request.conditions.iter().any(Clause::contains_raw) {
                    warn!(
                        "Rejected {} on {}: raw clause from user {}",
                        operation, table, id
                    );
                    return Err(Error::PermissionDenied {
                        operation,
                        table: table.to_string(),
                    });
                }
                Some(self.authorize(*id, operation, table).await?)
            }
        };
        let grant = grant.as_ref();
        let filter = ColumnFilter::new(grant, operation);

        match operation {
            Operation::Select => {
                let table_columns = if filter.needs_table_columns(&request.columns) {
                    self.backend.table_columns(table).await?
                } else {
                    vec![]
                };
                let columns = filter.filter_columns(&request.columns, &table_columns)?;

                Ok(PreparedOperation::Select(SelectQuery {
                    table: table.to_string(),
                    columns,
                    conditions: merge_with_grant(&request.conditions, grant),
                    order_by: request.order_by.clone(),
                    limit: self.policy.clamp_limit(request.limit),
                    offset: request.offset,
                }))
            }
            Operation::Insert => {
                let data = request.data.as_ref().ok_or_else(|| {
                    Error::InvalidRequest("insert requires 'data'".to_string())
                })?;
                let rows = data
                    .rows()
                    .into_iter()
                    .map(|row| filter.filter_fields(row))
                    .collect::<Result<Vec<_>>>()?;

                Ok(PreparedOperation::Insert {
                    table: table.to_string(),
                    rows,
                    batch: data.is_batch(),
                })
            }
            Operation::Update => {
                let Some(RequestData::Single(row)) = &request.data else {
                    return Err(Error::InvalidRequest(
                        "update requires a single 'data' object".to_string(),
                    ));
                };

                Ok(PreparedOperation::Update {
                    table: table.to_string(),
                    data: filter.filter_fields(row)?,
                    conditions: merge_with_grant(&request.conditions, grant),
                    upsert: request.upsert,
                })
            }
            Operation::Delete => {
                let conditions = merge_with_grant(&request.conditions, grant);
                if conditions.is_empty() {
                    warn!("Rejected DELETE on {} without where conditions", table);
                    return Err(Error::UnsafeDelete(table.to_string()));
                }

                Ok(PreparedOperation::Delete {
                    table: table.to_string(),
                    conditions,
                })
            }
        }
    }

    /// Fetch the caller's grant and check the operation flag
    async fn authorize(&self, user_id: UserId, operation: Operation, table: &str) -> Result<Grant> {
        let denied = || Error::PermissionDenied {
            operation,
            table: table.to_string(),
        };

        match self.grants.find_grant(user_id, table).await? {
            Some(grant) if grant.allows(operation) => Ok(grant),
            Some(_) => {
                warn!(
                    "User {} lacks {} permission on {}",
                    user_id, operation, table
                );
                Err(denied())
            }
            None => {
                warn!("User {} has no grant on {}", user_id, table);
                Err(denied())
            }
        }
    }

    /// Execute a prepared operation against the backend
    async fn run(&self, prepared: PreparedOperation) -> Result<ExecutionOutcome> {
        match prepared {
            PreparedOperation::Select(query) => {
                let rows = self.backend.select(&query).await?;
                debug!("Selected {} rows from {}", rows.len(), query.table);
                Ok(ExecutionOutcome::Rows(rows))
            }
            PreparedOperation::Insert { table, rows, batch } => {
                // One statement per row; earlier rows stay committed if a later one fails
                let mut ids = Vec::with_capacity(rows.len());
                for row in &rows {
                    ids.push(self.backend.insert(&table, row).await?);
                }
                debug!("Inserted {} rows into {}", ids.len(), table);

                match (batch, ids.as_slice()) {
                    (false, [id]) => Ok(ExecutionOutcome::Inserted(*id)),
                    _ => Ok(ExecutionOutcome::InsertedBatch(ids)),
                }
            }
            PreparedOperation::Update {
                table,
                data,
                conditions,
                upsert,
            } => {
                if upsert
                    && !conditions.is_empty()
                    && !self.backend.exists(&table, &conditions).await?
                {
                    let id = self.backend.insert(&table, &data).await?;
                    debug!("Upsert on {} inserted row {}", table, id);
                    return Ok(ExecutionOutcome::Upserted(id));
                }

                let affected = self.backend.update(&table, &data, &conditions).await?;
                debug!("Updated {} rows in {}", affected, table);
                Ok(ExecutionOutcome::Updated(affected))
            }
            PreparedOperation::Delete { table, conditions } => {
                if conditions.is_empty() {
                    return Err(Error::UnsafeDelete(table));
                }
                let affected = self.backend.delete(&table, &conditions).await?;
                debug!("Deleted {} rows from {}", affected, table);
                Ok(ExecutionOutcome::Deleted(affected))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tablegate_access::store::InMemoryGrantStore;
    use tablegate_common::clause::Operator;
    use tablegate_common::config::PolicyConfig;

    use crate::backend::InMemoryBackend;

    fn mediator(grants: Vec<Grant>, max_records: usize) -> (QueryMediator, Arc<InMemoryBackend>) {
        let backend = Arc::new(
            InMemoryBackend::new()
                .with_table("orders", &["user_id", "total", "note"], &[])
                .with_table("users", &["email"], &["email"]),
        );
        let policy = PolicyStore::new(&PolicyConfig {
            max_records_per_request: max_records,
            ..PolicyConfig::default()
        });
        let mediator = QueryMediator::new(
            Arc::new(policy),
            Arc::new(InMemoryGrantStore::with_grants(grants)),
            backend.clone(),
        );
        (mediator, backend)
    }

    #[tokio::test]
    async fn test_prepare_select_rewrites() {
        let grant = Grant::new(7, "orders")
            .allow(Operation::Select)
            .with_allowed_columns(&["id", "total"])
            .with_condition(Clause::eq("user_id", 7));
        let (mediator, _) = mediator(vec![grant], 50);

        let request = OperationRequest::select("orders")
            .with_condition(Clause::leaf("total", Operator::Gt, 25))
            .with_limit(500);
        let prepared = mediator
            .prepare(&request, &Principal::user(7))
            .await
            .unwrap();

        let PreparedOperation::Select(query) = prepared else {
            panic!("expected select");
        };
        assert_eq!(query.columns, vec!["id", "total"]);
        assert_eq!(
            query.conditions,
            vec![Clause::eq("user_id", 7), Clause::leaf("total", Operator::Gt, 25)]
        );
        assert_eq!(query.limit, 50);
    }

    #[tokio::test]
    async fn test_admin_skips_grants() {
        let (mediator, _) = mediator(vec![], 100);
        let prepared = mediator
            .prepare(&OperationRequest::select("orders"), &Principal::admin(1))
            .await
            .unwrap();

        let PreparedOperation::Select(query) = prepared else {
            panic!("expected select");
        };
        assert_eq!(query.columns, vec!["*"]);
        assert!(query.conditions.is_empty());
        assert_eq!(query.limit, 100);
    }

    #[tokio::test]
    async fn test_missing_grant_or_flag() {
        let (mediator, _) = mediator(vec![Grant::new(7, "orders").allow(Operation::Select)], 100);

        let result = mediator
            .prepare(&OperationRequest::select("orders"), &Principal::user(8))
            .await;
        assert!(matches!(result, Err(Error::PermissionDenied { .. })));

        let request = OperationRequest::delete("orders").with_condition(Clause::eq("id", 1));
        let result = mediator.prepare(&request, &Principal::user(7)).await;
        assert!(matches!(
            result,
            Err(Error::PermissionDenied { operation: Operation::Delete, .. })
        ));
    }

    #[tokio::test]
    async fn test_user_raw_clause_rejected() {
        let grant = Grant::new(7, "orders")
            .allow(Operation::Select)
            .with_condition(Clause::eq("user_id", 7));
        let (mediator, _) = mediator(vec![grant], 100);

        let nested = OperationRequest::select("orders").with_condition(Clause::Or(vec![
            Clause::eq("total", 1),
            Clause::Raw("1=1) OR (1=1".to_string()),
        ]));
        let result = mediator.prepare(&nested, &Principal::user(7)).await;
        assert!(matches!(
            result,
            Err(Error::PermissionDenied { operation: Operation::Select, .. })
        ));

        let prepared = mediator.prepare(&nested, &Principal::admin(1)).await;
        assert!(prepared.is_ok());
    }

    #[tokio::test]
    async fn test_restricted_before_grants() {
        let (mediator, _) = mediator(vec![Grant::new(7, "users").allow_all()], 100);
        let result = mediator
            .prepare(&OperationRequest::select("users"), &Principal::user(7))
            .await;
        assert!(matches!(result, Err(Error::TableRestricted(_))));
    }

    #[tokio::test]
    async fn test_delete_guard() {
        let (mediator, _) = mediator(vec![], 100);
        let result = mediator
            .prepare(&OperationRequest::delete("orders"), &Principal::admin(1))
            .await;
        assert!(matches!(result, Err(Error::UnsafeDelete(t)) if t == "orders"));

        let result = mediator
            .run(PreparedOperation::Delete {
                table: "orders".to_string(),
                conditions: vec![],
            })
            .await;
        assert!(matches!(result, Err(Error::UnsafeDelete(_))));
    }

    #[tokio::test]
    async fn test_insert_filters_fields() {
        let grant = Grant::new(7, "orders")
            .allow(Operation::Insert)
            .with_denied_columns(&["note"]);
        let (mediator, backend) = mediator(vec![grant], 100);

        let request = OperationRequest::insert("orders", json!({"user_id": 7, "total": 10, "note": "x"}));
        let outcome = mediator.execute(&request, &Principal::user(7)).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Inserted(1));

        let rows = backend.rows("orders");
        assert_eq!(rows[0]["note"], serde_json::Value::Null);
        assert_eq!(rows[0]["total"], json!(10));
    }

    #[tokio::test]
    async fn test_update_total_denial() {
        let grant = Grant::new(7, "orders")
            .allow(Operation::Update)
            .with_allowed_columns(&["note"]);
        let (mediator, _) = mediator(vec![grant], 100);

        let request = OperationRequest::update("orders", json!({"total": 0}))
            .with_condition(Clause::eq("id", 1));
        let result = mediator.execute(&request, &Principal::user(7)).await;
        assert!(matches!(result, Err(Error::NoColumnsAllowed { .. })));
    }

    #[tokio::test]
    async fn test_store_failure_wrapped() {
        let (mediator, _) = mediator(vec![], 100);
        let request = OperationRequest::insert("ghosts", json!({"a": 1}));
        let result = mediator.execute(&request, &Principal::admin(1)).await;
        assert!(matches!(result, Err(Error::StoreError(_))));
    }

    #[test]
    fn test_outcome_serialization() {
        let value = serde_json::to_value(ExecutionOutcome::Upserted(4)).unwrap();
        assert_eq!(value, json!({"kind": "upserted", "result": 4}));
    }
}
