//! Column filtering against grant restrictions
//!
//! Partial denial filters the projection or field set; total denial is an
//! error, so a caller is never handed a silently empty projection or a no-op
//! write.

use tablegate_common::error::{Error, Result};
use tablegate_common::grant::Grant;
use tablegate_common::types::{is_wildcard, Operation, Row};

/// Applies a grant's column restrictions for one operation
#[derive(Debug, Clone, Copy)]
pub struct ColumnFilter<'a> {
    grant: Option<&'a Grant>,
    operation: Operation,
}

impl<'a> ColumnFilter<'a> {
    pub fn new(grant: Option<&'a Grant>, operation: Operation) -> Self {
        Self { grant, operation }
    }

    /// Whether [`filter_columns`](Self::filter_columns) needs the table's
    /// full column list to expand a wildcard
    pub fn needs_table_columns(&self, requested: &[String]) -> bool {
        is_wildcard(requested)
            && self
                .grant
                .is_some_and(|g| !g.column_restrictions.is_unrestricted())
    }

    /// Compute the permitted projection.
    ///
    /// `table_columns` is only read when the request is a wildcard and the
    /// grant restricts columns.
    pub fn filter_columns(&self, requested: &[String], table_columns: &[String]) -> Result<Vec<String>> {
        let Some(grant) = self.grant else {
            return Ok(requested.to_vec());
        };

        if grant.column_restrictions.is_unrestricted() {
            return Ok(requested.to_vec());
        }

        let candidates = if is_wildcard(requested) {
            table_columns
        } else {
            requested
        };

        let permitted: Vec<String> = candidates
            .iter()
            .filter(|column| grant.is_column_allowed(column))
            .cloned()
            .collect();

        if permitted.is_empty() {
            return Err(self.no_columns(grant));
        }
        Ok(permitted)
    }

    /// Drop fields of an insert/update payload the grant does not permit
    pub fn filter_fields(&self, data: &Row) -> Result<Row> {
        let Some(grant) = self.grant else {
            return Ok(data.clone());
        };

        let permitted: Row = data
            .iter()
            .filter(|(column, _)| grant.is_column_allowed(column))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect();

        if permitted.is_empty() {
            return Err(self.no_columns(grant));
        }
        Ok(permitted)
    }

    fn no_columns(&self, grant: &Grant) -> Error {
        Error::NoColumnsAllowed {
            operation: self.operation,
            table: grant.table_name.clone(),
        }
    }
}
