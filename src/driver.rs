//! Driver seam.
//!
//! The mapping layer never talks to a database directly. A driver exposes
//! a base [`Connection`] that can prepare statements and begin
//! transactions; prepared [`Statement`]s execute or query with positional
//! arguments and must be closed by the caller.

use crate::error::Result;
use crate::types::Value;
use std::future::Future;
use std::sync::Arc;

/// Outcome of an INSERT/UPDATE/DELETE or procedure call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows changed by the statement.
    pub rows_affected: u64,
    /// Identity generated by an insert, when the driver reports one.
    pub last_insert_id: Option<i64>,
}

/// Rows returned by a query, each aligned with `columns`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Result column names, in select order.
    pub columns: Vec<String>,
    /// Cell values per row.
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Build a result from column names and row values.
    pub fn new<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: rows.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over rows.
    pub fn iter(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

/// A prepared statement.
pub trait Statement: Send {
    /// Execute with positional arguments.
    fn execute(&mut self, args: &[Value]) -> impl Future<Output = Result<ExecResult>> + Send;

    /// Query with positional arguments, returning all rows.
    fn query(&mut self, args: &[Value]) -> impl Future<Output = Result<QueryResult>> + Send;

    /// Release the statement.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// An open transaction.
pub trait Transaction: Send {
    type Statement: Statement;

    /// Prepare a statement inside the transaction.
    fn prepare(&mut self, sql: &str) -> impl Future<Output = Result<Self::Statement>> + Send;

    /// Commit the transaction.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    /// Roll the transaction back.
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}

/// A base connection (or pool) shared by sessions.
pub trait Connection: Send + Sync {
    type Statement: Statement;
    type Transaction: Transaction<Statement = Self::Statement>;

    /// Prepare a statement outside any transaction.
    fn prepare(&self, sql: &str) -> impl Future<Output = Result<Self::Statement>> + Send;

    /// Start a transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send;
}

impl<C: Connection> Connection for Arc<C> {
    type Statement = C::Statement;
    type Transaction = C::Transaction;

    fn prepare(&self, sql: &str) -> impl Future<Output = Result<Self::Statement>> + Send {
        (**self).prepare(sql)
    }

    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send {
        (**self).begin()
    }
}
