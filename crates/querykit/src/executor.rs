//! Executor capability: the only thing the builder needs to run a statement.

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::value::Value;
use std::future::Future;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// Final SQL text with its bound values, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub values: Vec<Value>,
}

impl CompiledQuery {
    pub fn new(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    /// Borrow the values as `tokio_postgres` parameters.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
    }
}

/// Runs a compiled statement and returns its rows unmodified.
///
/// Implemented for `tokio_postgres` clients and transactions (and the
/// `deadpool_postgres` wrappers with the `pool` feature). Implement it for
/// other clients to use the builder with them; override [`Executor::dialect`]
/// for clients that expect `?` placeholders.
pub trait Executor: Send + Sync {
    type Row: Send;

    /// Placeholder style expected by this executor.
    fn dialect(&self) -> Dialect {
        Dialect::Numbered
    }

    fn execute(
        &self,
        query: &CompiledQuery,
    ) -> impl Future<Output = DbResult<Vec<Self::Row>>> + Send;
}

impl Executor for tokio_postgres::Client {
    type Row = Row;

    async fn execute(&self, query: &CompiledQuery) -> DbResult<Vec<Row>> {
        let params = query.params_ref();
        tokio_postgres::Client::query(self, &query.sql, &params)
            .await
            .map_err(DbError::from_db_error)
    }
}

impl Executor for tokio_postgres::Transaction<'_> {
    type Row = Row;

    async fn execute(&self, query: &CompiledQuery) -> DbResult<Vec<Row>> {
        let params = query.params_ref();
        tokio_postgres::Transaction::query(self, &query.sql, &params)
            .await
            .map_err(DbError::from_db_error)
    }
}

#[cfg(feature = "pool")]
impl Executor for deadpool_postgres::Client {
    type Row = Row;

    async fn execute(&self, query: &CompiledQuery) -> DbResult<Vec<Row>> {
        // Deref target is the wrapped tokio_postgres::Client.
        let client: &tokio_postgres::Client = self;
        Executor::execute(client, query).await
    }
}

#[cfg(feature = "pool")]
impl Executor for deadpool_postgres::Transaction<'_> {
    type Row = Row;

    async fn execute(&self, query: &CompiledQuery) -> DbResult<Vec<Row>> {
        let tx: &tokio_postgres::Transaction<'_> = self;
        Executor::execute(tx, query).await
    }
}

impl<E: Executor> Executor for &E {
    type Row = E::Row;

    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn execute(
        &self,
        query: &CompiledQuery,
    ) -> impl Future<Output = DbResult<Vec<Self::Row>>> + Send {
        (**self).execute(query)
    }
}
