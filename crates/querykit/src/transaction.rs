//! Managed transactions over a connection pool.
//!
//! [`TransactionManager::execute`] acquires one connection, issues `BEGIN`
//! (plus `SET TRANSACTION ISOLATION LEVEL ...` when configured), runs the
//! caller's unit of work and then commits or rolls back. The connection is
//! released exactly once, including when the returned future is dropped
//! midway.
//!
//! # Example
//!
//! ```ignore
//! use futures_util::FutureExt;
//! use querykit::{IsolationLevel, TransactionManager};
//! use std::time::Duration;
//!
//! let moved = TransactionManager::new(&pool)
//!     .isolation_level(IsolationLevel::Serializable)
//!     .timeout(Duration::from_secs(5))
//!     .label("transfer")
//!     .execute(|conn| {
//!         async move {
//!             debit(conn, from, amount).await?;
//!             credit(conn, to, amount).await?;
//!             Ok(amount)
//!         }
//!         .boxed()
//!     })
//!     .await?;
//! ```

use crate::error::{DbError, DbResult};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

/// Label used when none is configured.
pub const DEFAULT_LABEL: &str = "transaction";

/// SQL transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// The configuration token, e.g. `read-committed`.
    pub fn token(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "read-uncommitted",
            IsolationLevel::ReadCommitted => "read-committed",
            IsolationLevel::RepeatableRead => "repeatable-read",
            IsolationLevel::Serializable => "serializable",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = DbError;

    /// Case-insensitive; `-`, `_` and spaces are interchangeable separators.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '_' | ' ' => '-',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        match normalized.as_str() {
            "read-uncommitted" => Ok(IsolationLevel::ReadUncommitted),
            "read-committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable-read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            _ => Err(DbError::validation(format!(
                "invalid isolation level `{s}`; expected read-uncommitted, read-committed, \
                 repeatable-read or serializable"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for IsolationLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Transaction settings.
///
/// Deserializes from e.g.
/// `{"isolation_level": "repeatable-read", "timeout_ms": 2000, "label": "checkout"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    pub isolation_level: Option<IsolationLevel>,
    /// Deadline for the unit of work; the transaction is rolled back when it
    /// elapses.
    #[serde(rename = "timeout_ms", deserialize_with = "opt_millis")]
    pub timeout: Option<Duration>,
    /// Name reported in logs and in [`DbError::TransactionTimeout`].
    pub label: String,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation_level: None,
            timeout: None,
            label: DEFAULT_LABEL.to_string(),
        }
    }
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    /// Set the isolation level from a configuration token.
    pub fn isolation_level_str(mut self, token: &str) -> DbResult<Self> {
        self.isolation_level = Some(token.parse()?);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

fn opt_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

/// A connection that can run transaction control statements.
///
/// Only [`TransactionConnection::batch_execute`] is required; the control
/// statements have SQL-standard defaults.
pub trait TransactionConnection: Send + Sync {
    /// Run one or more statements without parameters.
    fn batch_execute(&self, sql: &str) -> impl Future<Output = DbResult<()>> + Send;

    fn begin(&self) -> impl Future<Output = DbResult<()>> + Send {
        self.batch_execute("BEGIN")
    }

    /// Must be called right after [`TransactionConnection::begin`].
    fn set_isolation_level(
        &self,
        level: IsolationLevel,
    ) -> impl Future<Output = DbResult<()>> + Send {
        async move {
            let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql());
            self.batch_execute(&sql).await
        }
    }

    fn commit(&self) -> impl Future<Output = DbResult<()>> + Send {
        self.batch_execute("COMMIT")
    }

    fn rollback(&self) -> impl Future<Output = DbResult<()>> + Send {
        self.batch_execute("ROLLBACK")
    }
}

impl TransactionConnection for tokio_postgres::Client {
    async fn batch_execute(&self, sql: &str) -> DbResult<()> {
        tokio_postgres::Client::batch_execute(self, sql)
            .await
            .map_err(DbError::from_db_error)
    }
}

/// Source of connections for [`TransactionManager`].
pub trait ConnectionPool: Send + Sync {
    type Connection: TransactionConnection;

    fn acquire(&self) -> impl Future<Output = DbResult<Self::Connection>> + Send;

    /// Return a connection to the pool. Called exactly once per acquired
    /// connection.
    fn release(&self, connection: Self::Connection);
}

/// Lifecycle of one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Created,
    Begun,
    Committed,
    RolledBack,
    Released,
}

/// How the unit of work settled.
enum WorkOutcome<T> {
    Completed(T),
    Failed(DbError),
    TimedOut(Duration),
}

/// Owns the acquired connection; releases it exactly once, on drop at the
/// latest.
struct TransactionContext<'p, P: ConnectionPool> {
    pool: &'p P,
    connection: Option<P::Connection>,
    state: TransactionState,
}

impl<'p, P: ConnectionPool> TransactionContext<'p, P> {
    fn new(pool: &'p P, connection: P::Connection) -> Self {
        Self {
            pool,
            connection: Some(connection),
            state: TransactionState::Created,
        }
    }

    fn connection(&self) -> DbResult<&P::Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| DbError::Other("transaction connection already released".to_string()))
    }

    fn release(&mut self) {
        if self.state == TransactionState::Released {
            return;
        }
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection);
            #[cfg(feature = "tracing")]
            tracing::trace!(target: "querykit.tx", from = ?self.state, "connection released");
            self.state = TransactionState::Released;
        }
    }
}

impl<P: ConnectionPool> Drop for TransactionContext<'_, P> {
    fn drop(&mut self) {
        #[cfg(feature = "tracing")]
        if self.connection.is_some() && self.state == TransactionState::Begun {
            tracing::warn!(
                target: "querykit.tx",
                "transaction abandoned before it settled; releasing connection"
            );
        }
        self.release();
    }
}

/// Runs units of work inside a transaction on a connection from `pool`.
pub struct TransactionManager<'p, P> {
    pool: &'p P,
    options: TransactionOptions,
}

impl<'p, P: ConnectionPool> TransactionManager<'p, P> {
    pub fn new(pool: &'p P) -> Self {
        Self::with_options(pool, TransactionOptions::default())
    }

    pub fn with_options(pool: &'p P, options: TransactionOptions) -> Self {
        Self { pool, options }
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.options.isolation_level = Some(level);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.options.label = label.into();
        self
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Run `work` in a transaction.
    ///
    /// - `Ok` from `work`: COMMIT, then the value is returned.
    /// - `Err` from `work`: ROLLBACK, then that error is returned unchanged.
    /// - timeout elapsed: the work future is dropped, ROLLBACK, then
    ///   [`DbError::TransactionTimeout`].
    ///
    /// A failing ROLLBACK is logged and does not replace the original error.
    pub async fn execute<T, F>(&self, work: F) -> DbResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c P::Connection) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        let connection = self.pool.acquire().await?;
        let mut ctx = TransactionContext::new(self.pool, connection);
        let result = self.run(&mut ctx, work).await;
        ctx.release();
        result
    }

    async fn run<T, F>(&self, ctx: &mut TransactionContext<'_, P>, work: F) -> DbResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c P::Connection) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        ctx.connection()?.begin().await?;
        ctx.state = TransactionState::Begun;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "querykit.tx",
            label = %self.options.label,
            isolation_level = ?self.options.isolation_level,
            timeout = ?self.options.timeout,
            "transaction begun"
        );

        let conn = ctx.connection()?;
        let outcome = match self.options.isolation_level {
            Some(level) => match conn.set_isolation_level(level).await {
                Ok(()) => self.run_work(conn, work).await,
                Err(err) => WorkOutcome::Failed(err),
            },
            None => self.run_work(conn, work).await,
        };

        match outcome {
            WorkOutcome::Completed(value) => {
                conn.commit().await?;
                ctx.state = TransactionState::Committed;
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    target: "querykit.tx",
                    label = %self.options.label,
                    "transaction committed"
                );
                Ok(value)
            }
            WorkOutcome::Failed(err) => {
                self.rollback(conn).await;
                ctx.state = TransactionState::RolledBack;
                Err(err)
            }
            WorkOutcome::TimedOut(timeout) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    target: "querykit.tx",
                    label = %self.options.label,
                    timeout = ?timeout,
                    "transaction timed out"
                );
                self.rollback(conn).await;
                ctx.state = TransactionState::RolledBack;
                Err(DbError::TransactionTimeout {
                    label: self.options.label.clone(),
                    timeout,
                })
            }
        }
    }

    async fn run_work<'c, T, F>(&self, conn: &'c P::Connection, work: F) -> WorkOutcome<T>
    where
        F: FnOnce(&'c P::Connection) -> BoxFuture<'c, DbResult<T>>,
    {
        let fut = work(conn);
        let result = match self.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => return WorkOutcome::TimedOut(limit),
            },
            None => fut.await,
        };
        match result {
            Ok(value) => WorkOutcome::Completed(value),
            Err(err) => WorkOutcome::Failed(err),
        }
    }

    async fn rollback(&self, conn: &P::Connection) {
        match conn.rollback().await {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    target: "querykit.tx",
                    label = %self.options.label,
                    "transaction rolled back"
                );
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    target: "querykit.tx",
                    label = %self.options.label,
                    error = %_err,
                    "rollback failed; returning the original error"
                );
            }
        }
    }
}

/// Run `work` in a transaction with the given options.
pub async fn transaction<P, T, F>(pool: &P, options: TransactionOptions, work: F) -> DbResult<T>
where
    P: ConnectionPool,
    T: Send,
    F: for<'c> FnOnce(&'c P::Connection) -> BoxFuture<'c, DbResult<T>> + Send,
{
    TransactionManager::with_options(pool, options).execute(work).await
}
