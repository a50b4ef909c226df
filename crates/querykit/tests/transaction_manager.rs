//! TransactionManager against an in-memory pool that records every statement.

use futures_util::FutureExt;
use querykit::{
    CompiledQuery, ConnectionPool, DbError, DbResult, Executor, IsolationLevel, SearchSpec,
    TransactionConnection, TransactionManager, TransactionOptions,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Log(Mutex<Vec<String>>);

impl Log {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct MockConn {
    log: Arc<Log>,
    fail_on: Option<&'static str>,
}

impl TransactionConnection for MockConn {
    async fn batch_execute(&self, sql: &str) -> DbResult<()> {
        self.log.push(sql);
        if self.fail_on.is_some_and(|f| sql.starts_with(f)) {
            return Err(DbError::Other(format!("{sql} failed")));
        }
        Ok(())
    }
}

impl Executor for MockConn {
    type Row = String;

    async fn execute(&self, query: &CompiledQuery) -> DbResult<Vec<String>> {
        self.log.push(query.sql.clone());
        Ok(vec![format!("{} params", query.values.len())])
    }
}

#[derive(Default)]
struct MockPool {
    log: Arc<Log>,
    fail_on: Option<&'static str>,
    fail_acquire: bool,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl MockPool {
    fn failing_on(statement: &'static str) -> Self {
        Self {
            fail_on: Some(statement),
            ..Self::default()
        }
    }

    fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl ConnectionPool for MockPool {
    type Connection = MockConn;

    async fn acquire(&self) -> DbResult<MockConn> {
        if self.fail_acquire {
            return Err(DbError::Connection("pool exhausted".to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(MockConn {
            log: Arc::clone(&self.log),
            fail_on: self.fail_on,
        })
    }

    fn release(&self, _connection: MockConn) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.log.push("RELEASE");
    }
}

#[tokio::test]
async fn commits_on_success() {
    let pool = MockPool::default();
    let value = TransactionManager::new(&pool)
        .execute(|conn| {
            async move {
                conn.batch_execute("UPDATE accounts SET balance = balance - 10").await?;
                Ok(42)
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(
        pool.log.entries(),
        vec!["BEGIN", "UPDATE accounts SET balance = balance - 10", "COMMIT", "RELEASE"]
    );
    assert_eq!(pool.released(), 1);
}

#[tokio::test]
async fn sets_isolation_level_after_begin() {
    let pool = MockPool::default();
    TransactionManager::new(&pool)
        .isolation_level(IsolationLevel::Serializable)
        .execute(|_conn| async { Ok(()) }.boxed())
        .await
        .unwrap();

    assert_eq!(
        pool.log.entries(),
        vec!["BEGIN", "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE", "COMMIT", "RELEASE"]
    );
}

#[tokio::test]
async fn rolls_back_and_returns_work_error() {
    let pool = MockPool::default();
    let err = TransactionManager::new(&pool)
        .execute(|_conn| async { Err::<(), _>(DbError::validation("insufficient funds")) }.boxed())
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert!(err.to_string().contains("insufficient funds"));
    assert_eq!(pool.log.entries(), vec!["BEGIN", "ROLLBACK", "RELEASE"]);
    assert_eq!(pool.released(), 1);
}

#[tokio::test]
async fn timeout_rolls_back_and_reports_label() {
    let pool = MockPool::default();
    let err = TransactionManager::new(&pool)
        .timeout(Duration::from_millis(20))
        .label("nightly-report")
        .execute(|conn| {
            async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                conn.batch_execute("UPDATE never").await?;
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap_err();

    match &err {
        DbError::TransactionTimeout { label, timeout } => {
            assert_eq!(label, "nightly-report");
            assert_eq!(*timeout, Duration::from_millis(20));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(err.to_string().contains("nightly-report"));
    assert_eq!(pool.log.entries(), vec!["BEGIN", "ROLLBACK", "RELEASE"]);
    assert_eq!(pool.released(), 1);
}

#[tokio::test]
async fn work_that_finishes_in_time_commits() {
    let pool = MockPool::default();
    let value = TransactionManager::new(&pool)
        .timeout(Duration::from_secs(5))
        .execute(|_conn| async { Ok("done") }.boxed())
        .await
        .unwrap();
    assert_eq!(value, "done");
    assert_eq!(pool.log.entries(), vec!["BEGIN", "COMMIT", "RELEASE"]);
}

#[tokio::test]
async fn failed_rollback_keeps_original_error() {
    let pool = MockPool::failing_on("ROLLBACK");
    let err = TransactionManager::new(&pool)
        .execute(|_conn| async { Err::<(), _>(DbError::Other("original".to_string())) }.boxed())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "original");
    assert_eq!(pool.released(), 1);
}

#[tokio::test]
async fn begin_failure_releases_without_rollback() {
    let pool = MockPool::failing_on("BEGIN");
    let err = TransactionManager::new(&pool)
        .execute(|_conn| async { Ok(()) }.boxed())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("BEGIN failed"));
    assert_eq!(pool.log.entries(), vec!["BEGIN", "RELEASE"]);
}

#[tokio::test]
async fn isolation_failure_rolls_back() {
    let pool = MockPool::failing_on("SET TRANSACTION");
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_in_work = Arc::clone(&ran);
    let err = TransactionManager::new(&pool)
        .isolation_level(IsolationLevel::RepeatableRead)
        .execute(move |_conn| {
            async move {
                ran_in_work.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("SET TRANSACTION"));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(
        pool.log.entries(),
        vec![
            "BEGIN",
            "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            "ROLLBACK",
            "RELEASE"
        ]
    );
}

#[tokio::test]
async fn commit_failure_is_returned() {
    let pool = MockPool::failing_on("COMMIT");
    let err = TransactionManager::new(&pool)
        .execute(|_conn| async { Ok(1) }.boxed())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("COMMIT failed"));
    assert_eq!(pool.released(), 1);
}

#[tokio::test]
async fn acquire_failure_releases_nothing() {
    let pool = MockPool {
        fail_acquire: true,
        ..MockPool::default()
    };
    let err = TransactionManager::new(&pool)
        .execute(|_conn| async { Ok(()) }.boxed())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Connection(_)));
    assert_eq!(pool.released(), 0);
    assert!(pool.log.entries().is_empty());
}

#[tokio::test]
async fn abandoned_transaction_still_releases() {
    let pool = MockPool::default();
    let manager = TransactionManager::new(&pool);
    let outer = tokio::time::timeout(
        Duration::from_millis(20),
        manager.execute(|_conn| {
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }
            .boxed()
        }),
    )
    .await;

    assert!(outer.is_err());
    assert_eq!(pool.acquired(), 1);
    assert_eq!(pool.released(), 1);
    assert!(!pool.log.entries().contains(&"COMMIT".to_string()));
}

#[tokio::test]
async fn concurrent_transactions_use_separate_connections() {
    let pool = MockPool::default();
    let a = TransactionManager::new(&pool).label("a");
    let b = TransactionManager::new(&pool).label("b");

    let (ra, rb) = futures_util::future::join(
        a.execute(|_conn| async { Ok(1) }.boxed()),
        b.execute(|_conn| async { Err::<i32, _>(DbError::Other("b failed".into())) }.boxed()),
    )
    .await;

    assert_eq!(ra.unwrap(), 1);
    assert!(rb.is_err());
    assert_eq!(pool.acquired(), 2);
    assert_eq!(pool.released(), 2);
}

#[tokio::test]
async fn builder_runs_inside_transaction() {
    let pool = MockPool::default();
    let rows = querykit::transaction(
        &pool,
        TransactionOptions::new().isolation_level_str("read_committed").unwrap(),
        |conn| {
            async move {
                querykit::select("accounts", conn)
                    .filter(SearchSpec::new().value("id", 7))
                    .execute()
                    .await
            }
            .boxed()
        },
    )
    .await
    .unwrap();

    assert_eq!(rows, vec!["1 params".to_string()]);
    assert_eq!(
        pool.log.entries(),
        vec![
            "BEGIN",
            "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            "SELECT * FROM accounts WHERE id = $1",
            "COMMIT",
            "RELEASE"
        ]
    );
}

#[test]
fn invalid_isolation_token_fails_at_construction() {
    let err = TransactionOptions::new()
        .isolation_level_str("eventually-consistent")
        .unwrap_err();
    assert!(err.is_validation());
}
