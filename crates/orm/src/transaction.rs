//! Transaction Management
//!
//! Scoped transactions with automatic cleanup: the callback's success commits,
//! its error or panic rolls back.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::backends::{Driver, DriverTransaction};
use crate::context::Context;
use crate::error::{OrmError, OrmResult};
use crate::query::Query;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Read Uncommitted - lowest isolation level
    ReadUncommitted,
    /// Read Committed - default PostgreSQL isolation level
    ReadCommitted,
    /// Repeatable Read - stronger consistency guarantees
    RepeatableRead,
    /// Serializable - highest isolation level
    Serializable,
}

impl IsolationLevel {
    /// Convert to SQL string for SET TRANSACTION ISOLATION LEVEL command
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Transaction configuration options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Transaction isolation level; `None` keeps the backend default
    pub isolation_level: Option<IsolationLevel>,
    /// Whether the transaction is read-only
    pub read_only: bool,
}

impl TransactionConfig {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    pub fn serializable() -> Self {
        Self {
            isolation_level: Some(IsolationLevel::Serializable),
            ..Default::default()
        }
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }
}

/// An open driver transaction shared by the queries bound to it
pub struct TransactionHandle {
    id: Uuid,
    connection: String,
    inner: Mutex<Option<Box<dyn DriverTransaction>>>,
}

impl TransactionHandle {
    pub(crate) async fn begin(
        driver: &dyn Driver,
        ctx: &Context,
        connection: &str,
        config: &TransactionConfig,
    ) -> OrmResult<Self> {
        let id = Uuid::new_v4();
        debug!(transaction = %id, connection, ?config, "beginning transaction");

        let inner = driver.begin(ctx, config).await?;
        Ok(Self {
            id,
            connection: connection.to_string(),
            inner: Mutex::new(Some(inner)),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connection_name(&self) -> &str {
        &self.connection
    }

    /// Whether the transaction has been neither committed nor rolled back
    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Lock the open driver transaction for one operation
    pub(crate) async fn active(&self) -> OrmResult<MappedMutexGuard<'_, Box<dyn DriverTransaction>>> {
        MutexGuard::try_map(self.inner.lock().await, |inner| inner.as_mut()).map_err(|_| {
            OrmError::Transaction(format!("Transaction {} already completed", self.id))
        })
    }

    async fn take(&self) -> OrmResult<Box<dyn DriverTransaction>> {
        self.inner.lock().await.take().ok_or_else(|| {
            OrmError::Transaction(format!("Transaction {} already completed", self.id))
        })
    }

    pub async fn commit(&self) -> OrmResult<()> {
        self.take().await?.commit().await?;
        debug!(transaction = %self.id, connection = %self.connection, "transaction committed");
        Ok(())
    }

    pub async fn rollback(&self) -> OrmResult<()> {
        self.take().await?.rollback().await?;
        debug!(transaction = %self.id, connection = %self.connection, "transaction rolled back");
        Ok(())
    }
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl Drop for TransactionHandle {
    fn drop(&mut self) {
        if self.inner.get_mut().is_some() {
            warn!(
                transaction = %self.id,
                connection = %self.connection,
                "Transaction dropped without explicit commit or rollback - will be rolled back"
            );
        }
    }
}

async fn rollback_logged(handle: &TransactionHandle, cause: &str) {
    if let Err(e) = handle.rollback().await {
        error!(
            transaction = %handle.id(),
            connection = %handle.connection_name(),
            error = %e,
            "rollback after {} failed",
            cause
        );
    }
}

/// Run `f` inside a transaction on `base`'s connection.
///
/// `Ok` commits, `Err` rolls back and is returned unchanged, a panic rolls back
/// and resumes unwinding. On a query that is already transactional, `f` joins
/// the open transaction and the outer scope decides its outcome.
pub(crate) async fn run_in_transaction<F, Fut, T, E>(
    base: &Query,
    config: &TransactionConfig,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(Query) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<OrmError>,
{
    if base.is_transaction() {
        return f(base.clone()).await;
    }

    let driver = base.driver();
    let handle = Arc::new(
        TransactionHandle::begin(driver.as_ref(), base.context(), base.connection_name(), config)
            .await?,
    );
    let tx = base.bind_transaction(handle.clone());

    // f itself may panic before handing back a future
    match AssertUnwindSafe(async move { f(tx).await }).catch_unwind().await {
        Ok(Ok(value)) => {
            handle.commit().await?;
            Ok(value)
        }
        Ok(Err(err)) => {
            rollback_logged(&handle, "callback error").await;
            Err(err)
        }
        Err(panic) => {
            rollback_logged(&handle, "callback panic").await;
            std::panic::resume_unwind(panic)
        }
    }
}
