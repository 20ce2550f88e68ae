//! Core Database Backend Traits
//!
//! This module defines the record-level contract between the ORM runtime and a
//! database driver. Drivers receive plain attribute maps and never see models,
//! observers or events.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{DriverKind, Filter, Record};
use crate::config::ConnectionConfig;
use crate::context::Context;
use crate::error::{OrmError, OrmResult};
use crate::transaction::TransactionConfig;

/// Connection-level driver handle.
///
/// Every call receives the ambient [`Context`]; drivers are expected to stop
/// work and fail when it is cancelled or past its deadline.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Backend type of this driver
    fn kind(&self) -> DriverKind;

    /// Insert a row and return its primary key
    async fn insert(
        &self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        record: Record,
    ) -> OrmResult<i64>;

    /// Overwrite the given columns of one row, returning affected rows
    async fn update(
        &self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        id: i64,
        record: Record,
    ) -> OrmResult<u64>;

    /// Permanently remove one row, returning affected rows
    async fn delete(&self, ctx: &Context, table: &str, primary_key: &str, id: i64)
        -> OrmResult<u64>;

    /// Rows matching `filter`, ordered by primary key
    async fn select(
        &self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        filter: &Filter,
    ) -> OrmResult<Vec<Record>>;

    /// Begin a transaction
    async fn begin(
        &self,
        ctx: &Context,
        config: &TransactionConfig,
    ) -> OrmResult<Box<dyn DriverTransaction>>;

    /// Round-trip to the backend and report the latency
    async fn health_check(&self, ctx: &Context) -> OrmResult<Duration>;

    fn is_closed(&self) -> bool;

    /// Close the driver; later calls fail with a connection error
    async fn close(&self);

    /// Access the concrete driver, e.g. to reach the underlying sqlx pool
    fn as_any(&self) -> &dyn Any;
}

/// Transaction-scoped driver handle.
///
/// Dropping an unfinished transaction must discard its writes.
#[async_trait]
pub trait DriverTransaction: Send {
    async fn insert(
        &mut self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        record: Record,
    ) -> OrmResult<i64>;

    async fn update(
        &mut self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        id: i64,
        record: Record,
    ) -> OrmResult<u64>;

    async fn delete(
        &mut self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        id: i64,
    ) -> OrmResult<u64>;

    async fn select(
        &mut self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        filter: &Filter,
    ) -> OrmResult<Vec<Record>>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> OrmResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> OrmResult<()>;
}

/// Factory that turns a connection definition into a live driver
pub trait DatabaseBackend: Send + Sync {
    /// Get the backend type
    fn kind(&self) -> DriverKind;

    /// Validate a database URL for this backend
    fn validate_database_url(&self, url: &str) -> OrmResult<()>;

    /// Build a driver for `config`.
    ///
    /// Construction must not require the backend to be reachable; connection
    /// failures surface on first use.
    fn connect(&self, config: &ConnectionConfig) -> OrmResult<Arc<dyn Driver>>;
}

/// Database backend registry for managing multiple backend implementations
#[derive(Clone)]
pub struct BackendRegistry {
    backends: HashMap<DriverKind, Arc<dyn DatabaseBackend>>,
}

impl BackendRegistry {
    /// Create an empty backend registry
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Registry with the bundled PostgreSQL and in-memory backends
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::PostgresBackend::new()));
        registry.register(Arc::new(super::MemoryBackend::new()));
        registry
    }

    /// Register a backend, replacing any previous one of the same kind
    pub fn register(&mut self, backend: Arc<dyn DatabaseBackend>) {
        self.backends.insert(backend.kind(), backend);
    }

    pub fn get(&self, kind: DriverKind) -> Option<Arc<dyn DatabaseBackend>> {
        self.backends.get(&kind).cloned()
    }

    /// Build a driver using the backend registered for the connection's driver
    pub fn connect(&self, config: &ConnectionConfig) -> OrmResult<Arc<dyn Driver>> {
        let backend = self.get(config.driver).ok_or_else(|| {
            OrmError::Configuration(format!(
                "no backend registered for driver '{}' (connection '{}')",
                config.driver, config.name
            ))
        })?;

        backend.validate_database_url(&config.url)?;
        backend.connect(config)
    }

    /// List all registered backend types
    pub fn registered_backends(&self) -> Vec<DriverKind> {
        self.backends.keys().copied().collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
