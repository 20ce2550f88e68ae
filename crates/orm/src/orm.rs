//! ORM entry point
//!
//! [`Orm`] is an immutable value bound to one connection and one context.
//! `connection` and `with_context` return new values, so a shared instance can
//! be narrowed per request without affecting other callers.

use std::future::Future;
use std::sync::Arc;

use crate::backends::{BackendRegistry, DatabaseBackend, Driver};
use crate::config::DatabaseConfig;
use crate::connection::{ConnectionHealthReport, ConnectionRegistry};
use crate::context::Context;
use crate::error::{OrmError, OrmResult};
use crate::events::Observer;
use crate::factory::Factory;
use crate::model::Model;
use crate::observers::ObserverRegistry;
use crate::query::Query;
use crate::transaction::TransactionConfig;

#[derive(Debug, Clone)]
pub struct Orm {
    base: Query,
    ctx: Context,
    connections: Arc<ConnectionRegistry>,
    observers: Arc<ObserverRegistry>,
}

impl Orm {
    /// Build an ORM with the bundled backends
    pub fn new(config: DatabaseConfig) -> OrmResult<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> OrmBuilder {
        OrmBuilder::default()
    }

    /// The same ORM bound to another configured connection
    pub fn connection(&self, name: &str) -> OrmResult<Orm> {
        let base = self.connections.get(name)?.clone();
        Ok(Self {
            base,
            ..self.clone()
        })
    }

    /// The same ORM carrying `ctx` into every query, event and transaction
    pub fn with_context(&self, ctx: Context) -> Orm {
        Self {
            ctx,
            ..self.clone()
        }
    }

    pub fn query(&self) -> Query {
        self.base.with_context(self.ctx.clone())
    }

    pub fn db(&self) -> OrmResult<Arc<dyn Driver>> {
        self.base.db()
    }

    pub fn factory(&self) -> Factory {
        self.query().factory()
    }

    /// Register `observer` for model `M`; later registrations of the same
    /// observer are kept and fire again
    pub fn observe<M: Model>(&self, observer: impl Observer + 'static) {
        self.observers.register::<M>(observer);
    }

    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    pub async fn transaction<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(Query) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<OrmError>,
    {
        self.query().transaction(f).await
    }

    pub async fn transaction_with<F, Fut, T, E>(&self, config: TransactionConfig, f: F) -> Result<T, E>
    where
        F: FnOnce(Query) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<OrmError>,
    {
        self.query().transaction_with(config, f).await
    }

    pub fn connection_name(&self) -> &str {
        self.base.connection_name()
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn connection_names(&self) -> Vec<String> {
        self.connections.names()
    }

    pub async fn health_check(&self) -> Vec<ConnectionHealthReport> {
        self.connections.health_check_all(&self.ctx).await
    }

    /// Close every connection, not only the bound one
    pub async fn close(&self) {
        self.connections.close_all().await;
    }
}

/// Builder for [`Orm`] with custom backends or a shared observer registry
#[derive(Default)]
pub struct OrmBuilder {
    config: Option<DatabaseConfig>,
    backends: Option<BackendRegistry>,
    observers: Option<Arc<ObserverRegistry>>,
}

impl OrmBuilder {
    pub fn config(mut self, config: DatabaseConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Add or replace the backend for its driver kind
    pub fn backend(mut self, backend: Arc<dyn DatabaseBackend>) -> Self {
        self.backends
            .get_or_insert_with(BackendRegistry::with_defaults)
            .register(backend);
        self
    }

    pub fn backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn observers(mut self, observers: Arc<ObserverRegistry>) -> Self {
        self.observers = Some(observers);
        self
    }

    pub fn build(self) -> OrmResult<Orm> {
        let config = self
            .config
            .ok_or_else(|| OrmError::Configuration("no database configuration provided".to_string()))?;
        let backends = self.backends.unwrap_or_default();
        let observers = self.observers.unwrap_or_default();

        let connections = ConnectionRegistry::from_config(&config, &backends, observers.clone())?;
        let base = connections.get(connections.default_name())?.clone();

        Ok(Orm {
            base,
            ctx: Context::background(),
            connections: Arc::new(connections),
            observers,
        })
    }
}
