//! Connection Management
//!
//! The registry of named connections. It is built once from a
//! [`DatabaseConfig`] and never changes afterwards, so lookups need no locking.

pub mod health;

pub use health::*;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backends::BackendRegistry;
use crate::config::DatabaseConfig;
use crate::context::Context;
use crate::error::{OrmError, OrmResult};
use crate::observers::ObserverRegistry;
use crate::query::Query;

/// One base [`Query`] per configured connection plus the default name
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<String, Query>,
    default: String,
}

impl ConnectionRegistry {
    /// Validate `config` and build a driver for every connection.
    ///
    /// Drivers connect lazily, so this never touches the network.
    pub fn from_config(
        config: &DatabaseConfig,
        backends: &BackendRegistry,
        observers: Arc<ObserverRegistry>,
    ) -> OrmResult<Self> {
        config.validate()?;

        let mut connections = HashMap::with_capacity(config.connections.len());
        for connection in &config.connections {
            let driver = backends.connect(connection)?;
            debug!(
                connection = %connection.name,
                driver = %connection.driver,
                url = %connection.redacted_url(),
                "connection registered"
            );
            connections.insert(
                connection.name.clone(),
                Query::new(connection.name.clone(), driver, observers.clone()),
            );
        }

        let registry = Self {
            connections,
            default: config.default.clone(),
        };
        info!(
            connections = ?registry.names(),
            default = %registry.default,
            "database connections initialized"
        );
        Ok(registry)
    }

    /// Base query of `name`
    pub fn get(&self, name: &str) -> OrmResult<&Query> {
        self.connections
            .get(name)
            .ok_or_else(|| OrmError::UnknownConnection(name.to_string()))
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// Configured connection names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.connections.contains_key(name)
    }

    /// Health check every connection, in name order
    pub async fn health_check_all(&self, ctx: &Context) -> Vec<ConnectionHealthReport> {
        let mut reports = Vec::with_capacity(self.connections.len());
        for name in self.names() {
            if let Some(query) = self.connections.get(&name) {
                let driver = query.driver();
                let result = driver.health_check(ctx).await;
                reports.push(ConnectionHealthReport::from_check(&name, driver.kind(), result));
            }
        }
        reports
    }

    /// Close every driver; later operations on any connection fail
    pub async fn close_all(&self) {
        for (name, query) in &self.connections {
            query.driver().close().await;
            debug!(connection = %name, "connection closed");
        }
        info!(count = self.connections.len(), "database connections closed");
    }
}
