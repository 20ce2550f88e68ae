//! # keel-orm: multi-connection ORM runtime
//!
//! Named database connections behind one [`Orm`] value, with request context
//! propagation, closure-scoped transactions and per-model observers.
//!
//! ```ignore
//! let orm = Orm::new(DatabaseConfig::from_env()?)?;
//! orm.observe::<User>(UserObserver);
//!
//! let mut user = User { name: "ada".into(), ..Default::default() };
//! orm.with_context(ctx).query().create(&mut user).await?;
//!
//! orm.transaction(|tx| async move {
//!     tx.update(&mut user).await?;
//!     Ok::<_, OrmError>(())
//! })
//! .await?;
//! ```

pub mod backends;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod event_error;
pub mod events;
pub mod factory;
pub mod model;
pub mod observers;
pub mod orm;
pub mod query;
pub mod transaction;

// Re-export core traits and types
pub use backends::{
    BackendRegistry, DatabaseBackend, Driver, DriverKind, DriverTransaction, Filter, MemoryBackend,
    MemoryDriver, PostgresBackend, PostgresDriver, Record,
};
pub use config::{ConfigError, ConnectionConfig, DatabaseConfig, PoolConfig};
pub use connection::{ConnectionHealthReport, ConnectionRegistry, HealthStatus};
pub use context::Context;
pub use error::{OrmError, OrmResult};
pub use event_error::EventError;
pub use events::{Event, ModelEvent, ModelType, Observer};
pub use factory::{Factory, Factoryable};
pub use model::Model;
pub use observers::ObserverRegistry;
pub use orm::{Orm, OrmBuilder};
pub use query::Query;
pub use transaction::{IsolationLevel, TransactionConfig, TransactionHandle};

// Observers are written against async-trait
pub use async_trait::async_trait;
