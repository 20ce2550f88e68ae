//! Database Backend Abstractions
//!
//! Drivers are the external collaborators that actually talk to a database.
//! The runtime only sees them through the record-level traits in [`core`], so
//! any backend (PostgreSQL, an in-process store, a test double) can sit behind
//! a named connection.

pub mod core;
pub mod memory;
pub mod postgres;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// Re-export core traits and types
pub use self::core::*;
pub use memory::{MemoryBackend, MemoryDriver};
pub use postgres::{PostgresBackend, PostgresDriver};

/// Attribute map of one row, keyed by column name
pub type Record = serde_json::Map<String, Value>;

/// Database driver enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[serde(alias = "postgresql", alias = "pgsql")]
    Postgres,
    MySql,
    #[serde(alias = "sqlite3")]
    Sqlite,
    #[serde(alias = "mssql")]
    SqlServer,
    Memory,
}

impl DriverKind {
    /// Detect the driver from a database URL scheme
    pub fn from_url(url: &str) -> Option<DriverKind> {
        if url.starts_with("postgresql://") || url.starts_with("postgres://") {
            Some(DriverKind::Postgres)
        } else if url.starts_with("mysql://") {
            Some(DriverKind::MySql)
        } else if url.starts_with("sqlite:") || url.starts_with("file:") {
            Some(DriverKind::Sqlite)
        } else if url.starts_with("sqlserver://") || url.starts_with("mssql://") {
            Some(DriverKind::SqlServer)
        } else if url.starts_with("memory:") {
            Some(DriverKind::Memory)
        } else {
            None
        }
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverKind::Postgres => write!(f, "postgres"),
            DriverKind::MySql => write!(f, "mysql"),
            DriverKind::Sqlite => write!(f, "sqlite"),
            DriverKind::SqlServer => write!(f, "sqlserver"),
            DriverKind::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" | "pgsql" => Ok(DriverKind::Postgres),
            "mysql" => Ok(DriverKind::MySql),
            "sqlite" | "sqlite3" => Ok(DriverKind::Sqlite),
            "sqlserver" | "mssql" => Ok(DriverKind::SqlServer),
            "memory" => Ok(DriverKind::Memory),
            _ => Err(format!("Unsupported database driver: {}", s)),
        }
    }
}

/// Single equality condition; a `Null` value matches missing or null columns
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub value: Value,
}

/// Conjunction of equality conditions handed to [`Driver::select`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
    limit: Option<usize>,
    with_trashed: bool,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `column = value` condition
    pub fn where_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    /// Add a `column IS NULL` condition
    pub fn where_null(self, column: &str) -> Self {
        self.where_eq(column, Value::Null)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Include soft-deleted rows
    pub fn with_trashed(mut self) -> Self {
        self.with_trashed = true;
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn get_limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn includes_trashed(&self) -> bool {
        self.with_trashed
    }

    /// Evaluate the conditions against an in-memory record
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|condition| {
            match (&condition.value, record.get(&condition.column)) {
                (Value::Null, None) | (Value::Null, Some(Value::Null)) => true,
                (expected, Some(actual)) => expected == actual,
                (_, None) => false,
            }
        })
    }
}
