//! In-Memory Backend Implementation
//!
//! An in-process table store with snapshot transactions. Each connection owns
//! its own store. Transactions read from a private snapshot, record their
//! writes in a log and apply the log atomically on commit; rollback and drop
//! discard it.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use super::core::*;
use super::{DriverKind, Filter, Record};
use crate::config::ConnectionConfig;
use crate::context::Context;
use crate::error::{OrmError, OrmResult};
use crate::transaction::TransactionConfig;

type Tables = HashMap<String, BTreeMap<i64, Record>>;

#[derive(Debug, Default)]
struct Store {
    tables: RwLock<Tables>,
    sequences: Mutex<HashMap<String, i64>>,
    closed: AtomicBool,
}

impl Store {
    fn ensure_open(&self, connection: &str) -> OrmResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OrmError::Connection(format!(
                "connection '{}' is closed",
                connection
            )));
        }
        Ok(())
    }

    /// Pick the key for a new row, honouring an explicit key in the record
    fn allocate_id(&self, table: &str, primary_key: &str, record: &Record) -> i64 {
        let mut sequences = self.sequences.lock();
        let current = sequences.entry(table.to_string()).or_insert(0);

        match record.get(primary_key).and_then(Value::as_i64) {
            Some(explicit) if explicit > 0 => {
                *current = (*current).max(explicit);
                explicit
            }
            _ => {
                *current += 1;
                *current
            }
        }
    }
}

fn insert_row(
    tables: &mut Tables,
    table: &str,
    primary_key: &str,
    id: i64,
    mut record: Record,
) -> OrmResult<()> {
    let rows = tables.entry(table.to_string()).or_default();
    if rows.contains_key(&id) {
        return Err(OrmError::Database(format!(
            "duplicate key value violates unique constraint \"{}_pkey\" (id {})",
            table, id
        )));
    }

    record.insert(primary_key.to_string(), Value::from(id));
    rows.insert(id, record);
    Ok(())
}

fn update_row(tables: &mut Tables, table: &str, primary_key: &str, id: i64, record: Record) -> u64 {
    let Some(row) = tables.get_mut(table).and_then(|rows| rows.get_mut(&id)) else {
        return 0;
    };

    for (column, value) in record {
        if column != primary_key {
            row.insert(column, value);
        }
    }
    1
}

fn delete_row(tables: &mut Tables, table: &str, id: i64) -> u64 {
    tables
        .get_mut(table)
        .and_then(|rows| rows.remove(&id))
        .map(|_| 1)
        .unwrap_or(0)
}

fn select_rows(tables: &Tables, table: &str, filter: &Filter) -> Vec<Record> {
    let Some(rows) = tables.get(table) else {
        return Vec::new();
    };

    let matching = rows.values().filter(|row| filter.matches(row)).cloned();
    match filter.get_limit() {
        Some(limit) => matching.take(limit).collect(),
        None => matching.collect(),
    }
}

/// In-memory backend, registered for [`DriverKind::Memory`]
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl MemoryBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DatabaseBackend for MemoryBackend {
    fn kind(&self) -> DriverKind {
        DriverKind::Memory
    }

    fn validate_database_url(&self, _url: &str) -> OrmResult<()> {
        // Any label is accepted; the URL only names the store
        Ok(())
    }

    fn connect(&self, config: &ConnectionConfig) -> OrmResult<Arc<dyn Driver>> {
        Ok(Arc::new(MemoryDriver::new(&config.name)))
    }
}

/// In-process driver with one private store
#[derive(Debug)]
pub struct MemoryDriver {
    connection: String,
    store: Arc<Store>,
}

impl MemoryDriver {
    pub fn new(connection: &str) -> Self {
        Self {
            connection: connection.to_string(),
            store: Arc::new(Store::default()),
        }
    }

    /// Number of committed rows in `table`
    pub fn row_count(&self, table: &str) -> usize {
        self.store
            .tables
            .read()
            .get(table)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Memory
    }

    async fn insert(
        &self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        record: Record,
    ) -> OrmResult<i64> {
        ctx.check()?;
        self.store.ensure_open(&self.connection)?;

        let id = self.store.allocate_id(table, primary_key, &record);
        insert_row(&mut self.store.tables.write(), table, primary_key, id, record)?;
        Ok(id)
    }

    async fn update(
        &self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        id: i64,
        record: Record,
    ) -> OrmResult<u64> {
        ctx.check()?;
        self.store.ensure_open(&self.connection)?;

        Ok(update_row(&mut self.store.tables.write(), table, primary_key, id, record))
    }

    async fn delete(
        &self,
        ctx: &Context,
        table: &str,
        _primary_key: &str,
        id: i64,
    ) -> OrmResult<u64> {
        ctx.check()?;
        self.store.ensure_open(&self.connection)?;

        Ok(delete_row(&mut self.store.tables.write(), table, id))
    }

    async fn select(
        &self,
        ctx: &Context,
        table: &str,
        _primary_key: &str,
        filter: &Filter,
    ) -> OrmResult<Vec<Record>> {
        ctx.check()?;
        self.store.ensure_open(&self.connection)?;

        Ok(select_rows(&self.store.tables.read(), table, filter))
    }

    async fn begin(
        &self,
        ctx: &Context,
        config: &TransactionConfig,
    ) -> OrmResult<Box<dyn DriverTransaction>> {
        ctx.check()?;
        self.store.ensure_open(&self.connection)?;

        let snapshot = self.store.tables.read().clone();
        debug!(
            connection = %self.connection,
            read_only = config.read_only,
            "memory transaction snapshot taken"
        );

        Ok(Box::new(MemoryTransaction {
            connection: self.connection.clone(),
            store: self.store.clone(),
            view: snapshot,
            log: Vec::new(),
            read_only: config.read_only,
        }))
    }

    async fn health_check(&self, ctx: &Context) -> OrmResult<Duration> {
        let start = Instant::now();
        ctx.check()?;
        self.store.ensure_open(&self.connection)?;
        Ok(start.elapsed())
    }

    fn is_closed(&self) -> bool {
        self.store.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.store.closed.store(true, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
enum WriteOp {
    Insert {
        table: String,
        primary_key: String,
        id: i64,
        record: Record,
    },
    Update {
        table: String,
        primary_key: String,
        id: i64,
        record: Record,
    },
    Delete {
        table: String,
        id: i64,
    },
}

/// Snapshot transaction over a [`MemoryDriver`] store
#[derive(Debug)]
pub struct MemoryTransaction {
    connection: String,
    store: Arc<Store>,
    view: Tables,
    log: Vec<WriteOp>,
    read_only: bool,
}

impl MemoryTransaction {
    fn ensure_writable(&self, statement: &str) -> OrmResult<()> {
        if self.read_only {
            return Err(OrmError::Database(format!(
                "cannot execute {} in a read-only transaction",
                statement
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DriverTransaction for MemoryTransaction {
    async fn insert(
        &mut self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        record: Record,
    ) -> OrmResult<i64> {
        ctx.check()?;
        self.store.ensure_open(&self.connection)?;
        self.ensure_writable("INSERT")?;

        let id = self.store.allocate_id(table, primary_key, &record);
        insert_row(&mut self.view, table, primary_key, id, record.clone())?;
        self.log.push(WriteOp::Insert {
            table: table.to_string(),
            primary_key: primary_key.to_string(),
            id,
            record,
        });
        Ok(id)
    }

    async fn update(
        &mut self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        id: i64,
        record: Record,
    ) -> OrmResult<u64> {
        ctx.check()?;
        self.store.ensure_open(&self.connection)?;
        self.ensure_writable("UPDATE")?;

        let affected = update_row(&mut self.view, table, primary_key, id, record.clone());
        if affected > 0 {
            self.log.push(WriteOp::Update {
                table: table.to_string(),
                primary_key: primary_key.to_string(),
                id,
                record,
            });
        }
        Ok(affected)
    }

    async fn delete(
        &mut self,
        ctx: &Context,
        table: &str,
        _primary_key: &str,
        id: i64,
    ) -> OrmResult<u64> {
        ctx.check()?;
        self.store.ensure_open(&self.connection)?;
        self.ensure_writable("DELETE")?;

        let affected = delete_row(&mut self.view, table, id);
        if affected > 0 {
            self.log.push(WriteOp::Delete {
                table: table.to_string(),
                id,
            });
        }
        Ok(affected)
    }

    async fn select(
        &mut self,
        ctx: &Context,
        table: &str,
        _primary_key: &str,
        filter: &Filter,
    ) -> OrmResult<Vec<Record>> {
        ctx.check()?;
        self.store.ensure_open(&self.connection)?;

        Ok(select_rows(&self.view, table, filter))
    }

    async fn commit(self: Box<Self>) -> OrmResult<()> {
        self.store
            .ensure_open(&self.connection)
            .map_err(|e| OrmError::Transaction(format!("Failed to commit transaction: {}", e)))?;

        let this = *self;
        let mut tables = this.store.tables.write();
        let writes = this.log.len();

        for op in this.log {
            match op {
                WriteOp::Insert {
                    table,
                    primary_key,
                    id,
                    mut record,
                } => {
                    record.insert(primary_key, Value::from(id));
                    tables.entry(table).or_default().insert(id, record);
                }
                WriteOp::Update {
                    table,
                    primary_key,
                    id,
                    record,
                } => {
                    update_row(&mut tables, &table, &primary_key, id, record);
                }
                WriteOp::Delete { table, id } => {
                    delete_row(&mut tables, &table, id);
                }
            }
        }

        debug!(connection = %this.connection, writes, "memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> OrmResult<()> {
        self.store
            .ensure_open(&self.connection)
            .map_err(|e| OrmError::Transaction(format!("Failed to rollback transaction: {}", e)))?;

        debug!(
            connection = %self.connection,
            discarded = self.log.len(),
            "memory transaction rolled back"
        );
        Ok(())
    }
}
