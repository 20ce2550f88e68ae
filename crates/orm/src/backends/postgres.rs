//! PostgreSQL Backend Implementation
//!
//! This module provides the PostgreSQL-specific implementation of the database
//! backend traits using sqlx as the underlying database driver. Records travel
//! as JSONB: writes go through `jsonb_populate_record` and reads come back as
//! `to_jsonb(row)`, so no per-column type mapping is needed.

use std::any::Any;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction as SqlxTransaction};
use std::sync::Arc;
use tracing::debug;

use super::core::*;
use super::{DriverKind, Filter, Record};
use crate::config::{ConnectionConfig, PoolConfig};
use crate::context::Context;
use crate::error::{OrmError, OrmResult};
use crate::transaction::TransactionConfig;

/// PostgreSQL database backend implementation
#[derive(Debug)]
pub struct PostgresBackend;

impl PostgresBackend {
    /// Create a new PostgreSQL backend instance
    pub fn new() -> Self {
        Self
    }
}

impl Default for PostgresBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseBackend for PostgresBackend {
    fn kind(&self) -> DriverKind {
        DriverKind::Postgres
    }

    fn validate_database_url(&self, url: &str) -> OrmResult<()> {
        if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
            return Err(OrmError::Configuration(format!(
                "Invalid PostgreSQL URL scheme: {}",
                url.split("://").next().unwrap_or(url)
            )));
        }
        Ok(())
    }

    fn connect(&self, config: &ConnectionConfig) -> OrmResult<Arc<dyn Driver>> {
        Ok(Arc::new(PostgresDriver::connect_lazy(config)?))
    }
}

/// Pool-backed PostgreSQL driver
#[derive(Debug, Clone)]
pub struct PostgresDriver {
    connection: String,
    pool: PgPool,
}

impl PostgresDriver {
    /// Build a lazily connecting pool. No connection is opened until first use.
    pub fn connect_lazy(config: &ConnectionConfig) -> OrmResult<Self> {
        let options = PgConnectOptions::from_str(&config.url).map_err(|e| {
            OrmError::Configuration(format!(
                "Invalid database URL for connection '{}': {}",
                config.name, e
            ))
        })?;

        let pool = pool_options(&config.pool).connect_lazy_with(options);
        debug!(
            connection = %config.name,
            url = %config.redacted_url(),
            max_connections = config.pool.max_connections,
            "created lazy PostgreSQL pool"
        );

        Ok(Self {
            connection: config.name.clone(),
            pool,
        })
    }

    /// The underlying sqlx pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn connection_name(&self) -> &str {
        &self.connection
    }
}

fn pool_options(config: &PoolConfig) -> PgPoolOptions {
    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .test_before_acquire(config.test_before_acquire);

    if let Some(idle_timeout) = config.idle_timeout_seconds {
        options = options.idle_timeout(Duration::from_secs(idle_timeout));
    }

    if let Some(max_lifetime) = config.max_lifetime_seconds {
        options = options.max_lifetime(Duration::from_secs(max_lifetime));
    }

    options
}

#[async_trait]
impl Driver for PostgresDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Postgres
    }

    async fn insert(
        &self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        record: Record,
    ) -> OrmResult<i64> {
        ctx.run(async {
            let mut conn = self.pool.acquire().await?;
            insert_row(&mut conn, table, primary_key, record).await
        })
        .await
    }

    async fn update(
        &self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        id: i64,
        record: Record,
    ) -> OrmResult<u64> {
        ctx.run(async {
            let mut conn = self.pool.acquire().await?;
            update_row(&mut conn, table, primary_key, id, record).await
        })
        .await
    }

    async fn delete(&self, ctx: &Context, table: &str, primary_key: &str, id: i64) -> OrmResult<u64> {
        ctx.run(async {
            let mut conn = self.pool.acquire().await?;
            delete_row(&mut conn, table, primary_key, id).await
        })
        .await
    }

    async fn select(
        &self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        filter: &Filter,
    ) -> OrmResult<Vec<Record>> {
        ctx.run(async {
            let mut conn = self.pool.acquire().await?;
            select_rows(&mut conn, table, primary_key, filter).await
        })
        .await
    }

    async fn begin(
        &self,
        ctx: &Context,
        config: &TransactionConfig,
    ) -> OrmResult<Box<dyn DriverTransaction>> {
        ctx.run(async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| OrmError::Transaction(format!("Failed to begin transaction: {}", e)))?;

            if let Some(isolation_level) = config.isolation_level {
                let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", isolation_level.as_sql());
                sqlx::query(&sql).execute(&mut *tx).await.map_err(|e| {
                    OrmError::Transaction(format!("Failed to set isolation level: {}", e))
                })?;
                debug!("Transaction isolation level set to: {:?}", isolation_level);
            }

            if config.read_only {
                sqlx::query("SET TRANSACTION READ ONLY")
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        OrmError::Transaction(format!("Failed to set read-only mode: {}", e))
                    })?;
            }

            Ok(Box::new(PostgresTransaction { tx: Some(tx) }) as Box<dyn DriverTransaction>)
        })
        .await
    }

    async fn health_check(&self, ctx: &Context) -> OrmResult<Duration> {
        let start = Instant::now();

        ctx.run(async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| OrmError::Connection(format!("Health check failed: {}", e)))
        })
        .await?;

        Ok(start.elapsed())
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// PostgreSQL transaction implementation
pub struct PostgresTransaction {
    tx: Option<SqlxTransaction<'static, Postgres>>,
}

impl PostgresTransaction {
    fn active(&mut self) -> OrmResult<&mut SqlxTransaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| OrmError::Transaction("Transaction already completed".to_string()))
    }
}

#[async_trait]
impl DriverTransaction for PostgresTransaction {
    async fn insert(
        &mut self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        record: Record,
    ) -> OrmResult<i64> {
        ctx.run(async {
            let tx = self.active()?;
            insert_row(&mut **tx, table, primary_key, record).await
        })
        .await
    }

    async fn update(
        &mut self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        id: i64,
        record: Record,
    ) -> OrmResult<u64> {
        ctx.run(async {
            let tx = self.active()?;
            update_row(&mut **tx, table, primary_key, id, record).await
        })
        .await
    }

    async fn delete(
        &mut self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        id: i64,
    ) -> OrmResult<u64> {
        ctx.run(async {
            let tx = self.active()?;
            delete_row(&mut **tx, table, primary_key, id).await
        })
        .await
    }

    async fn select(
        &mut self,
        ctx: &Context,
        table: &str,
        primary_key: &str,
        filter: &Filter,
    ) -> OrmResult<Vec<Record>> {
        ctx.run(async {
            let tx = self.active()?;
            select_rows(&mut **tx, table, primary_key, filter).await
        })
        .await
    }

    async fn commit(mut self: Box<Self>) -> OrmResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| OrmError::Transaction("Transaction already completed".to_string()))?;

        tx.commit()
            .await
            .map_err(|e| OrmError::Transaction(format!("Transaction commit failed: {}", e)))
    }

    async fn rollback(mut self: Box<Self>) -> OrmResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| OrmError::Transaction("Transaction already completed".to_string()))?;

        tx.rollback()
            .await
            .map_err(|e| OrmError::Transaction(format!("Transaction rollback failed: {}", e)))
    }
}

/// Quote an identifier, doubling embedded quotes
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list(record: &Record, prefix: Option<&str>) -> String {
    record
        .keys()
        .map(|column| match prefix {
            Some(prefix) => format!("{}.{}", prefix, quote_ident(column)),
            None => quote_ident(column),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn build_insert_sql(table: &str, primary_key: &str, record: &Record) -> String {
    let table = quote_ident(table);
    let returning = format!("RETURNING {}::bigint", quote_ident(primary_key));

    if record.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES {}", table, returning);
    }

    let columns = column_list(record, None);
    format!(
        "INSERT INTO {table} ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1::jsonb) {returning}",
    )
}

/// `$1` is the JSONB record, `$2` the key. Returns `None` when nothing is set.
pub(crate) fn build_update_sql(table: &str, primary_key: &str, record: &Record) -> Option<String> {
    if record.is_empty() {
        return None;
    }

    let assignments = record
        .keys()
        .map(|column| format!("{} = r.{}", quote_ident(column), quote_ident(column)))
        .collect::<Vec<_>>()
        .join(", ");
    let table = quote_ident(table);

    Some(format!(
        "UPDATE {table} SET {assignments} FROM jsonb_populate_record(NULL::{table}, $1::jsonb) AS r WHERE {table}.{} = $2",
        quote_ident(primary_key)
    ))
}

pub(crate) fn build_delete_sql(table: &str, primary_key: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = $1",
        quote_ident(table),
        quote_ident(primary_key)
    )
}

/// Select SQL plus the JSONB parameters for its non-null conditions
pub(crate) fn build_select_sql(table: &str, primary_key: &str, filter: &Filter) -> (String, Vec<Value>) {
    let mut sql = format!("SELECT to_jsonb(t) FROM {} AS t", quote_ident(table));
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for condition in filter.conditions() {
        let column = format!("t.{}", quote_ident(&condition.column));
        if condition.value.is_null() {
            clauses.push(format!("{} IS NULL", column));
        } else if condition.column == primary_key && condition.value.is_i64() {
            // Compare natively so the primary key index applies
            params.push(condition.value.clone());
            clauses.push(format!("{} = (${}::jsonb)::bigint", column, params.len()));
        } else {
            params.push(condition.value.clone());
            clauses.push(format!("to_jsonb({}) = ${}::jsonb", column, params.len()));
        }
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    sql.push_str(&format!(" ORDER BY t.{}", quote_ident(primary_key)));

    if let Some(limit) = filter.get_limit() {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    (sql, params)
}

async fn insert_row(
    conn: &mut PgConnection,
    table: &str,
    primary_key: &str,
    record: Record,
) -> OrmResult<i64> {
    let sql = build_insert_sql(table, primary_key, &record);
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if !record.is_empty() {
        query = query.bind(Value::Object(record));
    }

    Ok(query.fetch_one(conn).await?)
}

async fn update_row(
    conn: &mut PgConnection,
    table: &str,
    primary_key: &str,
    id: i64,
    record: Record,
) -> OrmResult<u64> {
    let Some(sql) = build_update_sql(table, primary_key, &record) else {
        // Nothing to write; report whether the row exists
        let filter = Filter::new().where_eq(primary_key, id).limit(1);
        return Ok(select_rows(conn, table, primary_key, &filter).await?.len() as u64);
    };

    let result = sqlx::query(&sql)
        .bind(Value::Object(record))
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

async fn delete_row(conn: &mut PgConnection, table: &str, primary_key: &str, id: i64) -> OrmResult<u64> {
    let result = sqlx::query(&build_delete_sql(table, primary_key))
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

async fn select_rows(
    conn: &mut PgConnection,
    table: &str,
    primary_key: &str,
    filter: &Filter,
) -> OrmResult<Vec<Record>> {
    let (sql, params) = build_select_sql(table, primary_key, filter);
    let mut query = sqlx::query_scalar::<_, Value>(&sql);
    for param in params {
        query = query.bind(param);
    }

    query
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(|row| match row {
            Value::Object(record) => Ok(record),
            other => Err(OrmError::Database(format!(
                "expected a JSON object row from '{}', got {}",
                table, other
            ))),
        })
        .collect()
}
