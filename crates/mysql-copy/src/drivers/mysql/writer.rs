//! MySQL destination writer implementation.
//!
//! Uses mysql_async for connection pooling and multi-row INSERT statements
//! with bound parameters, split to stay below the server's packet and
//! placeholder limits.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Pool, Transaction, TxOpts, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::core::identifier::quote_mysql;
use crate::core::traits::{DdlExecutor, InsertMode, TargetTransaction, TargetWriter};
use crate::core::value::{Row, SqlValue};
use crate::error::{CopyError, Result};
use crate::typemap::RowLayout;

use super::params::{placeholder, sql_value_to_mysql};
use super::session::{build_pool, SessionSettings};

/// MySQL max placeholders per prepared statement.
const MYSQL_MAX_PLACEHOLDERS: usize = 65535;

/// MySQL destination writer.
pub struct MysqlWriter {
    pool: Pool,
    max_statement_bytes: usize,
}

impl MysqlWriter {
    /// Create a new MySQL writer and verify connectivity.
    pub async fn new(
        conn: &ConnectionConfig,
        session: &SessionSettings,
        max_conns: usize,
        max_statement_bytes: usize,
    ) -> Result<Self> {
        let pool = build_pool(conn, session, max_conns)?;

        pool.get_conn()
            .await
            .map_err(|e| CopyError::pool(e, "creating MySQL target pool"))?
            .query_drop("SELECT 1")
            .await
            .map_err(|e| CopyError::pool(e, "testing MySQL target connection"))?;

        info!("Connected to MySQL target: {}", conn.describe());

        Ok(Self {
            pool,
            max_statement_bytes,
        })
    }

    async fn conn(&self, context: &str) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| CopyError::pool(e, context.to_string()))
    }
}

/// One ready INSERT with its parameters.
#[derive(Debug)]
pub(crate) struct InsertBatch {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Splits rows into INSERT statements bounded by `max_bytes` (statement
/// text plus bound values) and by the placeholder limit.
///
/// A single row larger than the byte limit still goes out on its own.
pub(crate) struct InsertBuilder {
    table: String,
    prefix: String,
    row_placeholders: String,
    max_bytes: usize,
    max_rows: usize,
    sql: String,
    params: Vec<Value>,
    param_bytes: usize,
    rows_in_statement: usize,
}

impl InsertBuilder {
    pub(crate) fn new(
        table: &str,
        layout: &RowLayout,
        mode: InsertMode,
        max_bytes: usize,
        max_placeholders: usize,
    ) -> Result<Self> {
        let prefix = format!(
            "{} {} ({}) VALUES ",
            mode.verb(),
            quote_mysql(table)?,
            layout.column_list()
        );
        let row_placeholders = format!(
            "({})",
            layout.kinds().map(placeholder).collect::<Vec<_>>().join(",")
        );
        Ok(Self {
            table: table.to_string(),
            sql: prefix.clone(),
            prefix,
            row_placeholders,
            max_bytes,
            max_rows: (max_placeholders / layout.len().max(1)).max(1),
            params: Vec::new(),
            param_bytes: 0,
            rows_in_statement: 0,
        })
    }

    /// Add a row; returns a finished batch when the current one is full.
    pub(crate) fn push(&mut self, row: &Row) -> Result<Option<InsertBatch>> {
        let mut row_bytes = 0;
        for value in row {
            if let SqlValue::F64(f) = value {
                if !f.is_finite() {
                    return Err(CopyError::transfer(
                        &self.table,
                        format!("cannot write non-finite float {}", f),
                    ));
                }
            }
            row_bytes += value.encoded_len_hint();
        }

        let mut flushed = None;
        if self.rows_in_statement > 0 {
            let grown = self.sql.len()
                + 1
                + self.row_placeholders.len()
                + self.param_bytes
                + row_bytes;
            if self.rows_in_statement >= self.max_rows || grown > self.max_bytes {
                flushed = self.take();
            }
        }
        if self.rows_in_statement > 0 {
            self.sql.push(',');
        }
        self.sql.push_str(&self.row_placeholders);
        self.params.extend(row.iter().map(sql_value_to_mysql));
        self.param_bytes += row_bytes;
        self.rows_in_statement += 1;
        Ok(flushed)
    }

    /// Finish the pending batch, if any rows were added.
    pub(crate) fn take(&mut self) -> Option<InsertBatch> {
        if self.rows_in_statement == 0 {
            return None;
        }
        self.rows_in_statement = 0;
        self.param_bytes = 0;
        Some(InsertBatch {
            sql: std::mem::replace(&mut self.sql, self.prefix.clone()),
            params: std::mem::take(&mut self.params),
        })
    }
}

async fn exec_batch(conn: &mut Conn, table: &str, batch: InsertBatch) -> Result<u64> {
    conn.exec_drop(batch.sql, batch.params)
        .await
        .map_err(|e| CopyError::transfer(table, format!("insert failed: {}", e)))?;
    Ok(conn.affected_rows())
}

#[async_trait]
impl DdlExecutor for MysqlWriter {
    async fn execute(&self, sql: &str) -> Result<()> {
        let mut conn = self.conn("executing statement").await?;
        conn.query_drop(sql).await?;
        Ok(())
    }
}

#[async_trait]
impl TargetWriter for MysqlWriter {
    async fn insert_rows(
        &self,
        table: &str,
        layout: &RowLayout,
        rows: &[Row],
        mode: InsertMode,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn("inserting rows").await?;
        let mut builder = InsertBuilder::new(
            table,
            layout,
            mode,
            self.max_statement_bytes,
            MYSQL_MAX_PLACEHOLDERS,
        )?;
        let mut affected = 0u64;

        for row in rows {
            layout.check_row(row)?;
            if let Some(batch) = builder.push(row)? {
                affected += exec_batch(&mut conn, table, batch).await?;
            }
        }
        if let Some(batch) = builder.take() {
            affected += exec_batch(&mut conn, table, batch).await?;
        }

        debug!("MySQL: wrote {} rows to {}", rows.len(), table);
        Ok(affected)
    }

    async fn begin(&self) -> Result<Box<dyn TargetTransaction>> {
        let tx = self
            .pool
            .start_transaction(TxOpts::default())
            .await
            .map_err(|e| CopyError::pool(e, "starting transaction"))?;
        Ok(Box::new(MysqlTransaction { tx: Mutex::new(tx) }))
    }

    async fn ping(&self) -> Result<()> {
        self.conn("pinging target")
            .await?
            .query_drop("SELECT 1")
            .await
            .map_err(|e| CopyError::pool(e, "pinging target"))
    }

    async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}

/// A transaction pinned to one pooled connection.
///
/// DDL statements commit implicitly in MySQL, so `rollback` only discards
/// work since the last DDL statement; it does not undo renames.
pub struct MysqlTransaction {
    tx: Mutex<Transaction<'static>>,
}

#[async_trait]
impl DdlExecutor for MysqlTransaction {
    async fn execute(&self, sql: &str) -> Result<()> {
        self.tx.lock().await.query_drop(sql).await?;
        Ok(())
    }
}

#[async_trait]
impl TargetTransaction for MysqlTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.into_inner().commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.into_inner().rollback().await?;
        Ok(())
    }
}
