//! MySQL source reader implementation.
//!
//! Catalog queries use `information_schema`; rows are streamed over the text
//! protocol so every value arrives exactly as the server renders it.

use async_trait::async_trait;
use futures::StreamExt;
use mysql_async::prelude::*;
use mysql_async::{from_value_opt, Conn, Pool, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::core::identifier::quote_mysql;
use crate::core::schema::{ColumnDescriptor, RoutineKind, TableInfo};
use crate::core::traits::SourceReader;
use crate::core::value::{Row, SlotKind, SqlValue};
use crate::error::{CopyError, Result};
use crate::typemap::RowLayout;

use super::session::{build_pool, SessionSettings};

/// MySQL source reader.
pub struct MysqlReader {
    pool: Pool,
}

impl MysqlReader {
    /// Create a new MySQL reader and verify connectivity.
    pub async fn new(
        conn: &ConnectionConfig,
        session: &SessionSettings,
        max_conns: usize,
    ) -> Result<Self> {
        let pool = build_pool(conn, session, max_conns)?;
        let reader = Self { pool };

        reader
            .conn("testing MySQL source connection")
            .await?
            .query_drop("SELECT 1")
            .await
            .map_err(|e| CopyError::pool(e, "testing MySQL source connection"))?;

        info!("Connected to MySQL source: {}", conn.describe());
        Ok(reader)
    }

    async fn conn(&self, context: &str) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| CopyError::pool(e, context.to_string()))
    }

    /// Read a `SHOW CREATE ...` statement and pull out one named column.
    async fn show_create(&self, sql: &str, column: &str) -> Result<String> {
        let mut conn = self.conn("reading object definition").await?;
        let row: Option<mysql_async::Row> = conn
            .query_first(sql)
            .await
            .map_err(|e| CopyError::SchemaExtraction(format!("{}: {}", sql, e)))?;
        let row = row.ok_or_else(|| CopyError::SchemaExtraction(format!("{}: no rows", sql)))?;
        named_column::<String>(&row, column).ok_or_else(|| {
            CopyError::SchemaExtraction(format!(
                "{}: column '{}' missing or NULL (insufficient privileges?)",
                sql, column
            ))
        })
    }
}

/// Fetch a column by name, case-insensitively. NULL and absent both give `None`.
fn named_column<T: FromValue>(row: &mysql_async::Row, name: &str) -> Option<T> {
    let idx = row
        .columns_ref()
        .iter()
        .position(|c| c.name_str().eq_ignore_ascii_case(name))?;
    row.get_opt::<T, usize>(idx)?.ok()
}

fn column_from_row(row: &mysql_async::Row) -> Result<ColumnDescriptor> {
    let name: String = named_column(row, "COLUMN_NAME")
        .ok_or_else(|| CopyError::SchemaExtraction("COLUMNS row without COLUMN_NAME".into()))?;
    let ordinal: u32 = named_column(row, "ORDINAL_POSITION").ok_or_else(|| {
        CopyError::SchemaExtraction(format!("column {} has no ORDINAL_POSITION", name))
    })?;
    let data_type: String = named_column(row, "DATA_TYPE").ok_or_else(|| {
        CopyError::SchemaExtraction(format!("column {} has no DATA_TYPE", name))
    })?;
    let column_type: String = named_column(row, "COLUMN_TYPE").unwrap_or_else(|| data_type.clone());
    // Older servers have no GENERATION_EXPRESSION column at all.
    let generation: Option<String> = named_column(row, "GENERATION_EXPRESSION");

    Ok(ColumnDescriptor::new(
        name,
        ordinal,
        data_type,
        column_type,
        generation,
    ))
}

/// Kills the running statement of a connection unless disarmed.
///
/// Dropping a connection mid-result makes the pool drain the remaining rows,
/// which for a large table means reading it to the end.
struct QueryGuard {
    pool: Pool,
    connection_id: u32,
    armed: bool,
}

impl QueryGuard {
    fn new(pool: Pool, connection_id: u32) -> Self {
        Self {
            pool,
            connection_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for QueryGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let pool = self.pool.clone();
        let id = self.connection_id;
        handle.spawn(async move {
            match pool.get_conn().await {
                Ok(mut conn) => {
                    if let Err(e) = conn.query_drop(format!("KILL QUERY {}", id)).await {
                        warn!("Failed to kill source query on connection {}: {}", id, e);
                    } else {
                        debug!("Killed source query on connection {}", id);
                    }
                }
                Err(e) => warn!("Failed to kill source query on connection {}: {}", id, e),
            }
        });
    }
}

/// Decode one text-protocol row according to the layout.
fn decode_row(table: &str, layout: &RowLayout, mut row: mysql_async::Row) -> Result<Row> {
    if row.len() != layout.len() {
        return Err(CopyError::transfer(
            table,
            format!("source returned {} columns, expected {}", row.len(), layout.len()),
        ));
    }
    let mut values = Vec::with_capacity(layout.len());
    for (i, column) in layout.columns().iter().enumerate() {
        let raw = row.take::<Value, usize>(i).unwrap_or(Value::NULL);
        let value = decode_value(column.kind, raw).map_err(|e| {
            CopyError::transfer(table, format!("column {}: {}", column.name, e))
        })?;
        values.push(value);
    }
    Ok(values)
}

fn decode_value(kind: SlotKind, value: Value) -> std::result::Result<SqlValue, String> {
    if value == Value::NULL {
        return Ok(SqlValue::Null(kind));
    }
    let decoded = match kind {
        SlotKind::I8 => from_value_opt::<i8>(value).map(SqlValue::I8),
        SlotKind::I16 => from_value_opt::<i16>(value).map(SqlValue::I16),
        SlotKind::I32 => from_value_opt::<i32>(value).map(SqlValue::I32),
        SlotKind::I64 => from_value_opt::<i64>(value).map(SqlValue::I64),
        SlotKind::U8 => from_value_opt::<u8>(value).map(SqlValue::U8),
        SlotKind::U16 => from_value_opt::<u16>(value).map(SqlValue::U16),
        SlotKind::U32 => from_value_opt::<u32>(value).map(SqlValue::U32),
        SlotKind::U64 => from_value_opt::<u64>(value).map(SqlValue::U64),
        SlotKind::F64 => from_value_opt::<f64>(value).map(SqlValue::F64),
        SlotKind::Literal => return server_text(value).map(SqlValue::Literal),
        SlotKind::Temporal => return server_text(value).map(SqlValue::Text),
        SlotKind::Binary => from_value_opt::<Vec<u8>>(value).map(SqlValue::Bytes),
        SlotKind::Text => from_value_opt::<String>(value).map(SqlValue::Text),
        SlotKind::Json => from_value_opt::<String>(value).map(SqlValue::Json),
        SlotKind::Opaque => from_value_opt::<Vec<u8>>(value).map(SqlValue::Opaque),
    };
    decoded.map_err(|e| e.to_string())
}

/// The server's own rendering of a value.
///
/// The text protocol always yields bytes; the other arms only matter for
/// values produced by prepared statements.
fn server_text(value: Value) -> std::result::Result<String, String> {
    match value {
        Value::Bytes(bytes) => String::from_utf8(bytes).map_err(|e| e.to_string()),
        Value::Int(v) => Ok(v.to_string()),
        Value::UInt(v) => Ok(v.to_string()),
        Value::Double(v) => Ok(v.to_string()),
        Value::Float(v) => Ok(v.to_string()),
        Value::Date(y, mo, d, h, mi, s, us) => {
            let mut text = format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, mo, d, h, mi, s);
            if us > 0 {
                text.push_str(&format!(".{:06}", us));
            }
            Ok(text)
        }
        Value::Time(neg, days, h, mi, s, us) => {
            let hours = days * 24 + u32::from(h);
            let mut text = format!(
                "{}{:02}:{:02}:{:02}",
                if neg { "-" } else { "" },
                hours,
                mi,
                s
            );
            if us > 0 {
                text.push_str(&format!(".{:06}", us));
            }
            Ok(text)
        }
        Value::NULL => Err("unexpected NULL".to_string()),
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let mut conn = self.conn("listing source tables").await?;
        let rows: Vec<(String, u64)> = conn
            .query(
                r#"
                SELECT
                    CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME,
                    CAST(COALESCE(DATA_LENGTH, 0) + COALESCE(INDEX_LENGTH, 0) AS UNSIGNED) AS size_bytes
                FROM information_schema.TABLES
                WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
                "#,
            )
            .await
            .map_err(|e| CopyError::SchemaExtraction(format!("listing tables: {}", e)))?;

        debug!("Source catalog has {} tables", rows.len());
        Ok(rows
            .into_iter()
            .map(|(name, size)| TableInfo::new(name, size))
            .collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let mut conn = self.conn("loading MySQL columns").await?;
        let rows: Vec<mysql_async::Row> = conn
            .exec(
                "SELECT * FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION",
                (table,),
            )
            .await
            .map_err(|e| CopyError::SchemaExtraction(format!("columns of {}: {}", table, e)))?;

        if rows.is_empty() {
            return Err(CopyError::TableNotFound(table.to_string()));
        }
        rows.iter().map(column_from_row).collect()
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let mut conn = self.conn("counting rows").await?;
        let count: Option<i64> = conn
            .query_first(format!("SELECT COUNT(*) FROM {}", quote_mysql(table)?))
            .await
            .map_err(|e| CopyError::transfer(table, format!("count failed: {}", e)))?;
        Ok(count.unwrap_or(0))
    }

    async fn show_create_table(&self, table: &str) -> Result<String> {
        self.show_create(
            &format!("SHOW CREATE TABLE {}", quote_mysql(table)?),
            "Create Table",
        )
        .await
    }

    async fn list_triggers(&self, table: &str) -> Result<Vec<String>> {
        let mut conn = self.conn("listing triggers").await?;
        conn.exec(
            "SELECT CAST(TRIGGER_NAME AS CHAR(255)) FROM information_schema.TRIGGERS \
             WHERE TRIGGER_SCHEMA = DATABASE() AND EVENT_OBJECT_TABLE = ? \
             ORDER BY ACTION_TIMING, EVENT_MANIPULATION, ACTION_ORDER",
            (table,),
        )
        .await
        .map_err(|e| CopyError::SchemaExtraction(format!("triggers of {}: {}", table, e)))
    }

    async fn show_create_trigger(&self, trigger: &str) -> Result<String> {
        self.show_create(
            &format!("SHOW CREATE TRIGGER {}", quote_mysql(trigger)?),
            "SQL Original Statement",
        )
        .await
    }

    async fn list_routines(&self, kind: RoutineKind) -> Result<Vec<String>> {
        let mut conn = self.conn("listing routines").await?;
        let result: std::result::Result<Vec<String>, mysql_async::Error> = match kind {
            RoutineKind::View => {
                conn.query(
                    "SELECT CAST(TABLE_NAME AS CHAR(255)) FROM information_schema.VIEWS \
                     WHERE TABLE_SCHEMA = DATABASE() ORDER BY TABLE_NAME",
                )
                .await
            }
            RoutineKind::Function | RoutineKind::Procedure => {
                conn.exec(
                    "SELECT CAST(ROUTINE_NAME AS CHAR(255)) FROM information_schema.ROUTINES \
                     WHERE ROUTINE_SCHEMA = DATABASE() AND ROUTINE_TYPE = ? \
                     ORDER BY ROUTINE_NAME",
                    (kind.keyword(),),
                )
                .await
            }
        };
        result.map_err(|e| CopyError::SchemaExtraction(format!("listing {}s: {}", kind, e)))
    }

    async fn show_create_routine(&self, kind: RoutineKind, name: &str) -> Result<String> {
        self.show_create(
            &format!("SHOW CREATE {} {}", kind.keyword(), quote_mysql(name)?),
            kind.create_column(),
        )
        .await
    }

    async fn stream_rows(
        &self,
        table: &str,
        layout: &RowLayout,
        tx: mpsc::Sender<Row>,
    ) -> Result<u64> {
        let mut conn = self.conn("streaming rows").await?;
        let mut guard = QueryGuard::new(self.pool.clone(), conn.id());

        let sql = format!(
            "SELECT /*+ MAX_EXECUTION_TIME(2147483647) */ {} FROM {}",
            layout.column_list(),
            quote_mysql(table)?
        );
        debug!("{}: {}", table, sql);

        let mut result = conn
            .query_iter(sql)
            .await
            .map_err(|e| CopyError::transfer(table, format!("source query failed: {}", e)))?;

        let mut sent = 0u64;
        let stream = result
            .stream::<mysql_async::Row>()
            .await
            .map_err(|e| CopyError::transfer(table, format!("source cursor failed: {}", e)))?;

        if let Some(stream) = stream {
            tokio::pin!(stream);
            while let Some(row) = stream.next().await {
                let row = row
                    .map_err(|e| CopyError::transfer(table, format!("source read failed: {}", e)))?;
                let values = decode_row(table, layout, row)?;
                if tx.send(values).await.is_err() {
                    debug!("{}: writer went away after {} rows", table, sent);
                    return Ok(sent);
                }
                sent += 1;
            }
        }

        guard.disarm();
        Ok(sent)
    }

    async fn ping(&self) -> Result<()> {
        self.conn("pinging source")
            .await?
            .query_drop("SELECT 1")
            .await
            .map_err(|e| CopyError::pool(e, "pinging source"))
    }

    async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}
