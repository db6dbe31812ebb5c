//! Capabilities the copy engine needs from the source and the destination.
//!
//! - [`SourceReader`]: catalog queries, DDL retrieval and row streaming
//! - [`DdlExecutor`]: run a single statement
//! - [`TargetWriter`]: batched inserts plus optional transactions
//!
//! The MySQL implementations live in `drivers::mysql`; the orchestration
//! tests drive the same code with in-memory fakes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::typemap::RowLayout;

use super::schema::{ColumnDescriptor, RoutineKind, TableInfo};
use super::value::Row;

/// How rows are written into the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Plain `INSERT`, used for freshly created temp tables.
    #[default]
    Insert,
    /// `INSERT IGNORE`, skipping rows that violate a unique key.
    InsertIgnore,
}

impl InsertMode {
    pub fn verb(&self) -> &'static str {
        match self {
            InsertMode::Insert => "INSERT INTO",
            InsertMode::InsertIgnore => "INSERT IGNORE INTO",
        }
    }
}

/// Source database reader.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// List base tables of the current database with data + index bytes.
    async fn list_tables(&self) -> Result<Vec<TableInfo>>;

    /// Column metadata for a table, ordered by ordinal position.
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// Advisory row count.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// The table's `CREATE TABLE` statement, verbatim.
    async fn show_create_table(&self, table: &str) -> Result<String>;

    /// Names of the triggers defined on a table, in action order.
    async fn list_triggers(&self, table: &str) -> Result<Vec<String>>;

    /// A trigger's original `CREATE TRIGGER` statement.
    async fn show_create_trigger(&self, trigger: &str) -> Result<String>;

    /// Names of functions, procedures or views in the current database.
    async fn list_routines(&self, kind: RoutineKind) -> Result<Vec<String>>;

    /// The `CREATE` statement for a function, procedure or view.
    async fn show_create_routine(&self, kind: RoutineKind, name: &str) -> Result<String>;

    /// Stream every row of `table` into `tx`, decoded per `layout`.
    ///
    /// Returns the number of rows sent. Stops early, without error, when the
    /// receiver is dropped.
    async fn stream_rows(
        &self,
        table: &str,
        layout: &RowLayout,
        tx: mpsc::Sender<Row>,
    ) -> Result<u64>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Release connections.
    async fn close(&self);
}

/// Something that can run a single DDL or DML statement.
#[async_trait]
pub trait DdlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<()>;
}

/// Destination database writer.
#[async_trait]
pub trait TargetWriter: DdlExecutor {
    /// Insert rows into `table` using the column order of `layout`.
    ///
    /// Returns affected rows as reported by the server.
    async fn insert_rows(
        &self,
        table: &str,
        layout: &RowLayout,
        rows: &[Row],
        mode: InsertMode,
    ) -> Result<u64>;

    /// Start a transaction on a dedicated connection.
    async fn begin(&self) -> Result<Box<dyn TargetTransaction>>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Release connections.
    async fn close(&self);
}

/// An open destination transaction.
#[async_trait]
pub trait TargetTransaction: DdlExecutor {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
