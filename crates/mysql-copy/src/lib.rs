//! # mysql-copy
//!
//! Online table copy between two MySQL servers.
//!
//! Every table is rebuilt under a temporary name on the destination, filled
//! by a streaming copy with bounded memory, and swapped into place only after
//! all tables of the run have their data. Foreign keys and triggers are
//! stripped while loading and reattached once every table is back under its
//! real name, so tables can be copied concurrently in any order.
//!
//! - **Streaming transfer** through a bounded queue, batched multi-row inserts
//! - **Largest-first scheduling** with a configurable worker cap
//! - **Insert-ignore mode** for idempotent reruns into existing tables
//! - **Routines**: optional copy of functions, views and procedures
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_copy::{Config, Orchestrator, TableSelection};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mysql_copy::Result<()> {
//!     let config = Config::load("copy.yaml")?;
//!     let orchestrator = Orchestrator::connect(&config).await?;
//!     let selection = TableSelection::tables(["orders", "order_items_*"]);
//!     let result = orchestrator.run(&selection, CancellationToken::new()).await?;
//!     println!("Copied {} rows", result.rows_transferred);
//!     orchestrator.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod swap;
pub mod transfer;
pub mod typemap;

// Re-exports for convenient access
pub use config::{AliasMap, Config, ConnectionConfig, ConnectionsFile, CopyConfig, Role};
pub use crate::core::{
    ColumnDescriptor, DdlExecutor, InsertMode, Row, SlotKind, SourceReader, SqlValue, TableInfo,
    TargetTransaction, TargetWriter,
};
pub use drivers::{MysqlReader, MysqlWriter, SessionSettings};
pub use error::{CopyError, Result};
pub use orchestrator::{CopyResult, HealthCheckResult, Orchestrator, TableResult, TableSelection};
pub use swap::{SwapProtocol, TableState, TableTask};
pub use transfer::{ProgressSnapshot, ProgressTracker, TransferConfig, TransferEngine, TransferStats};
pub use typemap::RowLayout;
