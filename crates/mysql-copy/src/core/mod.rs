//! Core abstractions shared by the copy pipeline.
//!
//! - [`schema`]: catalog metadata (columns, tables, routines)
//! - [`value`]: run-time typed row values
//! - [`traits`]: source and destination capabilities
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{ColumnDescriptor, RoutineKind, TableInfo};
pub use traits::{DdlExecutor, InsertMode, SourceReader, TargetTransaction, TargetWriter};
pub use value::{Row, SlotKind, SqlValue};
