//! Database driver implementations.
//!
//! - [`mysql`]: MySQL / MariaDB source reader and destination writer
//!
//! Drivers implement the traits in [`crate::core::traits`]; the pipeline
//! only ever talks to those traits.

pub mod mysql;

pub use mysql::{MysqlReader, MysqlWriter, SessionSettings};
