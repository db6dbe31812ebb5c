//! Error types for the copy library.

use thiserror::Error;

/// Main error type for copy operations.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Configuration error (invalid YAML, missing fields, bad flags, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A source column uses a type outside the supported mapping
    #[error("Unsupported column type '{column_type}' for {table}.{column}")]
    UnsupportedColumnType {
        table: String,
        column: String,
        column_type: String,
    },

    /// A literal table name does not exist in the source catalog
    #[error("Table not found in source: {0}")]
    TableNotFound(String),

    /// A glob pattern matched nothing in the source catalog
    #[error("Pattern matched no tables: {0}")]
    PatternNoMatch(String),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Database driver error
    #[error("Database error: {0}")]
    Database(#[from] mysql_async::Error),

    /// Schema extraction failed
    #[error("Schema extraction failed: {0}")]
    SchemaExtraction(String),

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Drop/rename of a table during finalize failed
    #[error("Finalize failed for table {table}: {message}")]
    Finalize { table: String, message: String },

    /// A table task was driven through an illegal state change
    #[error("Invalid state transition for table {table}: {from} -> {to}")]
    InvalidTransition {
        table: String,
        from: String,
        to: String,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Copy was cancelled (SIGINT, or another table failed)
    #[error("Copy cancelled")]
    Cancelled,
}

impl CopyError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        CopyError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        CopyError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Finalize error
    pub fn finalize(table: impl Into<String>, message: impl Into<String>) -> Self {
        CopyError::Finalize {
            table: table.into(),
            message: message.into(),
        }
    }

    /// True for errors that are detected before anything is written to the
    /// destination and that a rerun cannot fix without changing input.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CopyError::Config(_)
                | CopyError::UnsupportedColumnType { .. }
                | CopyError::TableNotFound(_)
                | CopyError::PatternNoMatch(_)
                | CopyError::Yaml(_)
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CopyError::Cancelled => 130,
            e if e.is_configuration() => 2,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for copy operations.
pub type Result<T> = std::result::Result<T, CopyError>;
