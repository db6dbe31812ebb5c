//! Identifier validation and quoting.
//!
//! Identifiers (table names, column names, routine names) cannot be bound as
//! statement parameters, so every piece of DDL and DML this crate builds goes
//! through [`quote_mysql`]. Names are validated first:
//!
//! 1. Reject empty names and names containing null bytes
//! 2. Enforce the MySQL identifier length limit
//! 3. Wrap in backticks, doubling any embedded backtick

use crate::error::{CopyError, Result};

/// MySQL limit for table, column and routine names (characters).
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Validate an identifier for security issues.
///
/// # Errors
///
/// Returns `CopyError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CopyError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(CopyError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    let chars = name.chars().count();
    if chars > MAX_IDENTIFIER_LENGTH {
        return Err(CopyError::Config(format!(
            "Identifier exceeds maximum length of {} characters (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH, chars, name
        )));
    }

    Ok(())
}

/// Quote a MySQL identifier using backticks.
///
/// ```ignore
/// assert_eq!(quote_mysql("users")?, "`users`");
/// assert_eq!(quote_mysql("table`name")?, "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(quote_unchecked(name))
}

/// Quote without validation, for names that came back from the server catalog.
pub(crate) fn quote_unchecked(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Build the staging table name for `table`.
///
/// The name is deterministic so that a rerun drops the leftovers of an
/// aborted run, and distinct per table so concurrent pipelines never collide.
pub fn temp_table_name(prefix: &str, table: &str) -> Result<String> {
    let name = format!("{}{}", prefix, table);
    validate_identifier(&name).map_err(|_| {
        CopyError::Config(format!(
            "Temp table name for '{}' would exceed {} characters; use a shorter prefix",
            table, MAX_IDENTIFIER_LENGTH
        ))
    })?;
    Ok(name)
}
