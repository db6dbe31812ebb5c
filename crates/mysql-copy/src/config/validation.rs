//! Configuration validation.

use super::{Config, ConnectionConfig, CopyConfig};
use crate::core::identifier::validate_identifier;
use crate::error::{CopyError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_connection("source", &config.source)?;
    validate_connection("target", &config.target)?;

    if config.source.dest_only {
        return Err(CopyError::Config(
            "source connection is marked dest_only".into(),
        ));
    }
    if config.target.source_only {
        return Err(CopyError::Config(
            "target connection is marked source_only".into(),
        ));
    }

    // Cannot copy onto the same database
    if config.source.url.is_none()
        && config.target.url.is_none()
        && config.source.endpoint() == config.target.endpoint()
        && config.source.database == config.target.database
    {
        return Err(CopyError::Config(
            "source and target cannot be the same database".into(),
        ));
    }
    if config.source.url.is_some() && config.source.url == config.target.url {
        return Err(CopyError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    validate_copy(&config.copy)
}

fn validate_connection(role: &str, conn: &ConnectionConfig) -> Result<()> {
    if let Some(url) = &conn.url {
        if !url.starts_with("mysql://") {
            return Err(CopyError::Config(format!(
                "{}.url must start with mysql://",
                role
            )));
        }
        return Ok(());
    }
    if conn.host.is_empty() {
        return Err(CopyError::Config(format!("{}.host is required", role)));
    }
    if conn.database.is_empty() {
        return Err(CopyError::Config(format!("{}.database is required", role)));
    }
    if conn.user.is_empty() {
        return Err(CopyError::Config(format!("{}.user is required", role)));
    }
    for key in conn.params.keys() {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CopyError::Config(format!(
                "{}.params has an invalid session variable name: {:?}",
                role, key
            )));
        }
    }
    Ok(())
}

/// Validate the copy section on its own.
pub fn validate_copy(copy: &CopyConfig) -> Result<()> {
    if let Some(0) = copy.workers {
        return Err(CopyError::Config("copy.workers must be at least 1".into()));
    }
    if let Some(0) = copy.finalize_workers {
        return Err(CopyError::Config(
            "copy.finalize_workers must be at least 1".into(),
        ));
    }
    if let Some(0) = copy.row_buffer {
        return Err(CopyError::Config("copy.row_buffer must be at least 1".into()));
    }
    if let Some(0) = copy.batch_rows {
        return Err(CopyError::Config("copy.batch_rows must be at least 1".into()));
    }
    if copy.get_max_statement_bytes() < 1024 {
        return Err(CopyError::Config(
            "copy.max_statement_bytes must be at least 1024".into(),
        ));
    }
    if let Some(n) = copy.max_connections {
        if n < 2 {
            return Err(CopyError::Config(
                "copy.max_connections must be at least 2".into(),
            ));
        }
    }
    validate_identifier(&copy.temp_table_prefix)
        .map_err(|e| CopyError::Config(format!("copy.temp_table_prefix: {}", e)))?;
    if copy.insert_ignore && copy.skip_data {
        return Err(CopyError::Config(
            "insert_ignore and skip_data cannot be combined".into(),
        ));
    }
    if copy.time_zone.contains('\'') {
        return Err(CopyError::Config(format!(
            "copy.time_zone is not a valid time zone: {:?}",
            copy.time_zone
        )));
    }
    Ok(())
}
