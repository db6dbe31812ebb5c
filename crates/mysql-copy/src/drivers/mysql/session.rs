//! Connection pool construction and per-session settings.

use std::collections::BTreeMap;

use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts};

use crate::config::{ConnectionConfig, CopyConfig};
use crate::error::{CopyError, Result};

/// Session variables applied to every connection a pool opens.
///
/// Settings are per connection, never global, so they are replayed through
/// the pool's init statements whenever a new connection is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// `Some(false)` disables foreign key checks for the session.
    pub foreign_key_checks: Option<bool>,

    /// Session time zone.
    pub time_zone: Option<String>,

    /// Extra `SET SESSION` variables.
    pub params: BTreeMap<String, String>,
}

impl SessionSettings {
    /// Settings for the source side: only charset, time zone and params.
    pub fn for_source(conn: &ConnectionConfig, copy: &CopyConfig) -> Self {
        Self {
            foreign_key_checks: None,
            time_zone: Some(copy.time_zone.clone()),
            params: conn.params.clone(),
        }
    }

    /// Settings for the destination side.
    pub fn for_destination(conn: &ConnectionConfig, copy: &CopyConfig) -> Self {
        Self {
            foreign_key_checks: Some(copy.foreign_key_checks),
            time_zone: Some(copy.time_zone.clone()),
            params: conn.params.clone(),
        }
    }

    /// Statements run on each new connection, in order.
    pub fn init_statements(&self) -> Vec<String> {
        let mut stmts = vec!["SET NAMES utf8mb4".to_string()];
        if let Some(checks) = self.foreign_key_checks {
            stmts.push(format!(
                "SET SESSION foreign_key_checks = {}",
                if checks { 1 } else { 0 }
            ));
        }
        if let Some(tz) = &self.time_zone {
            stmts.push(format!("SET SESSION time_zone = '{}'", tz));
        }
        for (key, value) in &self.params {
            stmts.push(format!("SET SESSION {} = {}", key, value));
        }
        stmts
    }
}

/// Build a pool for `conn`. No connection is opened yet.
pub(crate) fn build_pool(
    conn: &ConnectionConfig,
    session: &SessionSettings,
    max_conns: usize,
) -> Result<Pool> {
    let builder = match &conn.url {
        Some(url) => {
            let opts = Opts::from_url(url).map_err(|e| {
                CopyError::Config(format!("invalid connection url {}: {}", conn.describe(), e))
            })?;
            OptsBuilder::from_opts(opts)
        }
        None => {
            let (host, port) = conn.endpoint();
            OptsBuilder::default()
                .ip_or_hostname(host)
                .tcp_port(port)
                .user(Some(conn.user.as_str()))
                .pass(Some(conn.password.as_str()))
                .db_name(Some(conn.database.as_str()))
        }
    };

    let constraints = PoolConstraints::new(1, max_conns.max(1)).ok_or_else(|| {
        CopyError::Config(format!("invalid pool size {} for {}", max_conns, conn.describe()))
    })?;

    let opts: Opts = builder
        .init(session.init_statements())
        .pool_opts(PoolOpts::new().with_constraints(constraints))
        .into();

    Ok(Pool::new(opts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_disables_fk_checks_by_default() {
        let conn = ConnectionConfig::from_url("mysql://u:p@h/db");
        let session = SessionSettings::for_destination(&conn, &CopyConfig::default());
        assert_eq!(
            session.init_statements(),
            vec![
                "SET NAMES utf8mb4".to_string(),
                "SET SESSION foreign_key_checks = 0".to_string(),
                "SET SESSION time_zone = '+00:00'".to_string(),
            ]
        );
    }

    #[test]
    fn test_source_leaves_fk_checks_alone() {
        let mut conn = ConnectionConfig::from_url("mysql://u:p@h/db");
        conn.params.insert("sql_mode".into(), "'TRADITIONAL'".into());
        let session = SessionSettings::for_source(&conn, &CopyConfig::default());
        let stmts = session.init_statements();
        assert!(!stmts.iter().any(|s| s.contains("foreign_key_checks")));
        assert_eq!(
            stmts.last().map(String::as_str),
            Some("SET SESSION sql_mode = 'TRADITIONAL'")
        );
    }

    #[test]
    fn test_build_pool_rejects_bad_url() {
        let conn = ConnectionConfig::from_url("mysql://u:p@h:notaport/db");
        let session = SessionSettings::for_source(&conn, &CopyConfig::default());
        assert!(build_pool(&conn, &session, 4).is_err());
    }
}
