//! Text rewriting of `SHOW CREATE ...` output.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::identifier::quote_mysql;
use crate::error::{CopyError, Result};

/// Separator that introduces every constraint clause in `SHOW CREATE TABLE`.
const CONSTRAINT_MARKER: &str = ",\n  CONSTRAINT ";

/// `DEFINER=user@host` with optionally quoted user and host parts.
static DEFINER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\sDEFINER\s*=\s*(?:`(?:[^`]|``)*`|'(?:[^']|'')*'|[^\s@]+)(?:@(?:`(?:[^`]|``)*`|'(?:[^']|'')*'|[^\s]+))?",
    )
    .expect("valid definer regex")
});

/// Constraint clauses removed from a table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintBlock {
    raw: String,
}

impl ConstraintBlock {
    /// The removed text, including the leading separator.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Individual `CONSTRAINT ...` clauses.
    pub fn clauses(&self) -> Vec<&str> {
        self.raw
            .split(",\n")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// `ALTER TABLE ... ADD CONSTRAINT ..., ADD CONSTRAINT ...` for `table`.
    pub fn alter_statement(&self, table: &str) -> Result<String> {
        let adds: Vec<String> = self
            .clauses()
            .into_iter()
            .map(|clause| format!("ADD {}", clause))
            .collect();
        Ok(format!(
            "ALTER TABLE {} {}",
            quote_mysql(table)?,
            adds.join(", ")
        ))
    }
}

/// Split the constraint clauses out of a `CREATE TABLE` statement.
///
/// Constraint clauses always follow the column and index definitions and
/// form one run, so everything from the first marker up to the end of the
/// line holding the last marker is removed.
pub fn split_constraints(create: &str) -> (String, Option<ConstraintBlock>) {
    let (Some(start), Some(last)) = (
        create.find(CONSTRAINT_MARKER),
        create.rfind(CONSTRAINT_MARKER),
    ) else {
        return (create.to_string(), None);
    };

    let after_last = last + CONSTRAINT_MARKER.len();
    let end = create[after_last..]
        .find('\n')
        .map(|i| after_last + i)
        .unwrap_or(create.len());

    let mut stripped = String::with_capacity(create.len() - (end - start));
    stripped.push_str(&create[..start]);
    stripped.push_str(&create[end..]);

    (
        stripped,
        Some(ConstraintBlock {
            raw: create[start..end].to_string(),
        }),
    )
}

/// Point a `CREATE TABLE` statement at a different table name.
pub fn retarget_create(create: &str, table: &str, new_name: &str) -> Result<String> {
    let prefix = format!("CREATE TABLE {}", quote_mysql(table)?);
    let body = create.strip_prefix(&prefix).ok_or_else(|| {
        CopyError::SchemaExtraction(format!(
            "create statement for {} does not start with {:?}",
            table, prefix
        ))
    })?;
    Ok(format!("CREATE TABLE {}{}", quote_mysql(new_name)?, body))
}

/// Remove any `DEFINER=...` clause from a trigger, routine or view definition.
pub fn strip_definer(sql: &str) -> Cow<'_, str> {
    DEFINER_RE.replace_all(sql, "")
}
