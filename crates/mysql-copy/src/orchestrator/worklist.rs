//! Table selection against the source catalog.

use std::collections::HashSet;

use regex::Regex;

use crate::config::AliasMap;
use crate::core::schema::TableInfo;
use crate::error::{CopyError, Result};

/// Which tables a run should copy.
#[derive(Debug, Clone, Default)]
pub struct TableSelection {
    /// Table names, glob patterns (`*`, `?`) or alias names.
    pub tables: Vec<String>,

    /// Copy every table; `tables` then lists exclusions.
    pub all: bool,
}

impl TableSelection {
    pub fn tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            all: false,
        }
    }

    pub fn all_except<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: excluded.into_iter().map(Into::into).collect(),
            all: true,
        }
    }
}

fn is_glob(entry: &str) -> bool {
    entry.contains(|c: char| c == '*' || c == '?')
}

/// Compile a `*`/`?` glob into an anchored regex.
fn glob_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| CopyError::Config(format!("invalid pattern {}: {}", pattern, e)))
}

/// Match expanded entries against the catalog, in entry order.
fn matching<'a>(catalog: &'a [TableInfo], entries: &[String]) -> Result<Vec<&'a TableInfo>> {
    let mut out = Vec::new();
    for entry in entries {
        if is_glob(entry) {
            let re = glob_regex(entry)?;
            let before = out.len();
            out.extend(catalog.iter().filter(|t| re.is_match(&t.name)));
            if out.len() == before {
                return Err(CopyError::PatternNoMatch(entry.clone()));
            }
        } else {
            let table = catalog
                .iter()
                .find(|t| t.name == *entry)
                .ok_or_else(|| CopyError::TableNotFound(entry.clone()))?;
            out.push(table);
        }
    }
    Ok(out)
}

/// Resolve `selection` into the ordered worklist.
///
/// Aliases are expanded first, then literal names must exist and every
/// pattern must match at least one table. The result is de-duplicated and
/// sorted largest first, ties by name.
pub fn resolve(
    catalog: &[TableInfo],
    selection: &TableSelection,
    aliases: &AliasMap,
) -> Result<Vec<TableInfo>> {
    let mut entries = Vec::new();
    for entry in &selection.tables {
        entries.extend(aliases.expand(entry)?);
    }

    let selected: Vec<&TableInfo> = if selection.all {
        let excluded: HashSet<&str> = matching(catalog, &entries)?
            .into_iter()
            .map(|t| t.name.as_str())
            .collect();
        catalog
            .iter()
            .filter(|t| !excluded.contains(t.name.as_str()))
            .collect()
    } else {
        if entries.is_empty() {
            return Err(CopyError::Config(
                "no tables requested (name tables or use --all)".into(),
            ));
        }
        matching(catalog, &entries)?
    };

    let mut seen = HashSet::new();
    let mut worklist: Vec<TableInfo> = selected
        .into_iter()
        .filter(|t| seen.insert(t.name.as_str()))
        .cloned()
        .collect();

    worklist.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes).then_with(|| a.name.cmp(&b.name)));
    Ok(worklist)
}
