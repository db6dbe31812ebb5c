//! Catalog metadata read from the source server.

use serde::{Deserialize, Serialize};

/// Column metadata as reported by `information_schema.COLUMNS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// 1-based position in the table definition.
    pub ordinal_position: u32,

    /// Bare type name (`DATA_TYPE`), lowercased.
    pub data_type: String,

    /// Full declared type (`COLUMN_TYPE`), e.g. `int(10) unsigned`.
    pub column_type: String,

    /// Whether the integer type is declared unsigned.
    pub unsigned: bool,

    /// Generation expression for generated columns.
    ///
    /// `None` both for ordinary columns and for servers that do not expose
    /// `GENERATION_EXPRESSION` at all.
    pub generation_expression: Option<String>,
}

impl ColumnDescriptor {
    /// Build a descriptor, deriving the unsigned flag from `column_type`.
    pub fn new(
        name: impl Into<String>,
        ordinal_position: u32,
        data_type: impl Into<String>,
        column_type: impl Into<String>,
        generation_expression: Option<String>,
    ) -> Self {
        let column_type = column_type.into();
        let unsigned = column_type
            .trim_end()
            .to_ascii_lowercase()
            .ends_with("unsigned")
            || column_type
                .to_ascii_lowercase()
                .contains(" unsigned zerofill");
        Self {
            name: name.into(),
            ordinal_position,
            data_type: data_type.into().to_ascii_lowercase(),
            column_type,
            unsigned,
            generation_expression: generation_expression.filter(|e| !e.trim().is_empty()),
        }
    }

    /// Generated columns are computed by the destination and never written.
    pub fn is_generated(&self) -> bool {
        self.generation_expression.is_some()
    }
}

/// A base table in the source catalog with its on-disk footprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,

    /// `DATA_LENGTH + INDEX_LENGTH` in bytes.
    pub size_bytes: u64,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
        }
    }
}

/// Kinds of schema objects copied after the tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutineKind {
    Function,
    View,
    Procedure,
}

impl RoutineKind {
    /// Keyword used in `SHOW CREATE ...` and `DROP ... IF EXISTS`.
    pub fn keyword(&self) -> &'static str {
        match self {
            RoutineKind::Function => "FUNCTION",
            RoutineKind::View => "VIEW",
            RoutineKind::Procedure => "PROCEDURE",
        }
    }

    /// Column of the `SHOW CREATE ...` result holding the definition.
    pub fn create_column(&self) -> &'static str {
        match self {
            RoutineKind::Function => "Create Function",
            RoutineKind::View => "Create View",
            RoutineKind::Procedure => "Create Procedure",
        }
    }
}

impl std::fmt::Display for RoutineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutineKind::Function => write!(f, "function"),
            RoutineKind::View => write!(f, "view"),
            RoutineKind::Procedure => write!(f, "procedure"),
        }
    }
}
