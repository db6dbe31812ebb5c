//! Row layouts built from introspected columns.
//!
//! A [`RowLayout`] is produced by one ordered pass over the table's column
//! descriptors. The SELECT list, the decoded row and the INSERT column list
//! all come from it, so column order can never drift between them.

use crate::core::identifier::quote_mysql;
use crate::core::schema::ColumnDescriptor;
use crate::core::value::{Row, SlotKind};
use crate::error::{CopyError, Result};

/// Map a column to its value slot.
///
/// The mapping is closed: any type not listed here is an
/// [`CopyError::UnsupportedColumnType`].
pub fn slot_for(table: &str, column: &ColumnDescriptor) -> Result<SlotKind> {
    let unsigned = column.unsigned;
    let kind = match column.data_type.as_str() {
        "tinyint" if unsigned => SlotKind::U8,
        "tinyint" => SlotKind::I8,
        "smallint" if unsigned => SlotKind::U16,
        "smallint" => SlotKind::I16,
        "mediumint" | "int" if unsigned => SlotKind::U32,
        "mediumint" | "int" => SlotKind::I32,
        "bigint" if unsigned => SlotKind::U64,
        "bigint" => SlotKind::I64,

        "float" => SlotKind::F64,
        "decimal" | "double" => SlotKind::Literal,

        "date" | "time" | "datetime" | "timestamp" | "year" => SlotKind::Temporal,

        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
            SlotKind::Binary
        }

        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum" => {
            SlotKind::Text
        }

        "json" => SlotKind::Json,
        "set" => SlotKind::Opaque,

        _ => {
            return Err(CopyError::UnsupportedColumnType {
                table: table.to_string(),
                column: column.name.clone(),
                column_type: column.column_type.clone(),
            })
        }
    };
    Ok(kind)
}

/// A copyable column and the slot it decodes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutColumn {
    pub name: String,
    pub kind: SlotKind,
}

/// Decoding shape and SQL column list for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    table: String,
    columns: Vec<LayoutColumn>,
    column_list: String,
}

impl RowLayout {
    /// Build the layout for `table`.
    ///
    /// Generated columns are skipped; descriptors are taken in the order
    /// given, which the introspector guarantees is ordinal order.
    pub fn build(table: &str, descriptors: &[ColumnDescriptor]) -> Result<Self> {
        let mut columns = Vec::with_capacity(descriptors.len());
        let mut quoted = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors.iter().filter(|c| !c.is_generated()) {
            let kind = slot_for(table, descriptor)?;
            quoted.push(quote_mysql(&descriptor.name)?);
            columns.push(LayoutColumn {
                name: descriptor.name.clone(),
                kind,
            });
        }

        if columns.is_empty() {
            return Err(CopyError::SchemaExtraction(format!(
                "table {} has no writable columns",
                table
            )));
        }

        Ok(Self {
            table: table.to_string(),
            columns,
            column_list: quoted.join(","),
        })
    }

    /// Table this layout was built for.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[LayoutColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Back-quoted, comma-joined column names for SELECT and INSERT text.
    pub fn column_list(&self) -> &str {
        &self.column_list
    }

    /// Slot kinds in column order.
    pub fn kinds(&self) -> impl Iterator<Item = SlotKind> + '_ {
        self.columns.iter().map(|c| c.kind)
    }

    /// Ensure a row has one value per column.
    pub fn check_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(CopyError::transfer(
                &self.table,
                format!(
                    "row has {} values, layout has {} columns",
                    row.len(),
                    self.columns.len()
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, pos: u32, data_type: &str, column_type: &str) -> ColumnDescriptor {
        ColumnDescriptor::new(name, pos, data_type, column_type, None)
    }

    #[test]
    fn test_integer_width_and_sign() {
        let cases = [
            ("tinyint", "tinyint(4)", SlotKind::I8),
            ("tinyint", "tinyint(3) unsigned", SlotKind::U8),
            ("smallint", "smallint unsigned", SlotKind::U16),
            ("mediumint", "mediumint", SlotKind::I32),
            ("int", "int unsigned", SlotKind::U32),
            ("bigint", "bigint", SlotKind::I64),
            ("bigint", "bigint(20) unsigned", SlotKind::U64),
        ];
        for (data_type, column_type, expected) in cases {
            let c = col("n", 1, data_type, column_type);
            assert_eq!(slot_for("t", &c).unwrap(), expected, "{}", column_type);
        }
    }

    #[test]
    fn test_year_is_temporal() {
        let c = col("y", 1, "year", "year");
        assert_eq!(slot_for("t", &c).unwrap(), SlotKind::Temporal);
        let c = col("y", 1, "year", "year(4)");
        assert_eq!(slot_for("t", &c).unwrap(), SlotKind::Temporal);
    }

    #[test]
    fn test_families() {
        assert_eq!(slot_for("t", &col("a", 1, "decimal", "decimal(10,2)")).unwrap(), SlotKind::Literal);
        assert_eq!(slot_for("t", &col("a", 1, "double", "double")).unwrap(), SlotKind::Literal);
        assert_eq!(slot_for("t", &col("a", 1, "float", "float")).unwrap(), SlotKind::F64);
        assert_eq!(slot_for("t", &col("a", 1, "datetime", "datetime(6)")).unwrap(), SlotKind::Temporal);
        assert_eq!(slot_for("t", &col("a", 1, "longblob", "longblob")).unwrap(), SlotKind::Binary);
        assert_eq!(slot_for("t", &col("a", 1, "enum", "enum('a','b')")).unwrap(), SlotKind::Text);
        assert_eq!(slot_for("t", &col("a", 1, "json", "json")).unwrap(), SlotKind::Json);
        assert_eq!(slot_for("t", &col("a", 1, "set", "set('x','y')")).unwrap(), SlotKind::Opaque);
    }

    #[test]
    fn test_unsupported_type_is_fatal() {
        let err = slot_for("places", &col("shape", 2, "geometry", "geometry")).unwrap_err();
        match err {
            CopyError::UnsupportedColumnType {
                table,
                column,
                column_type,
            } => {
                assert_eq!(table, "places");
                assert_eq!(column, "shape");
                assert_eq!(column_type, "geometry");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_layout_skips_generated_and_keeps_order() {
        let columns = vec![
            col("id", 1, "int", "int"),
            ColumnDescriptor::new("doubled", 2, "int", "int", Some("(`id` * 2)".into())),
            col("name", 3, "varchar", "varchar(20)"),
            col("odd`name", 4, "text", "text"),
        ];
        let layout = RowLayout::build("t", &columns).unwrap();
        assert_eq!(layout.len(), 3);
        assert_eq!(layout.column_list(), "`id`,`name`,`odd``name`");
        let kinds: Vec<_> = layout.kinds().collect();
        assert_eq!(kinds, vec![SlotKind::I32, SlotKind::Text, SlotKind::Text]);
    }

    #[test]
    fn test_generated_column_of_unsupported_type_is_ignored() {
        let columns = vec![
            col("id", 1, "int", "int"),
            ColumnDescriptor::new("pt", 2, "point", "point", Some("point(`id`,`id`)".into())),
        ];
        assert!(RowLayout::build("t", &columns).is_ok());
    }

    #[test]
    fn test_check_row_arity() {
        let layout = RowLayout::build("t", &[col("id", 1, "int", "int")]).unwrap();
        assert!(layout.check_row(&vec![crate::core::SqlValue::I32(1)]).is_ok());
        assert!(layout.check_row(&vec![]).is_err());
    }
}
