//! Bound parameters for batched INSERT statements.

use mysql_async::Value;

use crate::core::value::{SlotKind, SqlValue};

/// Placeholder for one column of the given slot.
///
/// JSON is bound as bytes, so it needs an explicit character set before the
/// server will accept it into a JSON column.
pub(crate) fn placeholder(kind: SlotKind) -> &'static str {
    match kind {
        SlotKind::Json => "CONVERT(? USING utf8mb4)",
        _ => "?",
    }
}

/// Convert SqlValue to mysql_async::Value.
///
/// Numeric text and `set` values go over as bytes so the server parses the
/// exact digits or labels itself.
pub(crate) fn sql_value_to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null(_) => Value::NULL,
        SqlValue::I8(i) => Value::from(*i),
        SqlValue::I16(i) => Value::from(*i),
        SqlValue::I32(i) => Value::from(*i),
        SqlValue::I64(i) => Value::from(*i),
        SqlValue::U8(u) => Value::from(*u),
        SqlValue::U16(u) => Value::from(*u),
        SqlValue::U32(u) => Value::from(*u),
        SqlValue::U64(u) => Value::from(*u),
        SqlValue::F64(f) => Value::from(*f),
        SqlValue::Literal(s) | SqlValue::Text(s) | SqlValue::Json(s) => {
            Value::Bytes(s.as_bytes().to_vec())
        }
        SqlValue::Bytes(b) | SqlValue::Opaque(b) => Value::Bytes(b.clone()),
    }
}
