//! Row values for schema-discovered tables.
//!
//! Columns are only known at run time, so a row is a `Vec<SqlValue>` whose
//! positions line up with the owning [`RowLayout`](crate::typemap::RowLayout).

/// Semantic slot a column decodes into.
///
/// Also used as the type hint carried by NULL values so that a NULL still
/// knows which column family it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    /// 64-bit float (`float`).
    F64,
    /// Exact numeric forwarded as the server's own text (`decimal`, `double`).
    Literal,
    /// Date and time types kept as server text.
    Temporal,
    /// Binary strings and blobs.
    Binary,
    /// Character strings, text and enum.
    Text,
    /// JSON documents, written back with an explicit character set.
    Json,
    /// `set` values; never interpreted.
    Opaque,
}

impl SlotKind {
    /// Whether values of this kind are integers.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            SlotKind::I8
                | SlotKind::I16
                | SlotKind::I32
                | SlotKind::I64
                | SlotKind::U8
                | SlotKind::U16
                | SlotKind::U32
                | SlotKind::U64
        )
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with the slot it was read for.
    Null(SlotKind),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F64(f64),
    /// Numeric text, forwarded byte-for-byte.
    Literal(String),
    /// Character or temporal text.
    Text(String),
    Bytes(Vec<u8>),
    Json(String),
    /// Raw bytes of a `set` value.
    Opaque(Vec<u8>),
}

impl SqlValue {
    /// Check if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Rough size of the value as a bound parameter, for batch sizing.
    pub fn encoded_len_hint(&self) -> usize {
        match self {
            SqlValue::Null(_) => 0,
            SqlValue::I8(_) | SqlValue::U8(_) => 1,
            SqlValue::I16(_) | SqlValue::U16(_) => 2,
            SqlValue::I32(_) | SqlValue::U32(_) => 4,
            SqlValue::I64(_) | SqlValue::U64(_) | SqlValue::F64(_) => 8,
            // length-encoded: up to 9 prefix bytes
            SqlValue::Literal(s) | SqlValue::Text(s) | SqlValue::Json(s) => s.len() + 9,
            SqlValue::Bytes(b) | SqlValue::Opaque(b) => b.len() + 9,
        }
    }
}

/// One decoded source row, ordered like the table's copyable columns.
pub type Row = Vec<SqlValue>;
