//! SQL value types carried from the source reader to the target writer.

use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// Type hint for NULL values.
///
/// Keeps the column's type with a NULL so a writer can encode it for the
/// right target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Decimal,
    DateTime,
    Date,
    Time,
}

/// SQL value enum for type-safe row handling.
///
/// Uses `Cow` for string and byte data so values can borrow from a source
/// buffer while being converted; rows placed in a [`Batch`] are always owned.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue<'a> {
    /// NULL with type hint.
    Null(SqlNullType),

    /// 16-bit signed integer (smallint).
    I16(i16),

    /// 32-bit signed integer (integer).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point.
    F32(f32),

    /// 64-bit floating point (double precision).
    F64(f64),

    /// Text/string data.
    Text(Cow<'a, str>),

    /// Binary data.
    Bytes(Cow<'a, [u8]>),

    /// Exact numeric, also used for `bigint unsigned` values above `i64::MAX`.
    Decimal(Decimal),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl SqlValue<'static> {
    /// Create a text value from an owned String.
    #[must_use]
    pub fn text_owned(s: String) -> Self {
        SqlValue::Text(Cow::Owned(s))
    }

    /// Create a bytes value from an owned Vec<u8>.
    #[must_use]
    pub fn bytes_owned(b: Vec<u8>) -> Self {
        SqlValue::Bytes(Cow::Owned(b))
    }
}

/// Owned row of values.
pub type Row = Vec<SqlValue<'static>>;

/// One copy window: a finite, owned set of rows.
#[derive(Debug, Default)]
pub struct Batch {
    /// Rows in this window.
    pub rows: Vec<Row>,

    /// Key values of the last row, for keyset continuation.
    pub last_key: Option<Row>,

    /// Whether this is the final window for the table.
    pub is_last: bool,
}

impl Batch {
    /// Create a new batch with the given rows.
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            last_key: None,
            is_last: false,
        }
    }

    /// Record the key of the last row from the given column positions.
    pub fn with_key_from(mut self, positions: &[usize]) -> Self {
        self.last_key = self.rows.last().map(|row| {
            positions
                .iter()
                .filter_map(|&p| row.get(p).cloned())
                .collect()
        });
        self
    }

    /// Mark this as the final batch.
    pub fn mark_final(mut self) -> Self {
        self.is_last = true;
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_last_key() {
        let batch = Batch::new(vec![
            vec![SqlValue::I64(1), SqlValue::text_owned("a".to_string())],
            vec![SqlValue::I64(2), SqlValue::text_owned("b".to_string())],
        ])
        .with_key_from(&[0]);

        assert_eq!(batch.len(), 2);
        assert!(!batch.is_last);
        assert_eq!(batch.last_key, Some(vec![SqlValue::I64(2)]));
        assert!(batch.mark_final().is_last);
    }

    #[test]
    fn test_empty_batch_has_no_key() {
        let batch = Batch::new(Vec::new()).with_key_from(&[0]);
        assert!(batch.is_empty());
        assert!(batch.last_key.is_none());
    }
}
