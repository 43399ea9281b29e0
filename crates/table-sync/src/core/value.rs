//! SQL value types exchanged with the store.
//!
//! Values read through the MySQL text protocol arrive in the store's native
//! text form; integers, floats and decimals are parsed, everything temporal is
//! kept as text so that client-side hashing sees exactly what `CONCAT` sees.

use std::borrow::Cow;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value (stored by MySQL as TINYINT(1)).
    Bool(bool),

    /// Signed integer of any width.
    Int(i64),

    /// Unsigned integer that does not fit an `i64`.
    UInt(u64),

    /// Floating point (FLOAT/DOUBLE).
    Float(f64),

    /// Exact numeric (DECIMAL/NUMERIC).
    Decimal(Decimal),

    /// Character data.
    Text(String),

    /// Binary data (BLOB/BINARY/VARBINARY).
    Bytes(Vec<u8>),

    /// Date without time component.
    Date(NaiveDate),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Time without date component.
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// The value in the store's text representation, or `None` for NULL.
    ///
    /// This is the form `CONCAT` produces server-side: integers in decimal,
    /// booleans as `1`/`0`, dates as `YYYY-MM-DD`, datetimes as
    /// `YYYY-MM-DD HH:MM:SS` with microseconds only when non-zero.
    pub fn store_text(&self) -> Option<Cow<'_, [u8]>> {
        let owned = match self {
            SqlValue::Null => return None,
            SqlValue::Text(s) => return Some(Cow::Borrowed(s.as_bytes())),
            SqlValue::Bytes(b) => return Some(Cow::Borrowed(b.as_slice())),
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::UInt(v) => v.to_string(),
            SqlValue::Float(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            SqlValue::DateTime(dt) => {
                if dt.nanosecond() == 0 {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
                }
            }
            SqlValue::Time(t) => {
                if t.nanosecond() == 0 {
                    t.format("%H:%M:%S").to_string()
                } else {
                    t.format("%H:%M:%S%.6f").to_string()
                }
            }
        };
        Some(Cow::Owned(owned.into_bytes()))
    }

    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::UInt(_) => "uint",
            SqlValue::Float(_) => "float",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Date(_) => "date",
            SqlValue::DateTime(_) => "datetime",
            SqlValue::Time(_) => "time",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            other => match other.store_text() {
                Some(text) => f.write_str(&String::from_utf8_lossy(&text)),
                None => f.write_str("NULL"),
            },
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(signed) => SqlValue::Int(signed),
            Err(_) => SqlValue::UInt(v),
        }
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn text(value: &SqlValue) -> Option<String> {
        value
            .store_text()
            .map(|t| String::from_utf8(t.into_owned()).unwrap())
    }

    #[test]
    fn test_null_has_no_text() {
        assert!(SqlValue::Null.is_null());
        assert_eq!(text(&SqlValue::Null), None);
        assert_eq!(text(&SqlValue::Text(String::new())), Some(String::new()));
    }

    #[test]
    fn test_store_text_matches_mysql_concat() {
        assert_eq!(text(&SqlValue::Bool(true)).as_deref(), Some("1"));
        assert_eq!(text(&SqlValue::Int(-42)).as_deref(), Some("-42"));
        assert_eq!(
            text(&SqlValue::Decimal(Decimal::from_str("6.5000").unwrap())).as_deref(),
            Some("6.5000")
        );

        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(text(&date.into()).as_deref(), Some("2024-02-29"));

        let dt = date.and_hms_opt(13, 5, 9).unwrap();
        assert_eq!(text(&dt.into()).as_deref(), Some("2024-02-29 13:05:09"));

        let dt_micro = date.and_hms_micro_opt(13, 5, 9, 120).unwrap();
        assert_eq!(
            text(&dt_micro.into()).as_deref(),
            Some("2024-02-29 13:05:09.000120")
        );
    }

    #[test]
    fn test_large_unsigned_stays_unsigned() {
        assert_eq!(SqlValue::from(7u64), SqlValue::Int(7));
        assert_eq!(SqlValue::from(u64::MAX), SqlValue::UInt(u64::MAX));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
    }

    #[test]
    fn test_display_bytes_as_hex() {
        assert_eq!(SqlValue::Bytes(vec![0xde, 0xad]).to_string(), "0xdead");
        assert_eq!(SqlValue::Null.to_string(), "NULL");
    }
}
