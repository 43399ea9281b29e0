//! Canonical row encoding for hash consistency.
//!
//! Client-side and server-side hashing must see byte-identical input for the
//! same row. The encoding rules are:
//!
//! - Columns appear in schema declaration order, joined by the delimiter
//! - NULL encodes as `\N`
//! - Every other value encodes as its store text with `\` written as `\\`
//!   and the delimiter written as `\` followed by the delimiter
//!
//! Because a literal backslash is always doubled, `\N` can only come from
//! NULL, and an escaped delimiter can never be read as a separator. NULL,
//! the empty string and values containing the delimiter therefore never
//! collapse into each other.

use crate::core::{Dialect, SqlValue};
use crate::error::{Result, SyncError};

/// Escape character of the canonical encoding.
pub const ESCAPE: u8 = b'\\';

/// Encoding of SQL NULL.
pub const NULL_MARKER: &[u8] = b"\\N";

/// Default column delimiter.
pub const DEFAULT_DELIMITER: char = '#';

/// Check that `delimiter` can separate canonical values unambiguously.
///
/// The delimiter must be a single ASCII punctuation or space character other
/// than the escape character. Letters and digits are refused because `\N`
/// would become ambiguous with an escaped `N`.
pub fn validate_delimiter(delimiter: char) -> Result<u8> {
    if !delimiter.is_ascii() {
        return Err(SyncError::Config(format!(
            "hash delimiter must be an ASCII character, got {:?}",
            delimiter
        )));
    }
    if delimiter == ESCAPE as char {
        return Err(SyncError::Config(
            "hash delimiter cannot be the escape character '\\'".to_string(),
        ));
    }
    if !(delimiter.is_ascii_punctuation() || delimiter == ' ' || delimiter == '\t') {
        return Err(SyncError::Config(format!(
            "hash delimiter must be punctuation or whitespace, got {:?}",
            delimiter
        )));
    }
    Ok(delimiter as u8)
}

/// Append the canonical encoding of one value.
pub fn encode_value(out: &mut Vec<u8>, value: &SqlValue, delimiter: u8) {
    let Some(text) = value.store_text() else {
        out.extend_from_slice(NULL_MARKER);
        return;
    };
    for &byte in text.iter() {
        if byte == ESCAPE || byte == delimiter {
            out.push(ESCAPE);
        }
        out.push(byte);
    }
}

/// Canonical encoding of a whole row, values already in schema order.
pub fn encode_row<'a, I>(values: I, delimiter: u8) -> Vec<u8>
where
    I: IntoIterator<Item = &'a SqlValue>,
{
    let mut out = Vec::with_capacity(64);
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        encode_value(&mut out, value, delimiter);
    }
    out
}

/// SQL expression computing the canonical row digest server-side.
///
/// Produces the lowercase hex SHA-256 of the canonical encoding, so the
/// result compares equal to [`RowHash`](super::RowHash) computed locally for
/// the same stored values.
pub fn row_hash_expr(dialect: &dyn Dialect, columns: &[String], delimiter: char) -> Result<String> {
    validate_delimiter(delimiter)?;
    let literal = |s: &str| format!("'{}'", dialect.escape_string(s));

    let escape = (ESCAPE as char).to_string();
    let escaped_escape = escape.repeat(2);
    let delim = delimiter.to_string();
    let escaped_delim = format!("{}{}", escape, delim);
    let null_marker = String::from_utf8_lossy(NULL_MARKER).into_owned();

    let parts = columns
        .iter()
        .map(|column| {
            let ident = dialect.quote_ident(column)?;
            Ok(format!(
                "IFNULL(REPLACE(REPLACE({}, {}, {}), {}, {}), {})",
                ident,
                literal(&escape),
                literal(&escaped_escape),
                literal(&delim),
                literal(&escaped_delim),
                literal(&null_marker),
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(format!(
        "SHA2(CONCAT_WS({}, {}), 256)",
        literal(&delim),
        parts.join(", ")
    ))
}
