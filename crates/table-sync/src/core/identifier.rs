//! Table and column names, and string literals spliced into statement text.
//!
//! Names cannot be bound as parameters, so they are checked and quoted here
//! before any statement renders them.

use crate::error::{Result, SyncError};

/// Longest table or column name MySQL accepts.
const MAX_NAME_CHARS: usize = 64;

/// Check that `name` can be used as a table or column name.
pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SyncError::Config("Table or column name is empty".to_string()));
    }
    if name.contains('\0') {
        return Err(SyncError::Config(format!("Name {:?} contains a NUL byte", name)));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(SyncError::Config(format!(
            "Name {:?} is longer than {} characters",
            name, MAX_NAME_CHARS
        )));
    }
    Ok(())
}

/// Backtick-quote a checked name, doubling embedded backticks.
pub fn quote_name(name: &str) -> Result<String> {
    check_name(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Escape text for a single-quoted MySQL literal.
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_table_names_accepted() {
        let longest = "t".repeat(MAX_NAME_CHARS);
        for name in ["customers", "order items", "événements", longest.as_str()] {
            assert!(check_name(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_unusable_names_are_config_errors() {
        let too_long = "t".repeat(MAX_NAME_CHARS + 1);
        for name in ["", "cust\0omers", too_long.as_str()] {
            assert!(matches!(check_name(name), Err(SyncError::Config(_))), "{:?}", name);
        }
    }

    #[test]
    fn test_key_column_with_backtick_stays_one_name() {
        assert_eq!(quote_name("id").unwrap(), "`id`");
        assert_eq!(quote_name("legacy`id").unwrap(), "`legacy``id`");
        assert!(quote_name("").is_err());
    }

    #[test]
    fn test_escape_literal_for_hash_delimiter() {
        // The separator handed to CONCAT_WS must reach the server unchanged.
        assert_eq!(escape_literal("#"), "#");
        assert_eq!(escape_literal("\\N"), "\\\\N");
        assert_eq!(escape_literal("O'Brien"), "O\\'Brien");
        assert_eq!(escape_literal("a\nb\0"), "a\\nb\\0");
    }
}
