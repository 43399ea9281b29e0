//! Error types for the table synchronization library.

use thiserror::Error;

/// Longest statement excerpt kept in the `Display` output of a failed query.
const STATEMENT_EXCERPT_LEN: usize = 240;

/// Main error type for synchronization operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Row or column shape does not match the cached table schema.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A statement failed inside the store.
    #[error("Query failed: {}\n  Statement: {}", .message, excerpt(.statement))]
    QueryFailed { statement: String, message: String },

    /// A key-based operation was attempted on a table without a primary key.
    #[error("Table {0} has no primary key - key-based operations require one")]
    NoPrimaryKey(String),

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connecting to the store failed.
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Create a QueryFailed error carrying the statement text and store detail.
    pub fn query_failed(statement: impl Into<String>, message: impl ToString) -> Self {
        SyncError::QueryFailed {
            statement: statement.into(),
            message: message.to_string(),
        }
    }

    /// Create a Connection error with context about where it occurred.
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        SyncError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a SchemaMismatch error.
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        SyncError::SchemaMismatch(message.into())
    }

    /// Whether retrying the same call could succeed without caller action.
    ///
    /// Nothing at this layer is retryable; transient transport failures are
    /// handled by the connection collaborator before they surface here.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Process exit code used by the command-line front end.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Yaml(_) => 2,
            SyncError::Connection { .. } => 3,
            SyncError::SchemaMismatch(_) | SyncError::NoPrimaryKey(_) => 4,
            SyncError::QueryFailed { .. } => 5,
            SyncError::Io(_) | SyncError::Json(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

fn excerpt(statement: &str) -> String {
    if statement.len() <= STATEMENT_EXCERPT_LEN {
        return statement.to_string();
    }
    let mut end = STATEMENT_EXCERPT_LEN;
    while !statement.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &statement[..end], statement.len())
}

/// Result type alias for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_failed_keeps_full_statement() {
        let sql = format!("INSERT INTO `t` VALUES {}", "(1),".repeat(500));
        let err = SyncError::query_failed(sql.clone(), "Duplicate entry '1' for key 'PRIMARY'");
        match &err {
            SyncError::QueryFailed { statement, .. } => assert_eq!(statement, &sql),
            other => panic!("unexpected error: {other:?}"),
        }

        let rendered = err.to_string();
        assert!(rendered.contains("Duplicate entry"));
        assert!(rendered.contains("bytes)"));
        assert!(rendered.len() < sql.len());
    }

    #[test]
    fn test_exit_codes_are_distinct_per_category() {
        assert_eq!(SyncError::Config("x".into()).exit_code(), 2);
        assert_eq!(SyncError::connection("refused", "connect").exit_code(), 3);
        assert_eq!(SyncError::NoPrimaryKey("t".into()).exit_code(), 4);
        assert_eq!(SyncError::query_failed("SELECT 1", "boom").exit_code(), 5);
    }

    #[test]
    fn test_nothing_is_retryable() {
        assert!(!SyncError::query_failed("DELETE", "lock wait timeout").is_retryable());
        assert!(!SyncError::schema_mismatch("missing column").is_retryable());
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = SyncError::NoPrimaryKey("events".into());
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Table events has no primary key"));
    }
}
