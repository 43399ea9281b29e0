//! Configuration validation.

use super::{Config, ConnectionConfig, SyncConfig};
use crate::error::{Result, SyncError};
use crate::hash::normalize::validate_delimiter;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if let Some(source) = &config.source {
        validate_connection("source", source)?;
    }
    validate_connection("target", &config.target)?;

    if let Some(source) = &config.source {
        if source.host == config.target.host
            && source.port == config.target.port
            && source.database == config.target.database
        {
            return Err(SyncError::Config(
                "source and target cannot be the same database".into(),
            ));
        }
    }

    validate_sync(&config.sync)
}

/// Validate the sync section on its own.
pub fn validate_sync(sync: &SyncConfig) -> Result<()> {
    if sync.chunk_size == 0 {
        return Err(SyncError::Config("sync.chunk_size must be at least 1".into()));
    }
    validate_delimiter(sync.delimiter)
        .map_err(|e| SyncError::Config(format!("sync.delimiter: {}", e)))?;
    Ok(())
}

fn validate_connection(section: &str, conn: &ConnectionConfig) -> Result<()> {
    if conn.host.is_empty() {
        return Err(SyncError::Config(format!("{}.host is required", section)));
    }
    if conn.database.is_empty() {
        return Err(SyncError::Config(format!("{}.database is required", section)));
    }
    if conn.user.is_empty() {
        return Err(SyncError::Config(format!("{}.user is required", section)));
    }
    if conn.r#type != "mysql" {
        return Err(SyncError::Config(format!(
            "{}.type must be 'mysql', got '{}'",
            section, conn.r#type
        )));
    }
    if conn.max_connections == 0 {
        return Err(SyncError::Config(format!(
            "{}.max_connections must be at least 1",
            section
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(database: &str) -> ConnectionConfig {
        ConnectionConfig {
            r#type: "mysql".to_string(),
            host: "localhost".to_string(),
            port: 3306,
            database: database.to_string(),
            user: "sync".to_string(),
            password: "password".to_string(),
            ssl_mode: "disable".to_string(),
            max_connections: 4,
        }
    }

    fn valid_config() -> Config {
        Config {
            source: Some(conn("upstream")),
            target: conn("replica"),
            sync: SyncConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_source_is_optional() {
        let mut config = valid_config();
        config.source = None;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_target_host() {
        let mut config = valid_config();
        config.target.host = "".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("target.host"));
    }

    #[test]
    fn test_wrong_type() {
        let mut config = valid_config();
        config.target.r#type = "postgres".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_same_database_rejected() {
        let mut config = valid_config();
        config.source = Some(conn("replica"));
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = valid_config();
        config.sync.chunk_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_escape_delimiter_rejected() {
        let mut config = valid_config();
        config.sync.delimiter = '\\';
        assert!(matches!(validate(&config), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }
}
