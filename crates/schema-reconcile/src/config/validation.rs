//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let db = &config.database;

    let networked = db.dialect.is_networked();
    if networked && db.host.is_empty() {
        return Err(MigrateError::Config("database.host is required".into()));
    }
    if db.database.is_empty() {
        return Err(MigrateError::Config("database.database is required".into()));
    }
    if networked && db.user.is_empty() {
        return Err(MigrateError::Config("database.user is required".into()));
    }
    if let Some(0) = db.port {
        return Err(MigrateError::Config(
            "database.port must be between 1 and 65535".into(),
        ));
    }
    if db.connect_timeout_secs == 0 {
        return Err(MigrateError::Config(
            "database.connect_timeout_secs must be at least 1".into(),
        ));
    }

    SslMode::parse(&db.ssl_mode)?;
    validate_identifier(&db.schema())
        .map_err(|e| MigrateError::Config(format!("database.schema: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, DialectKind, MigrateOptions};

    fn valid_config() -> Config {
        Config {
            database: DatabaseConfig {
                dialect: DialectKind::Postgres,
                host: "localhost".to_string(),
                port: None,
                database: "app".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: None,
                ssl_mode: "disable".to_string(),
                connect_timeout_secs: 30,
            },
            migration: MigrateOptions::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = valid_config();
        config.database.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut config = valid_config();
        config.database.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = valid_config();
        config.database.port = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_default_ports_and_schemas() {
        let mut config = valid_config();
        assert_eq!(config.database.port(), 5432);
        assert_eq!(config.database.schema(), "public");

        config.database.dialect = DialectKind::Mssql;
        assert_eq!(config.database.port(), 1433);
        assert_eq!(config.database.schema(), "dbo");

        config.database.dialect = DialectKind::Mysql;
        assert_eq!(config.database.port(), 3306);
        assert_eq!(config.database.schema(), "app");

        config.database.dialect = DialectKind::Sqlite;
        assert_eq!(config.database.schema(), "main");
    }

    #[test]
    fn test_sqlite_needs_only_a_path() {
        let yaml = r#"
database:
  type: sqlite
  database: ":memory:"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.database.dialect, DialectKind::Sqlite);
        assert!(config.database.host.is_empty());
        assert_eq!(config.database.display_url(), "sqlite://:memory:");

        let mut missing = config.clone();
        missing.database.database = String::new();
        assert!(validate(&missing).is_err());

        let mut networked = config;
        networked.database.dialect = DialectKind::Postgres;
        assert!(validate(&networked).is_err());
    }

    #[test]
    fn test_options_default_to_additive_only() {
        let options = MigrateOptions::default();
        assert!(!options.global_unique_id);
        assert!(!options.drop_column);
        assert!(!options.drop_index);
        assert!(options.verify);
    }

    #[test]
    fn test_from_yaml_with_aliases() {
        let yaml = r#"
database:
  type: sqlserver
  host: db
  database: app
  user: sa
  password: secret
migration:
  global_unique_id: true
  drop_index: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.database.dialect, DialectKind::Mssql);
        assert!(config.migration.global_unique_id);
        assert!(config.migration.drop_index);
        assert!(!config.migration.drop_column);
        assert!(config.migration.verify);
        assert_eq!(config.database.ssl_mode, "require");
    }

    #[test]
    fn test_dialect_kind_parse() {
        assert_eq!(DialectKind::parse("PostgreSQL").unwrap(), DialectKind::Postgres);
        assert_eq!(DialectKind::parse("mariadb").unwrap(), DialectKind::Mysql);
        assert_eq!(DialectKind::parse("sqlite3").unwrap(), DialectKind::Sqlite);
        assert!(DialectKind::parse("oracle").is_err());
    }

    #[test]
    fn test_database_config_debug_redacts_password() {
        let mut config = valid_config();
        config.database.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.database);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
