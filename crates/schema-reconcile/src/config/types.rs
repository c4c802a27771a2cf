//! Configuration type definitions.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database connection.
    pub database: DatabaseConfig,

    /// Migration toggles.
    #[serde(default)]
    pub migration: MigrateOptions,
}

/// Closed set of supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    #[serde(alias = "mariadb")]
    Mysql,
    #[serde(alias = "sqlserver", alias = "sql_server")]
    Mssql,
    #[serde(alias = "sqlite3")]
    Sqlite,
}

impl DialectKind {
    /// Parse a dialect name, accepting the usual aliases.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DialectKind::Postgres),
            "mysql" | "mariadb" => Ok(DialectKind::Mysql),
            "mssql" | "sqlserver" | "sql_server" => Ok(DialectKind::Mssql),
            "sqlite" | "sqlite3" => Ok(DialectKind::Sqlite),
            other => Err(MigrateError::Config(format!(
                "Unknown database type: '{}'. Supported types: postgres, mysql, mssql, sqlite",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::Mysql => "mysql",
            DialectKind::Mssql => "mssql",
            DialectKind::Sqlite => "sqlite",
        }
    }

    /// Default TCP port. SQLite is file-based and has none.
    pub fn default_port(&self) -> u16 {
        match self {
            DialectKind::Postgres => 5432,
            DialectKind::Mysql => 3306,
            DialectKind::Mssql => 1433,
            DialectKind::Sqlite => 0,
        }
    }

    /// Whether the dialect connects over the network.
    pub fn is_networked(&self) -> bool {
        !matches!(self, DialectKind::Sqlite)
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database type: postgres, mysql, mssql or sqlite.
    #[serde(rename = "type", default)]
    pub dialect: DialectKind,

    /// Database host (unused for SQLite).
    #[serde(default)]
    pub host: String,

    /// Database port (default depends on the dialect).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name; for SQLite, the file path or `:memory:`.
    pub database: String,

    /// Username (unused for SQLite).
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema to reconcile (default: public, dbo, main, or the database name on MySQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// SSL mode: disable, require, verify-ca, verify-full (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// Connection timeout in seconds (default: 30).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Effective port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.dialect.default_port())
    }

    /// Effective schema (namespace) name.
    pub fn schema(&self) -> String {
        match (&self.schema, self.dialect) {
            (Some(s), _) => s.clone(),
            (None, DialectKind::Postgres) => "public".to_string(),
            (None, DialectKind::Mssql) => "dbo".to_string(),
            (None, DialectKind::Mysql) => self.database.clone(),
            (None, DialectKind::Sqlite) => "main".to_string(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema())
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration toggles. All destructive behavior is opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateOptions {
    /// Encode an entity-type tag in the high 32 bits of every generated id.
    #[serde(default)]
    pub global_unique_id: bool,

    /// Permit dropping columns absent from the desired schema.
    #[serde(default)]
    pub drop_column: bool,

    /// Permit dropping indexes absent from the desired schema.
    #[serde(default)]
    pub drop_index: bool,

    /// Re-inspect after applying and fail if anything is still pending (default: true).
    #[serde(default = "default_true")]
    pub verify: bool,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            global_unique_id: false,
            drop_column: false,
            drop_index: false,
            verify: true,
        }
    }
}

impl MigrateOptions {
    pub fn with_global_unique_id(mut self, enabled: bool) -> Self {
        self.global_unique_id = enabled;
        self
    }

    pub fn with_drop_column(mut self, enabled: bool) -> Self {
        self.drop_column = enabled;
        self
    }

    pub fn with_drop_index(mut self, enabled: bool) -> Self {
        self.drop_index = enabled;
        self
    }
}

fn default_require() -> String {
    "require".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}
