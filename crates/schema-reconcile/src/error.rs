//! Error types for schema reconciliation.

use thiserror::Error;

/// Main error type for planning and applying schema migrations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, invalid desired schema, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient connection failure. The whole invocation may be retried.
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Live schema conflicts with the desired schema in a non-widening way.
    #[error("Schema conflict on {table}{}: {reason}", column_suffix(.column))]
    SchemaConflict {
        table: String,
        column: Option<String>,
        reason: String,
    },

    /// A logical type has no representation in the target dialect.
    #[error("Unsupported type for {table}.{column} on {dialect}: {reason}")]
    UnsupportedType {
        dialect: String,
        table: String,
        column: String,
        reason: String,
    },

    /// A non-transactional plan failed after earlier operations committed.
    #[error(
        "Migration partially applied: {applied}/{total} operations committed (last applied: {}), failed at: {failed}",
        last_applied_label(.last_applied)
    )]
    PartialApply {
        applied: usize,
        total: usize,
        last_applied: Option<String>,
        failed: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// An operation failed with nothing left committed.
    #[error("Operation failed: {operation}")]
    Execution {
        operation: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Migration was cancelled between operations (SIGINT, etc.)
    #[error("Migration cancelled after {applied}/{total} operations{}", rollback_note(.rolled_back))]
    Cancelled {
        applied: usize,
        total: usize,
        rolled_back: bool,
    },

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// SQL Server driver error
    #[error("SQL Server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// MySQL driver error (DDL execution)
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// MySQL driver error (catalog inspection)
    #[error("MySQL catalog error: {0}")]
    Sqlx(#[from] sqlx::Error),

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

fn column_suffix(column: &Option<String>) -> String {
    match column {
        Some(c) => format!(".{}", c),
        None => String::new(),
    }
}

fn last_applied_label(last_applied: &Option<String>) -> &str {
    last_applied.as_deref().unwrap_or("none")
}

fn rollback_note(rolled_back: &bool) -> &'static str {
    if *rolled_back {
        " (rolled back)"
    } else {
        ""
    }
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a SchemaConflict error scoped to a table.
    pub fn conflict(table: impl Into<String>, reason: impl Into<String>) -> Self {
        MigrateError::SchemaConflict {
            table: table.into(),
            column: None,
            reason: reason.into(),
        }
    }

    /// Create a SchemaConflict error scoped to a column.
    pub fn column_conflict(
        table: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        MigrateError::SchemaConflict {
            table: table.into(),
            column: Some(column.into()),
            reason: reason.into(),
        }
    }

    /// Create an Execution error wrapping the driver failure.
    pub fn execution(operation: impl Into<String>, source: MigrateError) -> Self {
        MigrateError::Execution {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => 1,
            MigrateError::Connection { .. } => 2,
            MigrateError::SchemaConflict { .. } => 3,
            MigrateError::UnsupportedType { .. } => 4,
            MigrateError::PartialApply { .. } => 5,
            MigrateError::Execution { .. } => 6,
            MigrateError::Postgres(_)
            | MigrateError::Mssql(_)
            | MigrateError::Mysql(_)
            | MigrateError::Sqlx(_) => 6,
            MigrateError::Io(_) => 7,
            MigrateError::Cancelled { .. } => 130,
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

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
