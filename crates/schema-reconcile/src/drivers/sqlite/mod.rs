//! SQLite driver.
//!
//! - [`SqliteDialect`]: type mapping and DDL rendering
//! - [`SqliteInspector`]: catalog reader over `sqlite_master` and the table pragmas
//! - [`SqliteExecutor`]: transactional DDL on the single pooled connection
//!
//! `database` is a file path, created when missing, or `:memory:`. The schema
//! is always `main`.
//!
//! # Limits
//!
//! SQLite's `ALTER TABLE` cannot change a column's type, default or checks,
//! and cannot add foreign keys. Plans needing any of those are refused as
//! schema conflicts instead of rebuilding the table.

mod dialect;
mod executor;
mod inspector;

pub use dialect::SqliteDialect;
pub use executor::SqliteExecutor;
pub use inspector::SqliteInspector;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{MigrateError, Result};

/// Open the database and verify it with a round trip.
///
/// The pool holds exactly one connection so catalog reads observe the DDL
/// session's uncommitted changes and `:memory:` databases are not lost.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = if config.database == ":memory:" {
        SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| MigrateError::connection(e, "parsing SQLite options"))?
    } else {
        SqliteConnectOptions::new()
            .filename(&config.database)
            .create_if_missing(true)
    }
    .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
        .acquire_timeout(config.connect_timeout())
        .connect_with(options)
        .await
        .map_err(|e| MigrateError::connection(e, "opening SQLite database"))?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| MigrateError::connection(e, "testing SQLite connection"))?;

    info!("Opened SQLite database: {}", config.display_url());
    Ok(pool)
}
