//! # schema-reconcile
//!
//! Declarative schema reconciliation for PostgreSQL, MySQL/MariaDB,
//! SQL Server and SQLite.
//!
//! A desired schema of entity types is mapped to physical tables per dialect,
//! compared against the live catalog and turned into an ordered, additive
//! migration plan:
//!
//! - **Capacity-aware diffing**: columns only ever widen; shrinking is a conflict
//! - **Explicit renames** taken from `previous_name`, never guessed
//! - **Opt-in destruction**: column and index drops need `drop_column`/`drop_index`
//! - **Globally unique ids**: each table owns a 2^32 id block recovered by inspection
//! - **Transactional apply** where the engine supports transactional DDL
//!
//! ## Example
//!
//! ```rust,no_run
//! use schema_reconcile::{Config, Migrator, Schema};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let schema = Schema::load("schema.yaml")?;
//!     let migrator = Migrator::connect(&config).await?;
//!     let report = migrator.migrate(&schema, CancellationToken::new()).await?;
//!     println!("Applied {} operations", report.applied());
//!     Ok(())
//! }
//! ```

pub mod allocator;
pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod migrator;
pub mod plan;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use allocator::{allocate, IdBlock, TagAssignment};
pub use config::{Config, DatabaseConfig, DialectKind, MigrateOptions};
pub use core::{
    Column, DefaultValue, Dialect, EntityType, Field, FieldType, IndexDef, OnDelete, Reference,
    Schema, Table,
};
pub use dialect::{is_constraint_error, ConstraintError, ConstraintKind};
pub use drivers::{Backend, DialectImpl};
pub use error::{MigrateError, Result};
pub use migrator::{HealthCheckResult, MigrationReport, Migrator};
pub use plan::{DesiredSchema, MigrationPlan, Operation, RenderedOperation};
