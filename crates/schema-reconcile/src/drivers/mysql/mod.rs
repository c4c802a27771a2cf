//! MySQL/MariaDB driver.
//!
//! - [`MysqlDialect`]: type mapping and DDL rendering
//! - [`MysqlInspector`]: `INFORMATION_SCHEMA` reader on a SQLx pool
//! - [`MysqlExecutor`]: DDL on a `mysql_async` connection
//!
//! MySQL commits every DDL statement implicitly, so a failed plan leaves the
//! operations before it applied and the migrator reports a partial apply.
//!
//! # Supported Versions
//!
//! - MySQL 8.0.19+ (enforced CHECK constraints, `DROP CONSTRAINT`)
//! - MariaDB 10.5.2+ (`RENAME COLUMN`)
//!
//! Older servers are rejected at connect time.

mod dialect;
mod executor;
mod inspector;
mod version;

pub use dialect::MysqlDialect;
pub use executor::MysqlExecutor;
pub use inspector::MysqlInspector;
pub use version::{Flavor, ServerVersion};
