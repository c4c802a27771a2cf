//! Database driver implementations.
//!
//! - [`postgres`]: PostgreSQL (tokio-postgres + deadpool)
//! - [`mysql`]: MySQL/MariaDB (sqlx for the catalog, mysql_async for DDL)
//! - [`mssql`]: Microsoft SQL Server (tiberius + bb8)
//! - [`sqlite`]: SQLite (sqlx)
//! - [`common`]: TLS configuration and shared DDL fragments
//!
//! Each driver provides a `Dialect`, a `SchemaInspector` and a `PlanExecutor`.
//! [`DialectImpl`] is the closed set of dialects; it dispatches with a `match`
//! rather than a vtable.

pub mod common;
pub mod mssql;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use common::{SslMode, TlsBuilder};
pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::config::{DatabaseConfig, DialectKind};
use crate::core::entity::{DefaultValue, FieldType};
use crate::core::schema::Column;
use crate::core::traits::{Dialect, PlanExecutor, SchemaInspector};
use crate::dialect::check::CheckKind;
use crate::dialect::typemap::{TypeClass, TypeMapping};
use crate::error::Result;
use crate::plan::Operation;

/// Static dispatch over the supported dialects.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Postgres(PostgresDialect),
    Mysql(MysqlDialect),
    Mssql(MssqlDialect),
    Sqlite(SqliteDialect),
}

macro_rules! dispatch {
    ($self:ident, $d:ident => $body:expr) => {
        match $self {
            DialectImpl::Postgres($d) => $body,
            DialectImpl::Mysql($d) => $body,
            DialectImpl::Mssql($d) => $body,
            DialectImpl::Sqlite($d) => $body,
        }
    };
}

impl DialectImpl {
    pub fn from_kind(kind: DialectKind) -> Self {
        match kind {
            DialectKind::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
            DialectKind::Mysql => DialectImpl::Mysql(MysqlDialect::new()),
            DialectKind::Mssql => DialectImpl::Mssql(MssqlDialect::new()),
            DialectKind::Sqlite => DialectImpl::Sqlite(SqliteDialect::new()),
        }
    }

    /// Create a dialect from a database type string.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        Ok(Self::from_kind(DialectKind::parse(db_type)?))
    }
}

impl Dialect for DialectImpl {
    fn kind(&self) -> DialectKind {
        dispatch!(self, d => d.kind())
    }

    fn name(&self) -> &str {
        dispatch!(self, d => d.name())
    }

    fn quote_ident(&self, name: &str) -> String {
        dispatch!(self, d => d.quote_ident(name))
    }

    fn qualify(&self, schema: &str, table: &str) -> String {
        dispatch!(self, d => d.qualify(schema, table))
    }

    fn param_placeholder(&self, index: usize) -> String {
        dispatch!(self, d => d.param_placeholder(index))
    }

    fn max_identifier_len(&self) -> usize {
        dispatch!(self, d => d.max_identifier_len())
    }

    fn supports_transactional_ddl(&self) -> bool {
        dispatch!(self, d => d.supports_transactional_ddl())
    }

    fn map_field(&self, field_type: &FieldType) -> std::result::Result<TypeMapping, String> {
        dispatch!(self, d => d.map_field(field_type))
    }

    fn id_column(&self) -> Column {
        dispatch!(self, d => d.id_column())
    }

    fn column_type_sql(&self, column: &Column) -> String {
        dispatch!(self, d => d.column_type_sql(column))
    }

    fn base_class(&self, column: &Column) -> TypeClass {
        dispatch!(self, d => d.base_class(column))
    }

    fn classify(&self, column: &Column, check: Option<&CheckKind>) -> TypeClass {
        dispatch!(self, d => d.classify(column, check))
    }

    fn can_index(&self, column: &Column) -> bool {
        dispatch!(self, d => d.can_index(column))
    }

    fn default_allowed(&self, column: &Column) -> bool {
        dispatch!(self, d => d.default_allowed(column))
    }

    fn check_sql(&self, column: &Column, check: &CheckKind) -> String {
        dispatch!(self, d => d.check_sql(column, check))
    }

    fn default_sql(&self, value: &DefaultValue, column: &Column) -> String {
        dispatch!(self, d => d.default_sql(value, column))
    }

    fn render(&self, schema: &str, op: &Operation) -> Vec<String> {
        dispatch!(self, d => d.render(schema, op))
    }

    fn inline_foreign_keys(&self) -> bool {
        dispatch!(self, d => d.inline_foreign_keys())
    }

    fn unsupported_reason(&self, op: &Operation) -> Option<String> {
        dispatch!(self, d => d.unsupported_reason(op))
    }

    fn equal_fold(&self, column: &str, param: usize) -> String {
        dispatch!(self, d => d.equal_fold(column, param))
    }

    fn contains_fold(&self, column: &str, param: usize) -> String {
        dispatch!(self, d => d.contains_fold(column, param))
    }

    fn contains_pattern(&self, value: &str) -> String {
        dispatch!(self, d => d.contains_pattern(value))
    }
}

/// Catalog inspector and DDL executor for one live database.
pub struct Backend {
    pub inspector: Box<dyn SchemaInspector>,
    pub executor: Box<dyn PlanExecutor>,
}

/// Connect to the configured database and build its inspector and executor.
pub async fn connect(config: &DatabaseConfig) -> Result<Backend> {
    match config.dialect {
        DialectKind::Postgres => {
            let pool = postgres::connect(config).await?;
            Ok(Backend {
                inspector: Box::new(postgres::PostgresInspector::new(pool.clone(), config.schema())),
                executor: Box::new(postgres::PostgresExecutor::new(pool)),
            })
        }
        DialectKind::Mysql => Ok(Backend {
            inspector: Box::new(mysql::MysqlInspector::connect(config).await?),
            executor: Box::new(mysql::MysqlExecutor::connect(config).await?),
        }),
        DialectKind::Mssql => {
            let pool = mssql::connect(config).await?;
            Ok(Backend {
                inspector: Box::new(mssql::MssqlInspector::new(pool.clone(), config.schema())),
                executor: Box::new(mssql::MssqlExecutor::new(pool)),
            })
        }
        DialectKind::Sqlite => {
            let pool = sqlite::connect(config).await?;
            Ok(Backend {
                inspector: Box::new(sqlite::SqliteInspector::new(pool.clone(), config.schema())),
                executor: Box::new(sqlite::SqliteExecutor::new(pool)),
            })
        }
    }
}
