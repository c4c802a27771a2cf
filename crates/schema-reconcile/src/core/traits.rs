//! Core traits for dialect-aware schema reconciliation.
//!
//! - [`Dialect`]: type mapping, DDL rendering and predicate syntax for one engine
//! - [`SchemaInspector`]: reads the live catalog back into [`Table`] models
//! - [`PlanExecutor`] / [`DdlSession`]: apply rendered operations on one connection
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` implementations are interchangeable behind `DialectImpl`
//! - **Template Method**: `Dialect::classify` combines the dialect's base type
//!   classification with the shared check-constraint refinement

use async_trait::async_trait;

use super::entity::{DefaultValue, FieldType};
use super::schema::{Column, Table};
use crate::config::DialectKind;
use crate::dialect::check::CheckKind;
use crate::dialect::typemap::{refine_class, TypeClass, TypeMapping};
use crate::error::Result;
use crate::plan::{Operation, RenderedOperation};

use std::collections::BTreeMap;

/// SQL dialect strategy.
///
/// One implementation per supported engine; the planner, inspectors and DDL
/// renderer only ever talk to a dialect through this trait.
pub trait Dialect: Send + Sync {
    /// Which member of the closed dialect set this is.
    fn kind(&self) -> DialectKind;

    /// Dialect name (e.g., "postgres", "mysql", "mssql").
    fn name(&self) -> &str;

    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> String;

    /// Qualify a table name with its schema (database on MySQL).
    fn qualify(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }

    /// Parameter placeholder for prepared statements.
    fn param_placeholder(&self, index: usize) -> String;

    /// Longest identifier the engine accepts.
    fn max_identifier_len(&self) -> usize;

    /// Whether DDL statements participate in transactions.
    fn supports_transactional_ddl(&self) -> bool;

    /// Map a logical field type to a physical column plus auxiliary check.
    ///
    /// Returns the reason as `Err` when the type has no representation.
    fn map_field(&self, field_type: &FieldType) -> std::result::Result<TypeMapping, String>;

    /// The `bigint` identity column used as every table's primary key.
    fn id_column(&self) -> Column;

    /// Render the column type, e.g. `varchar(10)` or `int unsigned`.
    fn column_type_sql(&self, column: &Column) -> String;

    /// Classify a physical column by its native type alone.
    fn base_class(&self, column: &Column) -> TypeClass;

    /// Classify a physical column together with the check guarding it.
    fn classify(&self, column: &Column, check: Option<&CheckKind>) -> TypeClass {
        refine_class(self.base_class(column), check)
    }

    /// Whether the column can be an index key.
    fn can_index(&self, column: &Column) -> bool;

    /// Whether the column type accepts a literal DEFAULT.
    fn default_allowed(&self, _column: &Column) -> bool {
        true
    }

    /// Render the check constraint expression for a column.
    fn check_sql(&self, column: &Column, check: &CheckKind) -> String;

    /// Render a default literal for a column.
    fn default_sql(&self, value: &DefaultValue, column: &Column) -> String;

    /// Render one operation as DDL statements, in execution order.
    fn render(&self, schema: &str, op: &Operation) -> Vec<String>;

    /// Whether new tables declare their foreign keys inline.
    ///
    /// When false the planner adds them after every table exists.
    fn inline_foreign_keys(&self) -> bool {
        false
    }

    /// Why the engine cannot apply `op` in place, if it cannot.
    fn unsupported_reason(&self, _op: &Operation) -> Option<String> {
        None
    }

    /// Case-insensitive equality predicate against parameter `param`.
    fn equal_fold(&self, column: &str, param: usize) -> String;

    /// Case-insensitive containment predicate against parameter `param`.
    ///
    /// Bind the value produced by [`Dialect::contains_pattern`].
    fn contains_fold(&self, column: &str, param: usize) -> String;

    /// LIKE pattern matching `value` anywhere, with wildcards escaped.
    fn contains_pattern(&self, value: &str) -> String {
        format!("%{}%", crate::dialect::predicate::escape_like(value))
    }
}

/// Read the live catalog of one schema (database on MySQL).
#[async_trait]
pub trait SchemaInspector: Send + Sync {
    /// Schema (namespace) the inspector reads.
    fn namespace(&self) -> &str;

    /// Load the named tables. Tables that do not exist are absent from the result.
    async fn inspect(&self, tables: &[String]) -> Result<Vec<Table>>;

    /// Identity starting value for every table in the namespace that has one.
    async fn identity_starts(&self) -> Result<BTreeMap<String, i64>>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;
}

/// Execute rendered plans against the live database.
#[async_trait]
pub trait PlanExecutor: Send + Sync {
    /// Whether the whole plan can run inside one transaction.
    fn transactional(&self) -> bool;

    /// Open a session on a single connection.
    async fn session(&self) -> Result<Box<dyn DdlSession>>;
}

/// A single-connection DDL session.
#[async_trait]
pub trait DdlSession: Send {
    async fn begin(&mut self) -> Result<()>;

    /// Run one statement on the session's connection.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Apply every statement of one operation, in order.
    async fn apply(&mut self, op: &RenderedOperation) -> Result<()> {
        for stmt in &op.statements {
            self.execute(stmt).await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
