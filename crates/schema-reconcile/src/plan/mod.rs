//! Migration plans.
//!
//! A [`MigrationPlan`] is the ordered list of [`Operation`]s that brings a live
//! schema to the desired one. Plans are computed by [`diff::plan`] without
//! touching the database and rendered to DDL per dialect by
//! [`Dialect::render`](crate::core::Dialect::render).

pub mod diff;

use std::fmt;

use serde::Serialize;

use crate::allocator::TagAssignment;
use crate::core::schema::{CheckConstraint, Column, ForeignKey, Index, Table};
use crate::core::traits::Dialect;

pub use diff::{plan, DesiredSchema};

/// Replacement of a column's check when the column is renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckRename {
    /// Name of the live check guarding the old column name.
    pub from: String,
    /// Check guarding the new column name.
    pub to: CheckConstraint,
}

/// One schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create a table with its columns, checks and indexes.
    /// Foreign keys are added separately unless the dialect declares them inline.
    CreateTable { table: Table },

    AddColumn {
        table: String,
        column: Column,
        check: Option<CheckConstraint>,
    },

    RenameColumn {
        table: String,
        from: String,
        to: String,
        check: Option<CheckRename>,
    },

    /// Change a column to a type (or nullability) that holds every live value.
    WidenColumn {
        table: String,
        from: Column,
        to: Column,
        drop_check: Option<String>,
        add_check: Option<CheckConstraint>,
        /// Indexes covering the column, for engines that must rebuild them.
        indexes: Vec<Index>,
    },

    /// Set (or clear) the column default to `column.default`.
    ChangeDefault { table: String, column: Column },

    DropColumn {
        table: String,
        column: String,
        check: Option<String>,
        /// Indexes covering the column, dropped first.
        indexes: Vec<String>,
    },

    AddIndex { table: String, index: Index },

    DropIndex { table: String, index: String },

    AddForeignKey {
        table: String,
        foreign_key: ForeignKey,
    },
}

impl Operation {
    /// Table the operation applies to.
    pub fn table(&self) -> &str {
        match self {
            Operation::CreateTable { table } => &table.name,
            Operation::AddColumn { table, .. }
            | Operation::RenameColumn { table, .. }
            | Operation::WidenColumn { table, .. }
            | Operation::ChangeDefault { table, .. }
            | Operation::DropColumn { table, .. }
            | Operation::AddIndex { table, .. }
            | Operation::DropIndex { table, .. }
            | Operation::AddForeignKey { table, .. } => table,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CreateTable { .. } => "create_table",
            Operation::AddColumn { .. } => "add_column",
            Operation::RenameColumn { .. } => "rename_column",
            Operation::WidenColumn { .. } => "widen_column",
            Operation::ChangeDefault { .. } => "change_default",
            Operation::DropColumn { .. } => "drop_column",
            Operation::AddIndex { .. } => "add_index",
            Operation::DropIndex { .. } => "drop_index",
            Operation::AddForeignKey { .. } => "add_foreign_key",
        }
    }

    /// Whether the operation can destroy data or access paths.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Operation::DropColumn { .. } | Operation::DropIndex { .. }
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateTable { table } => {
                write!(f, "create table {} ({} columns)", table.name, table.columns.len())
            }
            Operation::AddColumn { table, column, .. } => {
                write!(f, "add column {}.{} {}", table, column.name, column.type_label())
            }
            Operation::RenameColumn { table, from, to, .. } => {
                write!(f, "rename column {}.{} -> {}", table, from, to)
            }
            Operation::WidenColumn {
                table, from, to, ..
            } => {
                let null_note = if to.is_nullable && !from.is_nullable {
                    ", drop not null"
                } else {
                    ""
                };
                write!(
                    f,
                    "widen column {}.{} {} -> {}{}",
                    table,
                    to.name,
                    from.type_label(),
                    to.type_label(),
                    null_note
                )
            }
            Operation::ChangeDefault { table, column } => match &column.default {
                Some(d) => write!(f, "set default {}.{} = {}", table, column.name, d),
                None => write!(f, "drop default {}.{}", table, column.name),
            },
            Operation::DropColumn { table, column, .. } => {
                write!(f, "drop column {}.{}", table, column)
            }
            Operation::AddIndex { table, index } => write!(
                f,
                "add {}index {} on {} ({})",
                if index.is_unique { "unique " } else { "" },
                index.name,
                table,
                index.columns.join(", ")
            ),
            Operation::DropIndex { table, index } => {
                write!(f, "drop index {} on {}", index, table)
            }
            Operation::AddForeignKey { table, foreign_key } => write!(
                f,
                "add foreign key {} on {} -> {}",
                foreign_key.name, table, foreign_key.ref_table
            ),
        }
    }
}

/// An operation together with the statements that apply it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedOperation {
    pub operation: Operation,
    pub description: String,
    pub statements: Vec<String>,
}

impl RenderedOperation {
    pub fn new<D: Dialect + ?Sized>(dialect: &D, schema: &str, operation: Operation) -> Self {
        let statements = dialect.render(schema, &operation);
        Self {
            description: operation.to_string(),
            operation,
            statements,
        }
    }
}

/// Ordered schema changes plus the id-block tags they rely on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub operations: Vec<Operation>,

    /// Tag assignments; empty unless globally unique ids are enabled.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagAssignment>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn destructive_count(&self) -> usize {
        self.operations.iter().filter(|op| op.is_destructive()).count()
    }

    /// Render every operation for the dialect.
    pub fn render<D: Dialect + ?Sized>(&self, dialect: &D, schema: &str) -> Vec<RenderedOperation> {
        self.operations
            .iter()
            .cloned()
            .map(|op| RenderedOperation::new(dialect, schema, op))
            .collect()
    }
}
