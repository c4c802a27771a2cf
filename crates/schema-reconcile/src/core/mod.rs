//! Core abstractions for schema reconciliation.
//!
//! - [`entity`]: the desired schema (entity types, fields, indexes, references)
//! - [`schema`]: the physical table model shared by desired and live state
//! - [`identifier`]: identifier validation, quoting and derived names
//! - [`traits`]: dialect strategy, catalog inspection and DDL execution seams
//!
//! Driver modules (`drivers/postgres`, `drivers/mysql`, `drivers/mssql`)
//! implement these traits; the planner and migrator only depend on this module.

pub mod entity;
pub mod identifier;
pub mod schema;
pub mod traits;

pub use entity::{
    DefaultValue, EntityType, Field, FieldType, IndexDef, OnDelete, Reference, Schema, ID_COLUMN,
};
pub use schema::{CheckConstraint, Column, ForeignKey, Index, Table};
pub use traits::{DdlSession, Dialect, PlanExecutor, SchemaInspector};
