//! Physical table model shared by the type mapper, inspectors and planner.
//!
//! A [`Table`] is either *desired* (derived from an entity type through the
//! dialect's type mapper) or *live* (read back by a schema inspector). Both use
//! the same representation so the planner can compare them directly.

use serde::{Deserialize, Serialize};

/// Table metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Secondary indexes (primary key excluded).
    #[serde(default)]
    pub indexes: Vec<Index>,

    /// Outgoing foreign keys.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,

    /// Check constraints.
    #[serde(default)]
    pub check_constraints: Vec<CheckConstraint>,

    /// Starting value of the identity sequence, when one is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_start: Option<i64>,
}

impl Table {
    /// Create an empty table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Find an index by name.
    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Find a check constraint by name.
    pub fn check(&self, name: &str) -> Option<&CheckConstraint> {
        self.check_constraints.iter().find(|c| c.name == name)
    }

    /// The identity (auto-increment) column, if any.
    pub fn identity_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_identity)
    }

    /// Names of tables this table references, excluding itself.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.foreign_keys
            .iter()
            .map(|fk| fk.ref_table.as_str())
            .filter(move |t| *t != self.name)
    }
}

/// Column metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Base data type, lowercase and without length (e.g. "varchar", "bigint").
    pub data_type: String,

    /// Character or byte bound: 0 when not applicable, -1 for MAX/unbounded.
    #[serde(default)]
    pub max_length: i64,

    /// Native UNSIGNED modifier (MySQL).
    #[serde(default)]
    pub is_unsigned: bool,

    /// Native enumeration members (MySQL ENUM).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,

    /// Whether the column is nullable.
    pub is_nullable: bool,

    /// Default expression as rendered by, or read back from, the database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Whether this is an identity/auto-increment column.
    #[serde(default)]
    pub is_identity: bool,
}

impl Column {
    /// Short human-readable type label, e.g. `varchar(10)` or `int unsigned`.
    pub fn type_label(&self) -> String {
        let mut label = self.data_type.clone();
        if !self.enum_values.is_empty() {
            label = format!("{}({})", label, self.enum_values.join(","));
        } else if self.max_length == -1 {
            label.push_str("(max)");
        } else if self.max_length > 0 {
            label = format!("{}({})", label, self.max_length);
        }
        if self.is_unsigned {
            label.push_str(" unsigned");
        }
        label
    }
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Key columns in order.
    pub columns: Vec<String>,

    /// Whether this is a unique index.
    pub is_unique: bool,
}

impl Index {
    /// Whether two indexes cover the same columns with the same uniqueness.
    pub fn same_definition(&self, other: &Index) -> bool {
        self.columns == other.columns && self.is_unique == other.is_unique
    }
}

/// Foreign key metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Foreign key name.
    pub name: String,

    /// Referencing columns.
    pub columns: Vec<String>,

    /// Referenced table.
    pub ref_table: String,

    /// Referenced columns.
    pub ref_columns: Vec<String>,

    /// ON DELETE action, normalized ("NO ACTION", "CASCADE", "SET NULL").
    pub on_delete: String,
}

/// Check constraint metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    /// Constraint name.
    pub name: String,

    /// Constraint definition (SQL expression).
    pub definition: String,
}

/// Normalize a referential action as reported by any of the supported catalogs.
pub fn normalize_referential_action(action: &str) -> String {
    match action.trim().to_uppercase().replace('_', " ").as_str() {
        "C" | "CASCADE" => "CASCADE".to_string(),
        "N" | "SET NULL" => "SET NULL".to_string(),
        "D" | "SET DEFAULT" => "SET DEFAULT".to_string(),
        "R" | "RESTRICT" => "RESTRICT".to_string(),
        _ => "NO ACTION".to_string(),
    }
}
