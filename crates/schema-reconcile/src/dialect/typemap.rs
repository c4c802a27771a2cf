//! Type mapping and capacity comparison.
//!
//! Desired and live columns are both reduced to a [`TypeClass`], a
//! dialect-independent description of the values a column can hold once its
//! native type and emulating check are taken together. The planner compares
//! classes, never type names, so an already-correct emulation (e.g. `bigint`
//! plus `>= 0` standing in for `uint32`) is recognized as equal.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::warn;

use super::check::CheckKind;
use crate::core::entity::{EntityType, Schema};
use crate::core::identifier::{
    check_name, foreign_key_name, index_name, unique_index_name, validate_identifier_len,
};
use crate::core::schema::{CheckConstraint, Column, ForeignKey, Index, Table};
use crate::core::traits::Dialect;
use crate::error::{MigrateError, Result};

/// How a logical type was emulated on a dialect without a native equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Emulation {
    /// Unsigned integer stored in the next wider signed type plus `>= 0`.
    UnsignedWidened,
    /// Unsigned integer stored in a same-width signed type plus `>= 0`.
    UnsignedChecked,
    /// Length bound enforced by a check over an unbounded or wider type.
    LengthChecked,
    /// Enumeration stored as a string plus an `IN (...)` check.
    EnumChecked,
}

/// Result of mapping a logical field type onto one dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMapping {
    /// Physical column; name, nullability and default are filled in by the caller.
    pub column: Column,
    /// Check constraint required to enforce the logical type.
    pub check: Option<CheckKind>,
    /// Which emulation was used, if any.
    pub emulation: Option<Emulation>,
    /// Warning for mappings that cannot represent the full logical range.
    pub warning: Option<String>,
}

impl TypeMapping {
    /// Create a native mapping with no emulation.
    pub fn native(column: Column) -> Self {
        Self {
            column,
            check: None,
            emulation: None,
            warning: None,
        }
    }

    /// Create a mapping that relies on a check constraint.
    pub fn emulated(column: Column, check: CheckKind, emulation: Emulation) -> Self {
        Self {
            column,
            check: Some(check),
            emulation: Some(emulation),
            warning: None,
        }
    }

    /// Attach a lossy-mapping warning.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// Build a physical column skeleton.
pub fn column(data_type: &str, max_length: i64) -> Column {
    Column {
        data_type: data_type.to_string(),
        max_length,
        ..Default::default()
    }
}

/// Dialect-independent capacity of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeClass {
    Integer { min: i128, max: i128 },
    Text { max_len: Option<u64> },
    Binary { max_len: Option<u64> },
    Enum(BTreeSet<String>),
    Bool,
    Timestamp,
    Other(String),
}

impl TypeClass {
    /// Integer class for a bit width and signedness.
    pub fn integer(bits: u32, signed: bool) -> Self {
        if signed {
            TypeClass::Integer {
                min: -(1i128 << (bits - 1)),
                max: (1i128 << (bits - 1)) - 1,
            }
        } else {
            TypeClass::Integer {
                min: 0,
                max: (1i128 << bits) - 1,
            }
        }
    }

    /// Class for a text column with an optional bound (0 or -1 mean unbounded).
    pub fn text(max_length: i64) -> Self {
        TypeClass::Text {
            max_len: bound(max_length),
        }
    }

    /// Class for a binary column with an optional bound (0 or -1 mean unbounded).
    pub fn binary(max_length: i64) -> Self {
        TypeClass::Binary {
            max_len: bound(max_length),
        }
    }
}

fn bound(max_length: i64) -> Option<u64> {
    if max_length > 0 {
        Some(max_length as u64)
    } else {
        None
    }
}

impl fmt::Display for TypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn cap(n: &Option<u64>) -> String {
            n.map(|n| n.to_string()).unwrap_or_else(|| "unbounded".to_string())
        }
        match self {
            TypeClass::Integer { min, max } => write!(f, "integer [{}, {}]", min, max),
            TypeClass::Text { max_len } => write!(f, "text ({})", cap(max_len)),
            TypeClass::Binary { max_len } => write!(f, "binary ({})", cap(max_len)),
            TypeClass::Enum(values) => {
                let v: Vec<&str> = values.iter().map(String::as_str).collect();
                write!(f, "enum {{{}}}", v.join(", "))
            }
            TypeClass::Bool => f.write_str("bool"),
            TypeClass::Timestamp => f.write_str("timestamp"),
            TypeClass::Other(t) => write!(f, "{}", t),
        }
    }
}

/// Narrow a native class by the check guarding the column.
pub fn refine_class(base: TypeClass, check: Option<&CheckKind>) -> TypeClass {
    match (base, check) {
        (TypeClass::Integer { min, max }, Some(CheckKind::NonNegative)) => TypeClass::Integer {
            min: min.max(0),
            max,
        },
        (TypeClass::Text { max_len }, Some(CheckKind::MaxLen(n))) => TypeClass::Text {
            max_len: Some(max_len.map_or(*n, |m| m.min(*n))),
        },
        (TypeClass::Binary { max_len }, Some(CheckKind::MaxLen(n))) => TypeClass::Binary {
            max_len: Some(max_len.map_or(*n, |m| m.min(*n))),
        },
        (TypeClass::Text { .. }, Some(CheckKind::OneOf(values))) => {
            TypeClass::Enum(values.clone())
        }
        (base, _) => base,
    }
}

/// Outcome of comparing a desired column class against the live one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compat {
    /// Already correct.
    Equal,
    /// Desired strictly contains live; the change cannot lose data.
    Widening,
    /// Any other change. Carries a human-readable reason.
    Conflict(String),
}

/// Compare a desired class against a live class.
pub fn compare(desired: &TypeClass, live: &TypeClass) -> Compat {
    if desired == live {
        return Compat::Equal;
    }

    let widening = match (live, desired) {
        (
            TypeClass::Integer { min: lmin, max: lmax },
            TypeClass::Integer { min: dmin, max: dmax },
        ) => dmin <= lmin && dmax >= lmax,
        (TypeClass::Text { max_len: l }, TypeClass::Text { max_len: d })
        | (TypeClass::Binary { max_len: l }, TypeClass::Binary { max_len: d }) => fits(*l, *d),
        (TypeClass::Enum(l), TypeClass::Enum(d)) => l.is_subset(d),
        (TypeClass::Enum(l), TypeClass::Text { max_len: d }) => {
            let longest = l.iter().map(|v| v.chars().count() as u64).max().unwrap_or(0);
            fits(Some(longest), *d)
        }
        (TypeClass::Integer { min, max }, TypeClass::Text { max_len: d }) => {
            let digits = min.to_string().len().max(max.to_string().len()) as u64;
            fits(Some(digits), *d)
        }
        _ => false,
    };

    if widening {
        Compat::Widening
    } else {
        Compat::Conflict(format!("cannot change {} to {}", live, desired))
    }
}

/// Whether a live bound fits in a desired bound (`None` is unbounded).
fn fits(live: Option<u64>, desired: Option<u64>) -> bool {
    match (live, desired) {
        (_, None) => true,
        (Some(l), Some(d)) => d >= l,
        (None, Some(_)) => false,
    }
}

/// Normalize a default expression for comparison.
///
/// Strips wrapping parentheses (SQL Server), `::type` casts (PostgreSQL),
/// `N` and charset introducers, and literal quotes.
pub fn normalize_default(raw: &str) -> String {
    let mut s = strip_parens(raw.trim());

    if let Some(pos) = find_outside_quotes(s, "::") {
        s = strip_parens(s[..pos].trim());
    }

    if let Some(q) = s.find('\'') {
        let prefix = &s[..q];
        if prefix.eq_ignore_ascii_case("n") || prefix.starts_with('_') {
            s = &s[q..];
        }
    }

    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        return s[1..s.len() - 1].replace("''", "'");
    }

    s.to_lowercase()
}

fn strip_parens(mut s: &str) -> &str {
    while s.starts_with('(') && s.ends_with(')') && wraps_whole(s) {
        s = s[1..s.len() - 1].trim();
    }
    s
}

/// Whether the opening parenthesis at 0 closes at the final character.
fn wraps_whole(s: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quote = false;
    let last = s.len() - 1;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth == 0 && i != last {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn find_outside_quotes(s: &str, needle: &str) -> Option<usize> {
    let mut in_quote = false;
    for (i, c) in s.char_indices() {
        if c == '\'' {
            in_quote = !in_quote;
        } else if !in_quote && s[i..].starts_with(needle) {
            return Some(i);
        }
    }
    None
}

/// Whether two default expressions are equivalent.
pub fn same_default(desired: Option<&str>, live: Option<&str>) -> bool {
    match (desired, live) {
        (None, None) => true,
        (Some(d), Some(l)) => normalize_default(d) == normalize_default(l),
        (None, Some(l)) => normalize_default(l) == "null",
        (Some(_), None) => false,
    }
}

/// Derive the desired physical tables for every entity, in declared order.
pub fn desired_tables<D: Dialect + ?Sized>(dialect: &D, schema: &Schema) -> Result<Vec<Table>> {
    schema
        .entities
        .iter()
        .map(|entity| desired_table(dialect, entity, schema))
        .collect()
}

/// Derive the desired physical table for one entity.
pub fn desired_table<D: Dialect + ?Sized>(
    dialect: &D,
    entity: &EntityType,
    schema: &Schema,
) -> Result<Table> {
    let name = entity.table_name();
    let mut table = Table::new(&name);
    table.columns.push(dialect.id_column());

    let unsupported = |column: &str, reason: String| MigrateError::UnsupportedType {
        dialect: dialect.name().to_string(),
        table: name.clone(),
        column: column.to_string(),
        reason,
    };

    for field in &entity.fields {
        let mapping = dialect
            .map_field(&field.field_type)
            .map_err(|reason| unsupported(&field.name, reason))?;
        if let Some(warning) = &mapping.warning {
            warn!("Column {}.{}: {}", name, field.name, warning);
        }

        let mut col = mapping.column;
        col.name = field.name.clone();
        col.is_nullable = field.nullable;
        if let Some(default) = &field.default {
            if !dialect.default_allowed(&col) {
                return Err(unsupported(
                    &field.name,
                    format!("{} cannot carry a literal default", dialect.column_type_sql(&col)),
                ));
            }
            col.default = Some(dialect.default_sql(default, &col));
        }

        if let Some(kind) = &mapping.check {
            table.check_constraints.push(CheckConstraint {
                name: check_name(&name, &col.name),
                definition: dialect.check_sql(&col, kind),
            });
        }
        if field.unique {
            table.indexes.push(Index {
                name: unique_index_name(&name, &col.name),
                columns: vec![col.name.clone()],
                is_unique: true,
            });
        }
        table.columns.push(col);
    }

    for reference in &entity.references {
        let target = schema.entity(&reference.target).ok_or_else(|| {
            MigrateError::Config(format!(
                "{}.{}: reference target '{}' is not a declared entity",
                entity.name, reference.column, reference.target
            ))
        })?;
        let mut col = dialect.id_column();
        col.name = reference.column.clone();
        col.is_identity = false;
        col.is_nullable = reference.nullable;
        table.columns.push(col);

        table.foreign_keys.push(ForeignKey {
            name: foreign_key_name(&name, &reference.column),
            columns: vec![reference.column.clone()],
            ref_table: target.table_name(),
            ref_columns: vec![crate::core::ID_COLUMN.to_string()],
            on_delete: reference.on_delete.as_sql().to_string(),
        });
    }

    for def in &entity.indexes {
        let index_name = def
            .name
            .clone()
            .unwrap_or_else(|| index_name(&name, &def.fields));
        table.indexes.push(Index {
            name: index_name,
            columns: def.fields.clone(),
            is_unique: def.unique,
        });
    }

    for index in &table.indexes {
        for col_name in &index.columns {
            if let Some(col) = table.column(col_name) {
                if !dialect.can_index(col) {
                    return Err(unsupported(
                        col_name,
                        format!(
                            "{} cannot be used as an index key (index {})",
                            dialect.column_type_sql(col),
                            index.name
                        ),
                    ));
                }
            }
        }
    }

    let max_len = dialect.max_identifier_len();
    let derived = std::iter::once(table.name.as_str())
        .chain(table.columns.iter().map(|c| c.name.as_str()))
        .chain(table.indexes.iter().map(|i| i.name.as_str()))
        .chain(table.foreign_keys.iter().map(|f| f.name.as_str()))
        .chain(table.check_constraints.iter().map(|c| c.name.as_str()));
    for ident in derived {
        validate_identifier_len(ident, max_len).map_err(|e| {
            MigrateError::Config(format!("{} on {}: {}", table.name, dialect.name(), e))
        })?;
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_integer_widening() {
        let i16c = TypeClass::integer(16, true);
        let i32c = TypeClass::integer(32, true);
        let u32c = TypeClass::integer(32, false);
        assert_eq!(compare(&i32c, &i16c), Compat::Widening);
        assert!(matches!(compare(&i16c, &i32c), Compat::Conflict(_)));
        // signed to unsigned of the same width loses negatives
        assert!(matches!(compare(&u32c, &i32c), Compat::Conflict(_)));
        assert_eq!(compare(&i32c, &i32c), Compat::Equal);
    }

    #[test]
    fn test_text_and_binary_bounds() {
        let t10 = TypeClass::Text { max_len: Some(10) };
        let t20 = TypeClass::Text { max_len: Some(20) };
        let text = TypeClass::Text { max_len: None };
        assert_eq!(compare(&t20, &t10), Compat::Widening);
        assert_eq!(compare(&text, &t10), Compat::Widening);
        assert!(matches!(compare(&t10, &t20), Compat::Conflict(_)));
        assert!(matches!(compare(&t10, &text), Compat::Conflict(_)));

        let b255 = TypeClass::Binary { max_len: Some(255) };
        let b1k = TypeClass::Binary { max_len: Some(1000) };
        assert_eq!(compare(&b1k, &b255), Compat::Widening);
        assert!(matches!(compare(&b1k, &t10), Compat::Conflict(_)));
    }

    #[test]
    fn test_enum_widening() {
        let small = TypeClass::Enum(set(&["logged_in", "logged_out"]));
        let large = TypeClass::Enum(set(&["logged_in", "logged_out", "online"]));
        assert_eq!(compare(&large, &small), Compat::Widening);
        assert!(matches!(compare(&small, &large), Compat::Conflict(_)));

        let t10 = TypeClass::Text { max_len: Some(10) };
        let t5 = TypeClass::Text { max_len: Some(5) };
        assert_eq!(compare(&t10, &small), Compat::Widening);
        assert!(matches!(compare(&t5, &small), Compat::Conflict(_)));
    }

    #[test]
    fn test_integer_to_string_conversion() {
        let i64c = TypeClass::integer(64, true);
        let u8c = TypeClass::integer(8, false);
        assert_eq!(
            compare(&TypeClass::Text { max_len: None }, &i64c),
            Compat::Widening
        );
        assert_eq!(
            compare(&TypeClass::Text { max_len: Some(20) }, &i64c),
            Compat::Widening
        );
        assert!(matches!(
            compare(&TypeClass::Text { max_len: Some(19) }, &i64c),
            Compat::Conflict(_)
        ));
        assert_eq!(
            compare(&TypeClass::Text { max_len: Some(3) }, &u8c),
            Compat::Widening
        );
    }

    #[test]
    fn test_unrelated_classes_conflict() {
        assert!(matches!(
            compare(&TypeClass::Bool, &TypeClass::integer(8, true)),
            Compat::Conflict(_)
        ));
        assert!(matches!(
            compare(&TypeClass::Timestamp, &TypeClass::Text { max_len: None }),
            Compat::Conflict(_)
        ));
    }

    #[test]
    fn test_refine_class() {
        let int32 = TypeClass::integer(32, true);
        assert_eq!(
            refine_class(int32, Some(&CheckKind::NonNegative)),
            TypeClass::Integer {
                min: 0,
                max: i32::MAX as i128
            }
        );
        assert_eq!(
            refine_class(
                TypeClass::Text { max_len: None },
                Some(&CheckKind::MaxLen(300))
            ),
            TypeClass::Text { max_len: Some(300) }
        );
        assert_eq!(
            refine_class(
                TypeClass::Text { max_len: None },
                Some(&CheckKind::one_of(["a", "b"]))
            ),
            TypeClass::Enum(set(&["a", "b"]))
        );
        assert_eq!(
            refine_class(TypeClass::Bool, Some(&CheckKind::NonNegative)),
            TypeClass::Bool
        );
    }

    #[test]
    fn test_normalize_default() {
        assert_eq!(normalize_default("'SWE'::character varying"), "SWE");
        assert_eq!(normalize_default("(N'SWE')"), "SWE");
        assert_eq!(normalize_default("((5))"), "5");
        assert_eq!(normalize_default("'it''s'"), "it's");
        assert_eq!(normalize_default("_utf8mb4'SWE'"), "SWE");
        assert_eq!(normalize_default("TRUE"), "true");
        assert_eq!(normalize_default("(1) + (2)"), "(1) + (2)");
        assert_eq!(normalize_default("'-5'::integer"), "-5");
    }

    #[test]
    fn test_same_default() {
        assert!(same_default(Some("'a'"), Some("a")));
        assert!(same_default(Some("0"), Some("((0))")));
        assert!(same_default(None, None));
        assert!(same_default(None, Some("NULL")));
        assert!(!same_default(Some("1"), None));
        assert!(!same_default(Some("'a'"), Some("'b'")));
    }
}
