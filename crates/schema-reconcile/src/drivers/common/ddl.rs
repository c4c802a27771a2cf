//! DDL fragments shared by the dialect renderers.

use crate::core::schema::{ForeignKey, Index};
use crate::core::traits::Dialect;

/// Quote and comma-join a column list.
pub fn column_list<D: Dialect + ?Sized>(dialect: &D, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `CREATE [UNIQUE] INDEX name ON table (cols)`.
pub fn create_index<D: Dialect + ?Sized>(dialect: &D, schema: &str, table: &str, index: &Index) -> String {
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.is_unique { "UNIQUE " } else { "" },
        dialect.quote_ident(&index.name),
        dialect.qualify(schema, table),
        column_list(dialect, &index.columns)
    )
}

/// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY ...`.
pub fn add_foreign_key<D: Dialect + ?Sized>(
    dialect: &D,
    schema: &str,
    table: &str,
    fk: &ForeignKey,
) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
        dialect.qualify(schema, table),
        dialect.quote_ident(&fk.name),
        column_list(dialect, &fk.columns),
        dialect.qualify(schema, &fk.ref_table),
        column_list(dialect, &fk.ref_columns),
        fk.on_delete
    )
}

/// `ALTER TABLE ... ADD CONSTRAINT name CHECK (expr)`.
pub fn add_check<D: Dialect + ?Sized>(
    dialect: &D,
    schema: &str,
    table: &str,
    name: &str,
    definition: &str,
) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({})",
        dialect.qualify(schema, table),
        dialect.quote_ident(name),
        definition
    )
}

/// Comma-joined literal list for `IN (...)`, with an optional `N` prefix.
pub fn literal_list<'a>(values: impl IntoIterator<Item = &'a String>, prefix: &str) -> String {
    values
        .into_iter()
        .map(|v| format!("{}{}", prefix, crate::core::identifier::quote_literal(v)))
        .collect::<Vec<_>>()
        .join(", ")
}
