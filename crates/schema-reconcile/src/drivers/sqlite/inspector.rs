//! SQLite catalog inspection over `sqlite_master` and the table pragmas.
//!
//! SQLite reports no check constraints, so they are recovered from the stored
//! `CREATE TABLE` text. It also keeps no foreign key names; those are
//! rebuilt from the referencing column.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::debug;

use super::dialect::SEQUENCE_TABLE;
use crate::core::identifier::{check_name, foreign_key_name, quote_pg};
use crate::core::schema::{normalize_referential_action, CheckConstraint, Column, ForeignKey, Index, Table};
use crate::core::traits::SchemaInspector;
use crate::error::{MigrateError, Result};

const TABLES_QUERY: &str = r#"
    SELECT m.name AS table_name, m.sql AS create_sql
    FROM {schema}.sqlite_master m
    WHERE m.type = 'table'
    ORDER BY m.name
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT m.name AS table_name,
           p.name AS column_name,
           p.type AS declared_type,
           p."notnull" AS not_null,
           p.dflt_value AS column_default,
           p.pk AS pk
    FROM {schema}.sqlite_master m
    JOIN pragma_table_info(m.name, ?1) p
    WHERE m.type = 'table'
    ORDER BY m.name, p.cid
"#;

/// Only explicitly created indexes; UNIQUE and PRIMARY KEY clauses are skipped.
const INDEXES_QUERY: &str = r#"
    SELECT m.name AS table_name,
           il.name AS index_name,
           il."unique" AS is_unique,
           ii.name AS column_name
    FROM {schema}.sqlite_master m
    JOIN pragma_index_list(m.name, ?1) il
    JOIN pragma_index_info(il.name, ?1) ii
    WHERE m.type = 'table' AND il.origin = 'c'
    ORDER BY m.name, il.name, ii.seqno
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT m.name AS table_name,
           fk.id AS fk_id,
           fk."table" AS ref_table,
           fk."from" AS column_name,
           fk."to" AS ref_column,
           fk.on_delete AS on_delete
    FROM {schema}.sqlite_master m
    JOIN pragma_foreign_key_list(m.name, ?1) fk
    WHERE m.type = 'table'
    ORDER BY m.name, fk.id, fk.seq
"#;

const SEQUENCE_EXISTS_QUERY: &str = r#"
    SELECT COUNT(*) FROM {schema}.sqlite_master
    WHERE type = 'table' AND name = ?1
"#;

/// `AUTOINCREMENT` tables and the next id each will hand out.
const IDENTITY_QUERY: &str = r#"
    SELECT m.name AS table_name, COALESCE(s.seq, 0) + 1 AS next_id
    FROM {schema}.sqlite_master m
    LEFT JOIN {schema}.sqlite_sequence s ON s.name = m.name
    WHERE m.type = 'table' AND m.sql LIKE '%AUTOINCREMENT%'
"#;

/// Reads live tables from the SQLite catalog.
pub struct SqliteInspector {
    pool: SqlitePool,
    schema: String,
}

impl SqliteInspector {
    pub fn new(pool: SqlitePool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    fn sql(&self, template: &str) -> String {
        template.replace("{schema}", &quote_pg(&self.schema))
    }

    /// Run a catalog query bound to the inspected schema.
    async fn fetch(&self, template: &str) -> Result<Vec<SqliteRow>> {
        let sql = self.sql(template);
        Ok(sqlx::query(&sql)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await?)
    }
}

/// One `pragma_table_info` row before interpretation.
#[derive(Debug, Clone, Default)]
struct PragmaColumn {
    name: String,
    declared_type: String,
    not_null: bool,
    default: Option<String>,
    pk: i64,
}

impl PragmaColumn {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            name: row.try_get("column_name")?,
            declared_type: row.try_get::<Option<String>, _>("declared_type")?.unwrap_or_default(),
            not_null: row.try_get::<i64, _>("not_null")? != 0,
            default: row.try_get("column_default")?,
            pk: row.try_get("pk")?,
        })
    }

    fn decode(self) -> Column {
        let (data_type, max_length) = declared_type(&self.declared_type);
        // only an `integer` primary key aliases the rowid
        let is_identity = self.pk > 0 && data_type == "integer";
        Column {
            name: self.name,
            is_nullable: !self.not_null && self.pk == 0,
            default: self.default,
            is_identity,
            data_type,
            max_length,
            ..Default::default()
        }
    }
}

/// Split a declared type such as `VARCHAR(10)` into `("varchar", 10)`.
fn declared_type(raw: &str) -> (String, i64) {
    let lower = raw.trim().to_lowercase();
    match lower.split_once('(') {
        Some((base, args)) => {
            let length = args
                .trim_end_matches(')')
                .split(',')
                .next()
                .and_then(|n| n.trim().parse().ok())
                .unwrap_or(0);
            (base.trim().to_string(), length)
        }
        None => (lower, 0),
    }
}

/// Characters of `sql` outside quoted identifiers and literals.
fn unquoted(sql: &str) -> impl Iterator<Item = (usize, char)> + '_ {
    let mut closing: Option<char> = None;
    sql.char_indices().filter(move |&(_, c)| {
        if let Some(close) = closing {
            if c == close {
                closing = None;
            }
            return false;
        }
        match c {
            '\'' | '"' | '`' => {
                closing = Some(c);
                false
            }
            '[' => {
                closing = Some(']');
                false
            }
            _ => true,
        }
    })
}

/// Top-level comma-separated elements of a `CREATE TABLE` body.
fn table_elements(sql: &str) -> Vec<&str> {
    let mut elements = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    for (i, c) in unquoted(sql) {
        match c {
            '(' => {
                depth += 1;
                if depth == 1 {
                    start = Some(i + 1);
                }
            }
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(s) = start.take() {
                        elements.push(sql[s..i].trim());
                    }
                    break;
                }
            }
            ',' if depth == 1 => {
                if let Some(s) = start {
                    elements.push(sql[s..i].trim());
                }
                start = Some(i + 1);
            }
            _ => {}
        }
    }
    elements
}

/// Leading identifier of a column definition, unquoted, and the rest of it.
fn leading_identifier(element: &str) -> (String, &str) {
    let close = match element.chars().next() {
        Some('"') => Some('"'),
        Some('`') => Some('`'),
        Some('[') => Some(']'),
        _ => None,
    };
    let Some(close) = close else {
        let end = element.find(char::is_whitespace).unwrap_or(element.len());
        return (element[..end].to_string(), &element[end..]);
    };

    let mut name = String::new();
    let mut chars = element.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        if c == close {
            if close != ']' && chars.peek().map(|&(_, n)| n) == Some(close) {
                chars.next();
                name.push(c);
                continue;
            }
            return (name, &element[i + c.len_utf8()..]);
        }
        name.push(c);
    }
    (name, "")
}

/// Expression of the first `CHECK (...)` clause in a column definition.
fn check_expression(rest: &str) -> Option<&str> {
    let upper = rest.to_ascii_uppercase();
    let keyword = unquoted(rest).map(|(i, _)| i).find(|&i| {
        let boundary = rest[..i].chars().next_back().map_or(true, char::is_whitespace);
        boundary
            && upper[i..].starts_with("CHECK")
            && upper[i + 5..].trim_start().starts_with('(')
    })?;

    let after = &rest[keyword + 5..];
    let open = keyword + 5 + after.find('(')?;
    let mut depth = 0usize;
    for (i, c) in unquoted(&rest[open..]) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(rest[open + 1..open + i].trim());
                }
            }
            _ => {}
        }
    }
    None
}

/// Column checks declared in a stored `CREATE TABLE` statement.
///
/// Each check is named after the column carrying it, whatever name it was
/// created under: renaming a column rewrites the expression but keeps the
/// original constraint name.
fn column_checks(table: &str, create_sql: &str) -> Vec<CheckConstraint> {
    const TABLE_CLAUSES: [&str; 5] = ["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"];

    table_elements(create_sql)
        .into_iter()
        .filter(|element| {
            let first = element
                .split(|c: char| c.is_whitespace() || c == '(')
                .next()
                .unwrap_or_default();
            !TABLE_CLAUSES.contains(&first.to_ascii_uppercase().as_str())
        })
        .filter_map(|element| {
            let (column, rest) = leading_identifier(element);
            check_expression(rest).map(|definition| CheckConstraint {
                name: check_name(table, &column),
                definition: definition.to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl SchemaInspector for SqliteInspector {
    fn namespace(&self) -> &str {
        &self.schema
    }

    async fn inspect(&self, tables: &[String]) -> Result<Vec<Table>> {
        let mut found: BTreeMap<String, Table> = BTreeMap::new();

        for row in self.fetch(COLUMNS_QUERY).await? {
            let table_name: String = row.try_get("table_name")?;
            if !tables.contains(&table_name) {
                continue;
            }
            found
                .entry(table_name.clone())
                .or_insert_with(|| Table::new(table_name))
                .columns
                .push(PragmaColumn::from_row(&row)?.decode());
        }

        for row in self.fetch(INDEXES_QUERY).await? {
            let Some(table) = found.get_mut(&row.try_get::<String, _>("table_name")?) else {
                continue;
            };
            let name: String = row.try_get("index_name")?;
            let column: String = row.try_get("column_name")?;
            match table.indexes.iter_mut().find(|i| i.name == name) {
                Some(index) => index.columns.push(column),
                None => table.indexes.push(Index {
                    name,
                    columns: vec![column],
                    is_unique: row.try_get::<i64, _>("is_unique")? != 0,
                }),
            }
        }

        let mut fk_ids: BTreeMap<(String, i64), usize> = BTreeMap::new();
        for row in self.fetch(FOREIGN_KEYS_QUERY).await? {
            let table_name: String = row.try_get("table_name")?;
            let Some(table) = found.get_mut(&table_name) else {
                continue;
            };
            let column: String = row.try_get("column_name")?;
            let ref_column: String = row
                .try_get::<Option<String>, _>("ref_column")?
                .unwrap_or_else(|| crate::core::ID_COLUMN.to_string());
            let id: i64 = row.try_get("fk_id")?;
            match fk_ids.get(&(table_name.clone(), id)) {
                Some(&pos) => {
                    table.foreign_keys[pos].columns.push(column);
                    table.foreign_keys[pos].ref_columns.push(ref_column);
                }
                None => {
                    fk_ids.insert((table_name.clone(), id), table.foreign_keys.len());
                    table.foreign_keys.push(ForeignKey {
                        name: foreign_key_name(&table_name, &column),
                        columns: vec![column],
                        ref_table: row.try_get("ref_table")?,
                        ref_columns: vec![ref_column],
                        on_delete: normalize_referential_action(&row.try_get::<String, _>("on_delete")?),
                    });
                }
            }
        }

        for row in self.fetch(TABLES_QUERY).await? {
            let table_name: String = row.try_get("table_name")?;
            if let Some(table) = found.get_mut(&table_name) {
                let create_sql: Option<String> = row.try_get("create_sql")?;
                table.check_constraints = column_checks(&table_name, create_sql.as_deref().unwrap_or_default());
            }
        }

        debug!(
            "Inspected {} of {} tables in schema {}",
            found.len(),
            tables.len(),
            self.schema
        );
        Ok(tables.iter().filter_map(|name| found.remove(name)).collect())
    }

    async fn identity_starts(&self) -> Result<BTreeMap<String, i64>> {
        // created along with the first AUTOINCREMENT table
        let exists: i64 = sqlx::query_scalar(&self.sql(SEQUENCE_EXISTS_QUERY))
            .bind(SEQUENCE_TABLE)
            .fetch_one(&self.pool)
            .await?;
        if exists == 0 {
            return Ok(BTreeMap::new());
        }

        let mut starts = BTreeMap::new();
        for row in sqlx::query(&self.sql(IDENTITY_QUERY)).fetch_all(&self.pool).await? {
            starts.insert(row.try_get("table_name")?, row.try_get("next_id")?);
        }
        Ok(starts)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::connection(e, "pinging SQLite"))?;
        Ok(())
    }
}
