//! SQL Server catalog inspection over `sys.*` views.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bb8::PooledConnection;
use tiberius::{Query, Row};
use tracing::debug;

use super::{MssqlPool, TiberiusConnectionManager};
use crate::core::schema::{normalize_referential_action, CheckConstraint, Column, ForeignKey, Index, Table};
use crate::core::traits::SchemaInspector;
use crate::error::{MigrateError, Result};

/// `max_length` is the catalog's byte count; see [`char_length`].
const COLUMNS_QUERY: &str = r#"
    SELECT
        t.name AS table_name,
        c.name AS column_name,
        ty.name AS data_type,
        CAST(c.max_length AS BIGINT) AS max_length,
        c.is_nullable,
        c.is_identity,
        dc.definition AS column_default,
        CAST(ic.seed_value AS BIGINT) AS seed_value
    FROM sys.columns c
    JOIN sys.tables t ON t.object_id = c.object_id
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    JOIN sys.types ty ON ty.user_type_id = c.user_type_id
    LEFT JOIN sys.default_constraints dc
        ON dc.parent_object_id = c.object_id AND dc.parent_column_id = c.column_id
    LEFT JOIN sys.identity_columns ic
        ON ic.object_id = c.object_id AND ic.column_id = c.column_id
    WHERE s.name = @P1
    ORDER BY t.name, c.column_id
"#;

const INDEXES_QUERY: &str = r#"
    SELECT
        tb.name AS table_name,
        i.name AS index_name,
        i.is_unique,
        STUFF((
            SELECT ',' + c2.name
            FROM sys.index_columns ic2
            JOIN sys.columns c2 ON ic2.object_id = c2.object_id AND ic2.column_id = c2.column_id
            WHERE ic2.object_id = i.object_id AND ic2.index_id = i.index_id AND ic2.is_included_column = 0
            ORDER BY ic2.key_ordinal
            FOR XML PATH('')
        ), 1, 1, '') AS columns
    FROM sys.indexes i
    JOIN sys.tables tb ON i.object_id = tb.object_id
    JOIN sys.schemas s ON tb.schema_id = s.schema_id
    WHERE s.name = @P1
      AND i.is_primary_key = 0
      AND i.type > 0
    ORDER BY tb.name, i.name
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        pt.name AS table_name,
        fk.name AS fk_name,
        STUFF((
            SELECT ',' + pc2.name
            FROM sys.foreign_key_columns fkc2
            JOIN sys.columns pc2 ON fkc2.parent_object_id = pc2.object_id AND fkc2.parent_column_id = pc2.column_id
            WHERE fkc2.constraint_object_id = fk.object_id
            ORDER BY fkc2.constraint_column_id
            FOR XML PATH('')
        ), 1, 1, '') AS parent_columns,
        rt.name AS ref_table,
        STUFF((
            SELECT ',' + rc2.name
            FROM sys.foreign_key_columns fkc2
            JOIN sys.columns rc2 ON fkc2.referenced_object_id = rc2.object_id AND fkc2.referenced_column_id = rc2.column_id
            WHERE fkc2.constraint_object_id = fk.object_id
            ORDER BY fkc2.constraint_column_id
            FOR XML PATH('')
        ), 1, 1, '') AS ref_columns,
        fk.delete_referential_action_desc
    FROM sys.foreign_keys fk
    JOIN sys.tables pt ON fk.parent_object_id = pt.object_id
    JOIN sys.schemas ps ON pt.schema_id = ps.schema_id
    JOIN sys.tables rt ON fk.referenced_object_id = rt.object_id
    WHERE ps.name = @P1
    ORDER BY pt.name, fk.name
"#;

const CHECKS_QUERY: &str = r#"
    SELECT tb.name AS table_name, cc.name, cc.definition
    FROM sys.check_constraints cc
    JOIN sys.tables tb ON cc.parent_object_id = tb.object_id
    JOIN sys.schemas s ON tb.schema_id = s.schema_id
    WHERE s.name = @P1 AND cc.is_disabled = 0
    ORDER BY tb.name, cc.name
"#;

const IDENTITY_QUERY: &str = r#"
    SELECT t.name AS table_name, CAST(ic.seed_value AS BIGINT) AS seed_value
    FROM sys.identity_columns ic
    JOIN sys.tables t ON t.object_id = ic.object_id
    JOIN sys.schemas s ON s.schema_id = t.schema_id
    WHERE s.name = @P1
"#;

/// Reads live tables from the SQL Server catalog.
pub struct MssqlInspector {
    pool: MssqlPool,
    schema: String,
}

impl MssqlInspector {
    pub fn new(pool: MssqlPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    async fn client(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(e, "getting SQL Server connection"))
    }

    /// Run a catalog query bound to the inspected schema.
    async fn fetch(&self, sql: &str) -> Result<Vec<Row>> {
        let mut client = self.client().await?;
        let mut query = Query::new(sql);
        query.bind(self.schema.as_str());
        let rows = query.query(&mut *client).await?.into_first_result().await?;
        Ok(rows)
    }
}

fn text(row: &Row, idx: usize) -> Result<String> {
    Ok(row.try_get::<&str, _>(idx)?.unwrap_or_default().to_string())
}

/// Declared length in characters from `sys.columns.max_length` bytes.
///
/// `nvarchar` and `nchar` store two bytes per character. -1 is MAX and stays
/// -1; types without a declared length report 0.
fn char_length(data_type: &str, bytes: i64) -> i64 {
    match data_type {
        _ if bytes == -1 => -1,
        "nvarchar" | "nchar" => bytes / 2,
        "varchar" | "char" | "varbinary" | "binary" => bytes,
        _ => 0,
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[async_trait]
impl SchemaInspector for MssqlInspector {
    fn namespace(&self) -> &str {
        &self.schema
    }

    async fn inspect(&self, tables: &[String]) -> Result<Vec<Table>> {
        let mut found: BTreeMap<String, Table> = BTreeMap::new();

        for row in self.fetch(COLUMNS_QUERY).await? {
            let table_name = text(&row, 0)?;
            if !tables.contains(&table_name) {
                continue;
            }
            let is_identity = row.try_get::<bool, _>(5)?.unwrap_or(false);
            let table = found
                .entry(table_name.clone())
                .or_insert_with(|| Table::new(table_name));
            if is_identity {
                table.identity_start = row.try_get::<i64, _>(7)?;
            }
            let data_type = text(&row, 2)?.to_lowercase();
            let bytes = row.try_get::<i64, _>(3)?.unwrap_or(0);
            table.columns.push(Column {
                name: text(&row, 1)?,
                max_length: char_length(&data_type, bytes),
                data_type,
                is_nullable: row.try_get::<bool, _>(4)?.unwrap_or(true),
                default: row.try_get::<&str, _>(6)?.map(String::from),
                is_identity,
                ..Default::default()
            });
        }

        for row in self.fetch(INDEXES_QUERY).await? {
            if let Some(table) = found.get_mut(&text(&row, 0)?) {
                table.indexes.push(Index {
                    name: text(&row, 1)?,
                    is_unique: row.try_get::<bool, _>(2)?.unwrap_or(false),
                    columns: split_list(&text(&row, 3)?),
                });
            }
        }

        for row in self.fetch(FOREIGN_KEYS_QUERY).await? {
            if let Some(table) = found.get_mut(&text(&row, 0)?) {
                table.foreign_keys.push(ForeignKey {
                    name: text(&row, 1)?,
                    columns: split_list(&text(&row, 2)?),
                    ref_table: text(&row, 3)?,
                    ref_columns: split_list(&text(&row, 4)?),
                    on_delete: normalize_referential_action(&text(&row, 5)?),
                });
            }
        }

        for row in self.fetch(CHECKS_QUERY).await? {
            if let Some(table) = found.get_mut(&text(&row, 0)?) {
                table.check_constraints.push(CheckConstraint {
                    name: text(&row, 1)?,
                    definition: text(&row, 2)?,
                });
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
        let mut starts = BTreeMap::new();
        for row in self.fetch(IDENTITY_QUERY).await? {
            if let Some(seed) = row.try_get::<i64, _>(1)? {
                starts.insert(text(&row, 0)?, seed);
            }
        }
        Ok(starts)
    }

    async fn ping(&self) -> Result<()> {
        let mut client = self.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e, "pinging SQL Server"))?
            .into_row()
            .await?;
        Ok(())
    }
}
