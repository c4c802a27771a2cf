//! PostgreSQL catalog inspection.

use std::collections::BTreeMap;

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::core::schema::{normalize_referential_action, CheckConstraint, Column, ForeignKey, Index, Table};
use crate::core::traits::SchemaInspector;
use crate::error::{MigrateError, Result};

const COLUMNS_QUERY: &str = r#"
    SELECT c.table_name::text,
           c.column_name::text,
           c.udt_name::text,
           COALESCE(c.character_maximum_length, 0)::int8 AS max_length,
           (c.is_nullable = 'YES') AS is_nullable,
           c.column_default::text,
           (c.is_identity = 'YES') AS is_identity,
           c.identity_start::text
    FROM information_schema.columns c
    WHERE c.table_schema = $1 AND c.table_name = ANY($2)
    ORDER BY c.table_name, c.ordinal_position
"#;

const CHECKS_QUERY: &str = r#"
    SELECT rel.relname::text, con.conname::text, pg_get_constraintdef(con.oid)
    FROM pg_constraint con
    JOIN pg_class rel ON rel.oid = con.conrelid
    JOIN pg_namespace ns ON ns.oid = rel.relnamespace
    WHERE ns.nspname = $1 AND rel.relname = ANY($2) AND con.contype = 'c'
    ORDER BY rel.relname, con.conname
"#;

const INDEXES_QUERY: &str = r#"
    SELECT t.relname::text,
           i.relname::text,
           ix.indisunique,
           array_agg(a.attname::text ORDER BY k.ord) AS columns
    FROM pg_index ix
    JOIN pg_class t ON t.oid = ix.indrelid
    JOIN pg_class i ON i.oid = ix.indexrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    CROSS JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
    WHERE n.nspname = $1 AND t.relname = ANY($2) AND NOT ix.indisprimary
    GROUP BY t.relname, i.relname, ix.indisunique
    ORDER BY t.relname, i.relname
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT t.relname::text,
           con.conname::text,
           ARRAY(SELECT a.attname::text
                 FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                 JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
                 ORDER BY k.ord) AS columns,
           r.relname::text AS ref_table,
           ARRAY(SELECT a.attname::text
                 FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
                 JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
                 ORDER BY k.ord) AS ref_columns,
           con.confdeltype::text
    FROM pg_constraint con
    JOIN pg_class t ON t.oid = con.conrelid
    JOIN pg_class r ON r.oid = con.confrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    WHERE n.nspname = $1 AND t.relname = ANY($2) AND con.contype = 'f'
    ORDER BY t.relname, con.conname
"#;

const IDENTITY_QUERY: &str = r#"
    SELECT table_name::text, identity_start::text
    FROM information_schema.columns
    WHERE table_schema = $1 AND is_identity = 'YES'
"#;

/// Reads live tables from the PostgreSQL catalog.
pub struct PostgresInspector {
    pool: Pool,
    schema: String,
}

impl PostgresInspector {
    pub fn new(pool: Pool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(e, "getting PostgreSQL connection"))
    }

    async fn load_columns(
        &self,
        client: &Object,
        names: &[&str],
    ) -> Result<BTreeMap<String, Table>> {
        let rows = client.query(COLUMNS_QUERY, &[&self.schema, &names]).await?;
        let mut tables: BTreeMap<String, Table> = BTreeMap::new();
        for row in rows {
            let table_name: String = row.get(0);
            let table = tables
                .entry(table_name.clone())
                .or_insert_with(|| Table::new(table_name));
            let is_identity: bool = row.get(6);
            if is_identity {
                table.identity_start = parse_identity_start(row.get(7));
            }
            table.columns.push(Column {
                name: row.get(1),
                data_type: row.get(2),
                max_length: row.get(3),
                is_nullable: row.get(4),
                default: row.get(5),
                is_identity,
                ..Default::default()
            });
        }
        Ok(tables)
    }
}

/// `information_schema` reports identity options as text.
fn parse_identity_start(raw: Option<String>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse().ok())
}

#[async_trait]
impl SchemaInspector for PostgresInspector {
    fn namespace(&self) -> &str {
        &self.schema
    }

    async fn inspect(&self, tables: &[String]) -> Result<Vec<Table>> {
        let client = self.client().await?;
        let names: Vec<&str> = tables.iter().map(String::as_str).collect();
        let mut found = self.load_columns(&client, &names).await?;

        // tokio-postgres pipelines concurrent queries on one connection
        let params: [&(dyn ToSql + Sync); 2] = [&self.schema, &names];
        let (checks, indexes, foreign_keys) = futures::try_join!(
            client.query(CHECKS_QUERY, &params),
            client.query(INDEXES_QUERY, &params),
            client.query(FOREIGN_KEYS_QUERY, &params),
        )?;

        for row in checks {
            let table: String = row.get(0);
            if let Some(t) = found.get_mut(&table) {
                t.check_constraints.push(CheckConstraint {
                    name: row.get(1),
                    definition: row.get(2),
                });
            }
        }

        for row in indexes {
            let table: String = row.get(0);
            if let Some(t) = found.get_mut(&table) {
                t.indexes.push(Index {
                    name: row.get(1),
                    is_unique: row.get(2),
                    columns: row.get(3),
                });
            }
        }

        for row in foreign_keys {
            let table: String = row.get(0);
            if let Some(t) = found.get_mut(&table) {
                let action: String = row.get(5);
                t.foreign_keys.push(ForeignKey {
                    name: row.get(1),
                    columns: row.get(2),
                    ref_table: row.get(3),
                    ref_columns: row.get(4),
                    on_delete: normalize_referential_action(&action),
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
        let client = self.client().await?;
        let rows = client.query(IDENTITY_QUERY, &[&self.schema]).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let table: String = row.get(0);
                parse_identity_start(row.get(1)).map(|s| (table, s))
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e, "pinging PostgreSQL"))?;
        Ok(())
    }
}
