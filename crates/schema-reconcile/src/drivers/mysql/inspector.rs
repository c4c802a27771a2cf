//! MySQL catalog inspection.
//!
//! String columns are CAST to CHAR and numbers to SIGNED so the same query
//! decodes identically on MySQL and MariaDB regardless of catalog collations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::Row;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::core::identifier::quote_literal;
use crate::core::schema::{normalize_referential_action, CheckConstraint, Column, ForeignKey, Index, Table};
use crate::core::traits::SchemaInspector;
use crate::dialect::check::quoted_literals;
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

use super::version::{Flavor, ServerVersion};

const COLUMNS_QUERY: &str = r#"
    SELECT
        CAST(TABLE_NAME AS CHAR(255)) AS table_name,
        CAST(COLUMN_NAME AS CHAR(255)) AS column_name,
        CAST(DATA_TYPE AS CHAR(64)) AS data_type,
        CAST(COLUMN_TYPE AS CHAR(8192)) AS column_type,
        CAST(COALESCE(CHARACTER_MAXIMUM_LENGTH, 0) AS SIGNED) AS max_length,
        CAST(IF(IS_NULLABLE = 'YES', 1, 0) AS SIGNED) AS is_nullable,
        CAST(COLUMN_DEFAULT AS CHAR(8192)) AS column_default,
        CAST(EXTRA AS CHAR(255)) AS extra
    FROM INFORMATION_SCHEMA.COLUMNS
    WHERE TABLE_SCHEMA = ?
    ORDER BY TABLE_NAME, ORDINAL_POSITION
"#;

const INDEXES_QUERY: &str = r#"
    SELECT
        CAST(TABLE_NAME AS CHAR(255)) AS table_name,
        CAST(INDEX_NAME AS CHAR(255)) AS index_name,
        CAST(COLUMN_NAME AS CHAR(255)) AS column_name,
        CAST(NON_UNIQUE AS SIGNED) AS non_unique
    FROM INFORMATION_SCHEMA.STATISTICS
    WHERE TABLE_SCHEMA = ? AND INDEX_NAME <> 'PRIMARY'
    ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        CAST(k.TABLE_NAME AS CHAR(255)) AS table_name,
        CAST(k.CONSTRAINT_NAME AS CHAR(255)) AS fk_name,
        CAST(k.COLUMN_NAME AS CHAR(255)) AS column_name,
        CAST(k.REFERENCED_TABLE_NAME AS CHAR(255)) AS ref_table,
        CAST(k.REFERENCED_COLUMN_NAME AS CHAR(255)) AS ref_column,
        CAST(r.DELETE_RULE AS CHAR(64)) AS delete_rule
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE k
    JOIN INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS r
        ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
        AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME
        AND r.TABLE_NAME = k.TABLE_NAME
    WHERE k.TABLE_SCHEMA = ? AND k.REFERENCED_TABLE_NAME IS NOT NULL
    ORDER BY k.TABLE_NAME, k.CONSTRAINT_NAME, k.ORDINAL_POSITION
"#;

const CHECKS_QUERY: &str = r#"
    SELECT
        CAST(t.TABLE_NAME AS CHAR(255)) AS table_name,
        CAST(c.CONSTRAINT_NAME AS CHAR(255)) AS check_name,
        CAST(c.CHECK_CLAUSE AS CHAR(8192)) AS check_clause
    FROM INFORMATION_SCHEMA.CHECK_CONSTRAINTS c
    JOIN INFORMATION_SCHEMA.TABLE_CONSTRAINTS t
        ON t.CONSTRAINT_SCHEMA = c.CONSTRAINT_SCHEMA
        AND t.CONSTRAINT_NAME = c.CONSTRAINT_NAME
    WHERE c.CONSTRAINT_SCHEMA = ? AND t.CONSTRAINT_TYPE = 'CHECK'
    ORDER BY t.TABLE_NAME, c.CONSTRAINT_NAME
"#;

const AUTO_INCREMENT_QUERY: &str = r#"
    SELECT
        CAST(TABLE_NAME AS CHAR(255)) AS table_name,
        CAST(AUTO_INCREMENT AS SIGNED) AS auto_increment
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = ? AND AUTO_INCREMENT IS NOT NULL
"#;

/// Types whose catalog length is meaningful to the type mapper.
const SIZED_TYPES: [&str; 4] = ["varchar", "char", "varbinary", "binary"];

/// Types whose literal defaults the catalog reports unquoted.
const STRING_TYPES: [&str; 7] = [
    "varchar", "char", "enum", "tinytext", "text", "mediumtext", "longtext",
];

/// Reads live tables from `INFORMATION_SCHEMA`.
pub struct MysqlInspector {
    pool: MySqlPool,
    database: String,
    version: ServerVersion,
}

impl MysqlInspector {
    /// Connect a small SQLx pool for catalog reads.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let ssl_mode = match SslMode::parse(&config.ssl_mode)? {
            SslMode::Disable => MySqlSslMode::Disabled,
            SslMode::Require => MySqlSslMode::Required,
            SslMode::VerifyCa => MySqlSslMode::VerifyCa,
            SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
        };

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port())
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode);

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(config.connect_timeout())
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::connection(e, "creating MySQL catalog pool"))?;

        let raw: String = sqlx::query_scalar("SELECT CAST(VERSION() AS CHAR(255))")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::connection(e, "reading MySQL server version"))?;
        let version = ServerVersion::parse(&raw)?;
        version.check_supported()?;

        info!("Connected to {} catalog: {}", version, config.display_url());
        Ok(Self::new(pool, config.schema(), version))
    }

    pub fn new(pool: MySqlPool, database: impl Into<String>, version: ServerVersion) -> Self {
        Self {
            pool,
            database: database.into(),
            version,
        }
    }

    pub fn version(&self) -> ServerVersion {
        self.version
    }

    async fn fetch(&self, query: &str) -> Result<Vec<MySqlRow>> {
        Ok(sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await?)
    }
}

/// One `INFORMATION_SCHEMA.COLUMNS` row before interpretation.
#[derive(Debug, Clone, Default)]
struct CatalogColumn {
    name: String,
    data_type: String,
    column_type: String,
    max_length: i64,
    is_nullable: bool,
    default: Option<String>,
    extra: String,
}

impl CatalogColumn {
    fn from_row(row: &MySqlRow) -> Result<Self> {
        Ok(Self {
            name: row.try_get("column_name")?,
            data_type: row.try_get("data_type")?,
            column_type: row.try_get("column_type")?,
            max_length: row.try_get("max_length")?,
            is_nullable: row.try_get::<i64, _>("is_nullable")? == 1,
            default: row.try_get("column_default")?,
            extra: row.try_get::<Option<String>, _>("extra")?.unwrap_or_default(),
        })
    }

    fn decode(self, flavor: Flavor) -> Column {
        let data_type = self.data_type.to_lowercase();
        let column_type = self.column_type.to_lowercase();

        let max_length = if SIZED_TYPES.contains(&data_type.as_str()) {
            self.max_length
        } else if data_type == "tinyint" && column_type.starts_with("tinyint(1)") {
            1
        } else {
            0
        };

        let enum_values = if data_type == "enum" {
            quoted_literals(&self.column_type)
        } else {
            Vec::new()
        };

        let default = self
            .default
            .and_then(|raw| catalog_default(flavor, &data_type, &self.extra, raw));

        Column {
            name: self.name,
            is_unsigned: column_type.contains("unsigned"),
            is_nullable: self.is_nullable,
            is_identity: self.extra.to_lowercase().contains("auto_increment"),
            data_type,
            max_length,
            enum_values,
            default,
        }
    }
}

/// Normalize a catalog default to the quoted form the dialect renders.
///
/// MySQL reports string literals bare; MariaDB quotes them and reports an
/// absent default on a nullable column as the bare word `NULL`.
fn catalog_default(flavor: Flavor, data_type: &str, extra: &str, raw: String) -> Option<String> {
    if flavor == Flavor::MariaDb && raw == "NULL" {
        return None;
    }
    let bare_literal = STRING_TYPES.contains(&data_type)
        && !extra.contains("DEFAULT_GENERATED")
        && !raw.starts_with('\'');
    Some(if bare_literal { quote_literal(&raw) } else { raw })
}

#[async_trait]
impl SchemaInspector for MysqlInspector {
    fn namespace(&self) -> &str {
        &self.database
    }

    async fn inspect(&self, tables: &[String]) -> Result<Vec<Table>> {
        let mut found: BTreeMap<String, Table> = BTreeMap::new();

        for row in self.fetch(COLUMNS_QUERY).await? {
            let table_name: String = row.try_get("table_name")?;
            if !tables.contains(&table_name) {
                continue;
            }
            let column = CatalogColumn::from_row(&row)?.decode(self.version.flavor);
            found
                .entry(table_name.clone())
                .or_insert_with(|| Table::new(table_name))
                .columns
                .push(column);
        }

        for row in self.fetch(FOREIGN_KEYS_QUERY).await? {
            let table_name: String = row.try_get("table_name")?;
            let Some(table) = found.get_mut(&table_name) else {
                continue;
            };
            let name: String = row.try_get("fk_name")?;
            let column: String = row.try_get("column_name")?;
            let ref_column: String = row.try_get("ref_column")?;
            match table.foreign_keys.iter_mut().find(|fk| fk.name == name) {
                Some(fk) => {
                    fk.columns.push(column);
                    fk.ref_columns.push(ref_column);
                }
                None => {
                    let rule: String = row.try_get("delete_rule")?;
                    table.foreign_keys.push(ForeignKey {
                        name,
                        columns: vec![column],
                        ref_table: row.try_get("ref_table")?,
                        ref_columns: vec![ref_column],
                        on_delete: normalize_referential_action(&rule),
                    });
                }
            }
        }

        for row in self.fetch(INDEXES_QUERY).await? {
            let table_name: String = row.try_get("table_name")?;
            let Some(table) = found.get_mut(&table_name) else {
                continue;
            };
            let name: String = row.try_get("index_name")?;
            // MySQL backs every foreign key with an index of the same name
            if table.foreign_keys.iter().any(|fk| fk.name == name) {
                continue;
            }
            let Some(column) = row.try_get::<Option<String>, _>("column_name")? else {
                continue;
            };
            match table.indexes.iter_mut().find(|i| i.name == name) {
                Some(index) => index.columns.push(column),
                None => table.indexes.push(Index {
                    name,
                    columns: vec![column],
                    is_unique: row.try_get::<i64, _>("non_unique")? == 0,
                }),
            }
        }

        for row in self.fetch(CHECKS_QUERY).await? {
            let table_name: String = row.try_get("table_name")?;
            if let Some(table) = found.get_mut(&table_name) {
                table.check_constraints.push(CheckConstraint {
                    name: row.try_get("check_name")?,
                    definition: row.try_get("check_clause")?,
                });
            }
        }

        for (table_name, start) in self.identity_starts().await? {
            if let Some(table) = found.get_mut(&table_name) {
                table.identity_start = Some(start);
            }
        }

        debug!(
            "Inspected {} of {} tables in database {}",
            found.len(),
            tables.len(),
            self.database
        );
        Ok(tables.iter().filter_map(|name| found.remove(name)).collect())
    }

    /// `AUTO_INCREMENT` is the next value to hand out, which stays inside the
    /// table's id block.
    async fn identity_starts(&self) -> Result<BTreeMap<String, i64>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| MigrateError::connection(e, "getting MySQL catalog connection"))?;

        // MySQL 8 caches TABLES statistics; MariaDB has no such variable.
        if let Err(e) = sqlx::query("SET SESSION information_schema_stats_expiry = 0")
            .execute(&mut *conn)
            .await
        {
            debug!("information_schema_stats_expiry not set: {}", e);
        }

        let rows = sqlx::query(AUTO_INCREMENT_QUERY)
            .bind(&self.database)
            .fetch_all(&mut *conn)
            .await?;

        let mut starts = BTreeMap::new();
        for row in rows {
            starts.insert(
                row.try_get::<String, _>("table_name")?,
                row.try_get::<i64, _>("auto_increment")?,
            );
        }
        Ok(starts)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::connection(e, "pinging MySQL"))?;
        Ok(())
    }
}
