//! SQLite DDL execution.
//!
//! SQLite DDL is transactional; the whole plan runs in one `BEGIN ... COMMIT`
//! on the pool's only connection.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqlitePool;
use sqlx::Sqlite;
use tracing::debug;

use crate::core::traits::{DdlSession, PlanExecutor};
use crate::error::{MigrateError, Result};

pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanExecutor for SqliteExecutor {
    fn transactional(&self) -> bool {
        true
    }

    async fn session(&self) -> Result<Box<dyn DdlSession>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| MigrateError::connection(e, "getting SQLite DDL connection"))?;
        Ok(Box::new(SqliteSession { conn }))
    }
}

struct SqliteSession {
    conn: PoolConnection<Sqlite>,
}

#[async_trait]
impl DdlSession for SqliteSession {
    async fn begin(&mut self) -> Result<()> {
        self.execute("BEGIN").await
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!("{}", sql);
        sqlx::query(sql).execute(&mut *self.conn).await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK").await
    }
}
