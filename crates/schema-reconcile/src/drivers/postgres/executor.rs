//! PostgreSQL DDL execution.
//!
//! PostgreSQL DDL is transactional, so the migrator runs the whole plan inside
//! one `BEGIN ... COMMIT` on a single pooled connection.

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tracing::debug;

use crate::core::traits::{DdlSession, PlanExecutor};
use crate::error::{MigrateError, Result};

pub struct PostgresExecutor {
    pool: Pool,
}

impl PostgresExecutor {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanExecutor for PostgresExecutor {
    fn transactional(&self) -> bool {
        true
    }

    async fn session(&self) -> Result<Box<dyn DdlSession>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(e, "getting PostgreSQL DDL connection"))?;
        Ok(Box::new(PostgresSession { client }))
    }
}

struct PostgresSession {
    client: Object,
}

#[async_trait]
impl DdlSession for PostgresSession {
    async fn begin(&mut self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!("{}", sql);
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }
}
