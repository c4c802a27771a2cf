//! SQL Server DDL execution.

use async_trait::async_trait;
use bb8::PooledConnection;
use tracing::debug;

use super::{MssqlPool, TiberiusConnectionManager};
use crate::core::traits::{DdlSession, PlanExecutor};
use crate::error::{MigrateError, Result};

pub struct MssqlExecutor {
    pool: MssqlPool,
}

impl MssqlExecutor {
    pub fn new(pool: MssqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanExecutor for MssqlExecutor {
    fn transactional(&self) -> bool {
        true
    }

    async fn session(&self) -> Result<Box<dyn DdlSession>> {
        let client = self
            .pool
            .get_owned()
            .await
            .map_err(|e| MigrateError::connection(e, "getting SQL Server DDL connection"))?;
        Ok(Box::new(MssqlSession { client }))
    }
}

struct MssqlSession {
    client: PooledConnection<'static, TiberiusConnectionManager>,
}

impl MssqlSession {
    async fn run(&mut self, sql: &str) -> Result<()> {
        debug!("{}", sql);
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }
}

#[async_trait]
impl DdlSession for MssqlSession {
    async fn begin(&mut self) -> Result<()> {
        self.run("BEGIN TRANSACTION").await
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.run(sql).await
    }

    async fn commit(&mut self) -> Result<()> {
        self.run("COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.run("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }
}
