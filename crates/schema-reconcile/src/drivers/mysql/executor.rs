//! MySQL DDL execution on `mysql_async`.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, SslOpts};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::core::traits::{DdlSession, PlanExecutor};
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

pub struct MysqlExecutor {
    pool: Pool,
}

impl MysqlExecutor {
    /// Create a single-connection pool and verify it.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        ssl_mode.log_posture("MySQL");
        let ssl_opts = match ssl_mode {
            SslMode::Disable => None,
            SslMode::Require => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
            SslMode::VerifyCa => Some(SslOpts::default().with_danger_skip_domain_validation(true)),
            SslMode::VerifyFull => Some(SslOpts::default()),
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port())
            .db_name(Some(config.database.clone()))
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .init(vec!["SET NAMES utf8mb4"]);
        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let constraints = PoolConstraints::new(0, 1)
            .ok_or_else(|| MigrateError::Config("invalid MySQL pool constraints".into()))?;
        let opts: Opts = builder
            .pool_opts(PoolOpts::new().with_constraints(constraints))
            .into();
        let pool = Pool::new(opts);

        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::connection(e, "connecting to MySQL"))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e, "testing MySQL connection"))?;
        drop(conn);

        info!("Connected to MySQL: {}", config.display_url());
        Ok(Self { pool })
    }
}

#[async_trait]
impl PlanExecutor for MysqlExecutor {
    fn transactional(&self) -> bool {
        false
    }

    async fn session(&self) -> Result<Box<dyn DdlSession>> {
        let conn = self
            .pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::connection(e, "getting MySQL DDL connection"))?;
        Ok(Box::new(MysqlSession { conn }))
    }
}

/// DDL commits implicitly, so the transaction hooks do nothing.
struct MysqlSession {
    conn: Conn,
}

#[async_trait]
impl DdlSession for MysqlSession {
    async fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!("{}", sql);
        self.conn.query_drop(sql).await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        warn!("MySQL DDL cannot be rolled back; applied operations remain");
        Ok(())
    }
}
