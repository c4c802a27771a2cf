//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: type mapping and DDL rendering
//! - [`MssqlInspector`]: `sys.*` catalog reader
//! - [`MssqlExecutor`]: transactional DDL on one pooled connection
//!
//! Connections are Tiberius clients pooled with bb8, with TCP keepalives so a
//! long-blocked `ALTER TABLE` does not lose its connection.

mod dialect;
mod executor;
mod inspector;

pub use dialect::MssqlDialect;
pub use executor::MssqlExecutor;
pub use inspector::MssqlInspector;

use std::time::Duration;

use async_trait::async_trait;
use bb8::Pool;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

/// Pooled SQL Server connections.
pub type MssqlPool = Pool<TiberiusConnectionManager>;

/// TCP keepalive interval.
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// One connection for catalog reads, one for the DDL session.
const POOL_SIZE: u32 = 2;

/// Connection manager for the bb8 pool.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: DatabaseConfig,
    ssl_mode: SslMode,
}

impl TiberiusConnectionManager {
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        Ok(Self { config, ssl_mode })
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port());
        config.database(&self.config.database);
        config.application_name("schema-reconcile");
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        match self.ssl_mode {
            SslMode::Disable => config.encryption(EncryptionLevel::NotSupported),
            SslMode::Require => {
                config.trust_cert();
                config.encryption(EncryptionLevel::Required);
            }
            SslMode::VerifyCa | SslMode::VerifyFull => {
                config.encryption(EncryptionLevel::Required)
            }
        }
        config
    }

    fn io_error(e: std::io::Error, context: &str) -> tiberius::error::Error {
        tiberius::error::Error::Io {
            kind: e.kind(),
            message: format!("{}: {}", context, e),
        }
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| Self::io_error(e, "connecting"))?;
        tcp.set_nodelay(true).ok();

        let std_tcp = tcp
            .into_std()
            .map_err(|e| Self::io_error(e, "detaching socket"))?;
        let socket = socket2::Socket::from(std_tcp);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(TCP_KEEPALIVE_INTERVAL)
            .with_interval(TCP_KEEPALIVE_INTERVAL);
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            warn!("Failed to set TCP keepalive on SQL Server connection: {}", e);
        }

        let std_tcp: std::net::TcpStream = socket.into();
        std_tcp.set_nonblocking(true).ok();
        let tcp = TcpStream::from_std(std_tcp).map_err(|e| Self::io_error(e, "converting socket"))?;

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Build a connection pool and verify it with a round trip.
pub async fn connect(config: &DatabaseConfig) -> Result<MssqlPool> {
    let manager = TiberiusConnectionManager::new(config.clone())?;
    manager.ssl_mode.log_posture("SQL Server");
    let pool = Pool::builder()
        .max_size(POOL_SIZE)
        .connection_timeout(config.connect_timeout())
        .test_on_check_out(true)
        .build(manager)
        .await
        .map_err(|e| MigrateError::connection(e, "creating SQL Server pool"))?;

    {
        let mut conn = pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(e, "connecting to SQL Server"))?;
        conn.simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e, "testing SQL Server connection"))?
            .into_row()
            .await?;
    }

    info!("Connected to SQL Server: {}", config.display_url());
    Ok(pool)
}
