//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: type mapping and DDL rendering
//! - [`PostgresInspector`]: catalog reader over `information_schema` and `pg_catalog`
//! - [`PostgresExecutor`]: transactional DDL on one pooled connection

mod dialect;
mod executor;
mod inspector;

pub use dialect::PostgresDialect;
pub use executor::PostgresExecutor;
pub use inspector::PostgresInspector;

use std::time::Duration;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::Config as PgConfig;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::drivers::common::{SslMode, TlsBuilder};
use crate::error::{MigrateError, Result};

/// One connection for catalog reads, one for the DDL session.
const POOL_SIZE: usize = 2;

/// Build a connection pool and verify it with a round trip.
pub async fn connect(config: &DatabaseConfig) -> Result<Pool> {
    let mut pg_config = PgConfig::new();
    pg_config.host(&config.host);
    pg_config.port(config.port());
    pg_config.dbname(&config.database);
    pg_config.user(&config.user);
    pg_config.password(&config.password);
    pg_config.application_name("schema-reconcile");
    pg_config.keepalives(true);
    pg_config.keepalives_idle(Duration::from_secs(30));
    pg_config.connect_timeout(config.connect_timeout());

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let ssl_mode = SslMode::parse(&config.ssl_mode)?;
    ssl_mode.log_posture("PostgreSQL");
    let mgr = match TlsBuilder::new(ssl_mode).build()? {
        Some(connector) => Manager::from_config(pg_config, connector, mgr_config),
        None => Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config),
    };
    let pool = Pool::builder(mgr)
        .max_size(POOL_SIZE)
        .build()
        .map_err(|e| MigrateError::connection(e, "creating PostgreSQL pool"))?;

    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::connection(e, "connecting to PostgreSQL"))?;
    client
        .simple_query("SELECT 1")
        .await
        .map_err(|e| MigrateError::connection(e, "testing PostgreSQL connection"))?;

    info!("Connected to PostgreSQL: {}", config.display_url());
    Ok(pool)
}
