//! Database connection pool management
//!
//! Uses sqlx PgPool with explicit connection limits and session timeouts,
//! so neither acquiring a connection nor waiting on a lock is unbounded.

use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

fn connect_options(config: &StoreConfig) -> StoreResult<PgConnectOptions> {
    let lock_timeout = format!("{}ms", config.lock_timeout_ms);
    let statement_timeout = format!("{}ms", config.statement_timeout_ms);

    PgConnectOptions::from_str(&config.database_url)
        .map(|opts| {
            opts.options([
                ("lock_timeout", lock_timeout.as_str()),
                ("statement_timeout", statement_timeout.as_str()),
            ])
        })
        .map_err(|e| StoreError::Config(format!("invalid database URL: {}", e)))
}

fn pool_options(config: &StoreConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
}

/// Create a PostgreSQL connection pool and open its first connection.
///
/// # Errors
///
/// `Config` for an unparseable URL, `ResourceUnavailable` when the server
/// cannot be reached within the acquire timeout.
///
/// # Example
///
/// ```ignore
/// let pool = create_pool(&StoreConfig::new("postgres://localhost/akaris")).await?;
/// ```
pub async fn create_pool(config: &StoreConfig) -> StoreResult<PgPool> {
    config.validate()?;
    let options = connect_options(config)?;

    info!(
        url = %config.redacted_url(),
        max_connections = config.max_connections,
        "Connecting to database"
    );

    pool_options(config)
        .connect_with(options)
        .await
        .map_err(|e| match e {
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
                StoreError::ResourceUnavailable(format!(
                    "cannot reach database at {}: {}",
                    config.redacted_url(),
                    e
                ))
            }
            other => StoreError::from(other),
        })
}

/// Build a pool without connecting; connections open on first use.
pub fn create_pool_lazy(config: &StoreConfig) -> StoreResult<PgPool> {
    config.validate()?;
    Ok(pool_options(config).connect_lazy_with(connect_options(config)?))
}
