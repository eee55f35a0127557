//! Transaction scope and conflict retry
//!
//! [`with_transaction`] owns one pooled connection for the duration of a
//! logical operation. The body gets `&mut PgConnection` and cannot hold on
//! to it past the scope.
//!
//! ```ignore
//! let farm = with_transaction(&pool, move |conn| {
//!     Box::pin(async move {
//!         let user = users::insert(&mut *conn, new_user).await?;
//!         farms::insert(&mut *conn, NewFarm::new(user.id, "MSK", "durian", 2.5, "Raub")?).await
//!     })
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::StoreResult;

/// Run `body` inside one transaction.
///
/// Commits when `body` returns `Ok`, rolls back when it returns `Err` and
/// hands back that original error. If the returned future is dropped before
/// completion the transaction guard rolls back and releases the connection.
///
/// The closure is higher-ranked over the connection lifetime, so it may
/// only capture owned data (use `move`).
pub async fn with_transaction<T, F>(pool: &PgPool, body: F) -> StoreResult<T>
where
    F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, StoreResult<T>>,
{
    let mut tx = pool.begin().await?;

    match body(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, original = %err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}

/// Capped exponential backoff for retryable store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// Re-run `op` while it fails with a retryable error.
///
/// `op` receives the 1-based attempt number and must redo its reads, since
/// a stale-version conflict only clears once the caller has the current
/// version. The last error is returned unchanged.
pub async fn retry_on_conflict<T, F, Fut>(policy: RetryPolicy, mut op: F) -> StoreResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
