//! Store handle shared across request handlers

use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::{PgConnection, PgPool};
use tracing::info;

use crate::config::StoreConfig;
use crate::db::{
    create_pool, with_transaction, CropActivityRepo, CropDailyRepo, CropRepo, ExpenseRepo,
    FarmExpectationRepo, FarmRepo, HarvestRepo, PlantMethodRepo, RetryPolicy, UserRepo,
};
use crate::error::StoreResult;
use crate::schema::{self, SchemaPlan};

/// Cheap-to-clone handle owning the connection pool.
///
/// Built once at startup and passed to whatever serves requests.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    pool: PgPool,
    config: StoreConfig,
}

impl Store {
    pub fn new(pool: PgPool, config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner { pool, config }),
        }
    }

    /// Open the pool and, when configured, bring the schema up to date.
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        let pool = create_pool(&config).await?;
        let store = Self::new(pool, config);
        if store.inner.config.ensure_schema_on_connect {
            store.ensure_schema().await?;
        }
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.inner.config.retry)
    }

    pub fn users(&self) -> UserRepo<'_> {
        UserRepo::new(self.pool())
    }

    pub fn farms(&self) -> FarmRepo<'_> {
        FarmRepo::new(self.pool())
    }

    pub fn plant_methods(&self) -> PlantMethodRepo<'_> {
        PlantMethodRepo::new(self.pool())
    }

    pub fn crops(&self) -> CropRepo<'_> {
        CropRepo::new(self.pool())
    }

    pub fn harvests(&self) -> HarvestRepo<'_> {
        HarvestRepo::new(self.pool())
    }

    pub fn expenses(&self) -> ExpenseRepo<'_> {
        ExpenseRepo::new(self.pool())
    }

    pub fn expectations(&self) -> FarmExpectationRepo<'_> {
        FarmExpectationRepo::new(self.pool())
    }

    pub fn daily_records(&self) -> CropDailyRepo<'_> {
        CropDailyRepo::new(self.pool())
    }

    pub fn activities(&self) -> CropActivityRepo<'_> {
        CropActivityRepo::new(self.pool())
    }

    /// See [`with_transaction`].
    pub async fn transaction<T, F>(&self, body: F) -> StoreResult<T>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, StoreResult<T>>,
    {
        with_transaction(self.pool(), body).await
    }

    pub async fn ensure_schema(&self) -> StoreResult<SchemaPlan> {
        schema::ensure_schema(self.pool()).await
    }

    pub async fn verify_schema(&self) -> StoreResult<SchemaPlan> {
        schema::verify_schema(self.pool()).await
    }

    /// Wait for checked-out connections to return, then close the pool.
    pub async fn close(&self) {
        info!("Closing database pool");
        self.inner.pool.close().await;
    }
}
