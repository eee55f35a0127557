//! Farm expectation repository
//!
//! Expectations are insert-only. There is no field update; a wrong
//! expectation is retracted and a new one recorded.

use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::instrument;

use super::{counted, delete_row, lock_active_farm, stale_or_missing};
use crate::db::with_transaction;
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::models::{
    ExpectationId, ExpectationStatus, FarmExpectation, FarmId, NewFarmExpectation, Paginated,
    Pagination,
};

const RESOURCE: &str = "farm expectation";

macro_rules! columns {
    () => {
        "id, farm_id, expected_harvest_on, expected_quantity_kg::float8 AS expected_quantity_kg, \
         expected_income::float8 AS expected_income, status, created_at, updated_at, version"
    };
}

/// Record an expectation for an active farm.
pub async fn insert(conn: &mut PgConnection, new: NewFarmExpectation) -> StoreResult<FarmExpectation> {
    lock_active_farm(conn, new.farm_id).await?;

    let id = ExpectationId::generate();
    sqlx::query_as::<_, FarmExpectation>(concat!(
        r#"
        INSERT INTO farm_expectations (id, farm_id, expected_harvest_on, expected_quantity_kg,
                                       expected_income)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(new.farm_id)
    .bind(new.expected_harvest_on)
    .bind(new.expected_quantity_kg)
    .bind(new.expected_income)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))
}

pub async fn fetch<'e, E: PgExecutor<'e>>(executor: E, id: ExpectationId) -> StoreResult<FarmExpectation> {
    sqlx::query_as::<_, FarmExpectation>(concat!(
        "SELECT ",
        columns!(),
        " FROM farm_expectations WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))?
    .ok_or_else(|| StoreError::not_found(RESOURCE, id))
}

/// Mark an expectation as retracted. Its figures stay on file.
pub async fn retract(
    conn: &mut PgConnection,
    id: ExpectationId,
    expected_version: i64,
) -> StoreResult<FarmExpectation> {
    let updated = sqlx::query_as::<_, FarmExpectation>(concat!(
        r#"
        UPDATE farm_expectations SET
            status = $3,
            version = version + 1,
            updated_at = GREATEST(clock_timestamp(), updated_at)
        WHERE id = $1 AND version = $2
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(expected_version)
    .bind(ExpectationStatus::Retracted.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))?;

    match updated {
        Some(expectation) => Ok(expectation),
        None => Err(stale_or_missing(conn, "farm_expectations", RESOURCE, id.as_uuid(), expected_version).await),
    }
}

pub async fn remove(conn: &mut PgConnection, id: ExpectationId) -> StoreResult<()> {
    delete_row(conn, "farm_expectations", RESOURCE, id.as_uuid()).await
}

/// Farm expectation repository
pub struct FarmExpectationRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> FarmExpectationRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, new), fields(farm_id = %new.farm_id), err)]
    pub async fn create(&self, new: NewFarmExpectation) -> StoreResult<FarmExpectation> {
        with_transaction(self.pool, move |conn| Box::pin(insert(conn, new))).await
    }

    #[instrument(skip(self), err)]
    pub async fn get(&self, id: ExpectationId) -> StoreResult<FarmExpectation> {
        fetch(self.pool, id).await
    }

    /// The farm's current expectation: its newest active one.
    #[instrument(skip(self), err)]
    pub async fn latest_for_farm(&self, farm_id: FarmId) -> StoreResult<Option<FarmExpectation>> {
        sqlx::query_as::<_, FarmExpectation>(concat!(
            "SELECT ",
            columns!(),
            r#" FROM farm_expectations
            WHERE farm_id = $1 AND status = $2
            ORDER BY created_at DESC, id DESC
            LIMIT 1"#
        ))
        .bind(farm_id)
        .bind(ExpectationStatus::Active.as_str())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, farm_id, e))
    }

    /// Active expectations of a farm, newest first.
    #[instrument(skip(self), err)]
    pub async fn list_for_farm(
        &self,
        farm_id: FarmId,
        page: Pagination,
    ) -> StoreResult<Paginated<FarmExpectation>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            columns!(),
            r#", COUNT(*) OVER() AS total
            FROM farm_expectations
            WHERE farm_id = $1 AND status = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4"#
        ))
        .bind(farm_id)
        .bind(ExpectationStatus::Active.as_str())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, farm_id, e))?;

        Ok(Paginated::from_counted(counted(rows)?, page))
    }

    #[instrument(skip(self), err)]
    pub async fn retract(&self, id: ExpectationId, expected_version: i64) -> StoreResult<FarmExpectation> {
        with_transaction(self.pool, move |conn| Box::pin(retract(conn, id, expected_version))).await
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: ExpectationId) -> StoreResult<()> {
        with_transaction(self.pool, move |conn| Box::pin(remove(conn, id))).await
    }
}
