//! Harvest repository
//!
//! Recording a harvest also moves the crop's `last_harvest_on` forward in
//! the same transaction.

use chrono::NaiveDate;
use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::instrument;

use super::{counted, delete_row, reject_empty_patch, stale_or_missing};
use crate::db::with_transaction;
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::models::{
    CropId, CropStatus, FarmId, Harvest, HarvestId, HarvestPatch, NewHarvest, Paginated,
    Pagination, ValidationError,
};

const RESOURCE: &str = "harvest";

macro_rules! columns {
    () => {
        "id, crop_id, farm_id, quantity::float8 AS quantity, unit, \
         estimated_kg::float8 AS estimated_kg, quality, earnings::float8 AS earnings, \
         harvested_on, created_at, updated_at, version"
    };
}

#[derive(sqlx::FromRow)]
struct CropState {
    farm_id: FarmId,
    status: String,
    planted_on: NaiveDate,
}

pub async fn insert(conn: &mut PgConnection, new: NewHarvest) -> StoreResult<Harvest> {
    let crop: CropState =
        sqlx::query_as("SELECT farm_id, status, planted_on FROM crops WHERE id = $1 FOR UPDATE")
            .bind(new.crop_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("crop", new.crop_id, e))?
            .ok_or_else(|| StoreError::not_found("crop", new.crop_id))?;

    if crop.status != CropStatus::Active.as_str() {
        return Err(ValidationError::Rejected {
            field: "crop",
            reason: format!("crop is {}; harvests are only recorded for active crops", crop.status),
        }
        .into());
    }
    if new.harvested_on < crop.planted_on {
        return Err(ValidationError::OutOfRange {
            field: "harvest date",
            reason: format!("{} is before planting date {}", new.harvested_on, crop.planted_on),
        }
        .into());
    }

    let id = HarvestId::generate();
    let harvest = sqlx::query_as::<_, Harvest>(concat!(
        r#"
        INSERT INTO harvests (id, crop_id, farm_id, quantity, unit, estimated_kg, quality,
                              earnings, harvested_on)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(new.crop_id)
    .bind(crop.farm_id)
    .bind(new.quantity)
    .bind(new.unit.as_str())
    .bind(new.estimated_kg)
    .bind(new.quality.as_str())
    .bind(new.earnings)
    .bind(new.harvested_on)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, format!("{}@{}", new.crop_id, new.harvested_on), e))?;

    // Only a later date is a change to the crop; back-filled harvests leave it alone.
    sqlx::query(
        r#"
        UPDATE crops SET
            last_harvest_on = $2,
            version = version + 1,
            updated_at = GREATEST(clock_timestamp(), updated_at)
        WHERE id = $1 AND (last_harvest_on IS NULL OR last_harvest_on < $2)
        "#,
    )
    .bind(new.crop_id)
    .bind(new.harvested_on)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("crop", new.crop_id, e))?;

    Ok(harvest)
}

pub async fn fetch<'e, E: PgExecutor<'e>>(executor: E, id: HarvestId) -> StoreResult<Harvest> {
    sqlx::query_as::<_, Harvest>(concat!("SELECT ", columns!(), " FROM harvests WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, id, e))?
        .ok_or_else(|| StoreError::not_found(RESOURCE, id))
}

pub async fn update(
    conn: &mut PgConnection,
    id: HarvestId,
    expected_version: i64,
    patch: HarvestPatch,
) -> StoreResult<Harvest> {
    reject_empty_patch(patch.is_empty(), RESOURCE)?;

    let (set_unit, unit, estimated_kg) = match patch.unit {
        Some((unit, kg)) => (true, Some(unit.as_str()), kg),
        None => (false, None, None),
    };

    let updated = sqlx::query_as::<_, Harvest>(concat!(
        r#"
        UPDATE harvests SET
            quantity = COALESCE($3, quantity),
            unit = CASE WHEN $4 THEN $5 ELSE unit END,
            estimated_kg = CASE WHEN $4 THEN $6 ELSE estimated_kg END,
            quality = COALESCE($7, quality),
            earnings = COALESCE($8, earnings),
            version = version + 1,
            updated_at = GREATEST(clock_timestamp(), updated_at)
        WHERE id = $1 AND version = $2
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(expected_version)
    .bind(patch.quantity)
    .bind(set_unit)
    .bind(unit)
    .bind(estimated_kg)
    .bind(patch.quality.map(|q| q.as_str()))
    .bind(patch.earnings)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))?;

    match updated {
        Some(harvest) => Ok(harvest),
        None => Err(stale_or_missing(conn, "harvests", RESOURCE, id.as_uuid(), expected_version).await),
    }
}

/// The crop's `last_harvest_on` is left as is; it records the latest
/// harvest ever seen, not the latest one still on file.
pub async fn remove(conn: &mut PgConnection, id: HarvestId) -> StoreResult<()> {
    delete_row(conn, "harvests", RESOURCE, id.as_uuid()).await
}

/// Harvest repository
pub struct HarvestRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> HarvestRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a harvest for an active crop.
    ///
    /// One harvest per crop per day; a second one is `Conflict(Duplicate)`.
    #[instrument(skip(self, new), fields(crop_id = %new.crop_id, harvested_on = %new.harvested_on), err)]
    pub async fn create(&self, new: NewHarvest) -> StoreResult<Harvest> {
        with_transaction(self.pool, move |conn| Box::pin(insert(conn, new))).await
    }

    #[instrument(skip(self), err)]
    pub async fn get(&self, id: HarvestId) -> StoreResult<Harvest> {
        fetch(self.pool, id).await
    }

    /// Harvests of one crop, newest first.
    #[instrument(skip(self), err)]
    pub async fn list_for_crop(&self, crop_id: CropId, page: Pagination) -> StoreResult<Paginated<Harvest>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            columns!(),
            r#", COUNT(*) OVER() AS total
            FROM harvests
            WHERE crop_id = $1
            ORDER BY harvested_on DESC
            LIMIT $2 OFFSET $3"#
        ))
        .bind(crop_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, crop_id, e))?;

        Ok(Paginated::from_counted(counted(rows)?, page))
    }

    /// Most recent harvest of a crop, if it was ever harvested.
    #[instrument(skip(self), err)]
    pub async fn latest_for_crop(&self, crop_id: CropId) -> StoreResult<Option<Harvest>> {
        sqlx::query_as::<_, Harvest>(concat!(
            "SELECT ",
            columns!(),
            " FROM harvests WHERE crop_id = $1 ORDER BY harvested_on DESC LIMIT 1"
        ))
        .bind(crop_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, crop_id, e))
    }

    #[instrument(skip(self, patch), err)]
    pub async fn update(&self, id: HarvestId, expected_version: i64, patch: HarvestPatch) -> StoreResult<Harvest> {
        with_transaction(self.pool, move |conn| {
            Box::pin(update(conn, id, expected_version, patch))
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: HarvestId) -> StoreResult<()> {
        with_transaction(self.pool, move |conn| Box::pin(remove(conn, id))).await
    }
}
