//! Daily crop record repository
//!
//! Records are filed under the crop whose NFC tag was scanned. The crop's
//! `stage` follows its latest active record: every write here that can
//! change that record re-derives the stage in the same transaction.

use chrono::NaiveDate;
use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::instrument;

use super::{counted, reject_empty_patch, stale_or_missing};
use crate::db::with_transaction;
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::models::{
    CropDaily, CropDailyPatch, CropId, CropStatus, DailyRecordId, DailyStatus, NewCropDaily,
    NfcCode, Paginated, Pagination, ValidationError,
};

const RESOURCE: &str = "daily record";

macro_rules! columns {
    () => {
        "id, crop_id, nfc_code, stage, stage_duration_days, status, recorded_on, \
         created_at, updated_at, version"
    };
}

#[derive(sqlx::FromRow)]
struct ScannedCrop {
    id: CropId,
    status: String,
    planted_on: NaiveDate,
}

/// Copy the stage of the crop's latest active record onto the crop.
///
/// A crop left without active records has no stage.
async fn sync_crop_stage(conn: &mut PgConnection, crop_id: CropId) -> StoreResult<()> {
    sqlx::query(
        r#"
        WITH latest AS (
            SELECT stage FROM crop_daily
            WHERE crop_id = $1 AND status = $2
            ORDER BY recorded_on DESC, created_at DESC
            LIMIT 1
        )
        UPDATE crops SET
            stage = (SELECT stage FROM latest),
            version = version + 1,
            updated_at = GREATEST(clock_timestamp(), updated_at)
        WHERE id = $1 AND stage IS DISTINCT FROM (SELECT stage FROM latest)
        "#,
    )
    .bind(crop_id)
    .bind(DailyStatus::Active.as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("crop", crop_id, e))?;
    Ok(())
}

pub async fn insert(conn: &mut PgConnection, new: NewCropDaily) -> StoreResult<CropDaily> {
    let code = new.nfc_code.as_str();
    let crop: ScannedCrop =
        sqlx::query_as("SELECT id, status, planted_on FROM crops WHERE nfc_code = $1 FOR UPDATE")
            .bind(code)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("crop", code, e))?
            .ok_or_else(|| StoreError::not_found("crop", code))?;

    if crop.status != CropStatus::Active.as_str() {
        return Err(ValidationError::Rejected {
            field: "crop",
            reason: format!("crop is {}; daily records are only kept for active crops", crop.status),
        }
        .into());
    }
    if new.recorded_on < crop.planted_on {
        return Err(ValidationError::OutOfRange {
            field: "record date",
            reason: format!("{} is before planting date {}", new.recorded_on, crop.planted_on),
        }
        .into());
    }

    let id = DailyRecordId::generate();
    let record = sqlx::query_as::<_, CropDaily>(concat!(
        r#"
        INSERT INTO crop_daily (id, crop_id, nfc_code, stage, stage_duration_days, recorded_on)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(crop.id)
    .bind(code)
    .bind(new.stage.as_str())
    .bind(new.stage_duration_days)
    .bind(new.recorded_on)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, format!("{}@{}", code, new.recorded_on), e))?;

    sync_crop_stage(conn, crop.id).await?;
    Ok(record)
}

pub async fn fetch<'e, E: PgExecutor<'e>>(executor: E, id: DailyRecordId) -> StoreResult<CropDaily> {
    sqlx::query_as::<_, CropDaily>(concat!("SELECT ", columns!(), " FROM crop_daily WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, id, e))?
        .ok_or_else(|| StoreError::not_found(RESOURCE, id))
}

pub async fn update(
    conn: &mut PgConnection,
    id: DailyRecordId,
    expected_version: i64,
    patch: CropDailyPatch,
) -> StoreResult<CropDaily> {
    reject_empty_patch(patch.is_empty(), RESOURCE)?;

    let moves_stage = patch.moves_stage();
    let set_duration = patch.stage_duration_days.is_some();
    let updated = sqlx::query_as::<_, CropDaily>(concat!(
        r#"
        UPDATE crop_daily SET
            stage = COALESCE($3, stage),
            stage_duration_days = CASE WHEN $4 THEN $5 ELSE stage_duration_days END,
            status = COALESCE($6, status),
            version = version + 1,
            updated_at = GREATEST(clock_timestamp(), updated_at)
        WHERE id = $1 AND version = $2
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(expected_version)
    .bind(patch.stage.map(|s| s.as_str()))
    .bind(set_duration)
    .bind(patch.stage_duration_days.flatten())
    .bind(patch.status.map(|s| s.as_str()))
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))?;

    let record = match updated {
        Some(record) => record,
        None => {
            return Err(stale_or_missing(conn, "crop_daily", RESOURCE, id.as_uuid(), expected_version).await)
        }
    };

    if moves_stage {
        sync_crop_stage(conn, record.crop_id).await?;
    }
    Ok(record)
}

pub async fn remove(conn: &mut PgConnection, id: DailyRecordId) -> StoreResult<()> {
    let crop_id: CropId = sqlx::query_scalar("DELETE FROM crop_daily WHERE id = $1 RETURNING crop_id")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, id, e))?
        .ok_or_else(|| StoreError::not_found(RESOURCE, id))?;

    sync_crop_stage(conn, crop_id).await
}

/// Daily crop record repository
pub struct CropDailyRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> CropDailyRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// File a record under the crop tagged `new.nfc_code`.
    ///
    /// One active record per crop per day; a second one is
    /// `Conflict(Duplicate)` until the first is retracted.
    #[instrument(skip(self, new), fields(nfc = %new.nfc_code.as_str(), recorded_on = %new.recorded_on), err)]
    pub async fn create(&self, new: NewCropDaily) -> StoreResult<CropDaily> {
        with_transaction(self.pool, move |conn| Box::pin(insert(conn, new))).await
    }

    #[instrument(skip(self), err)]
    pub async fn get(&self, id: DailyRecordId) -> StoreResult<CropDaily> {
        fetch(self.pool, id).await
    }

    /// Latest active record of the crop tagged `code`, if any.
    #[instrument(skip(self), err)]
    pub async fn latest_for_crop(&self, code: &str) -> StoreResult<Option<CropDaily>> {
        let code = NfcCode::new(code)?;
        sqlx::query_as::<_, CropDaily>(concat!(
            "SELECT ",
            columns!(),
            r#" FROM crop_daily
            WHERE nfc_code = $1 AND status = $2
            ORDER BY recorded_on DESC, created_at DESC
            LIMIT 1"#
        ))
        .bind(code.as_str())
        .bind(DailyStatus::Active.as_str())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, code.as_str(), e))
    }

    /// Every record of the crop tagged `code`, retracted ones included,
    /// newest first.
    #[instrument(skip(self), err)]
    pub async fn history(&self, code: &str, page: Pagination) -> StoreResult<Paginated<CropDaily>> {
        let code = NfcCode::new(code)?;
        let rows = sqlx::query(concat!(
            "SELECT ",
            columns!(),
            r#", COUNT(*) OVER() AS total
            FROM crop_daily
            WHERE nfc_code = $1
            ORDER BY recorded_on DESC, created_at DESC
            LIMIT $2 OFFSET $3"#
        ))
        .bind(code.as_str())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, code.as_str(), e))?;

        Ok(Paginated::from_counted(counted(rows)?, page))
    }

    #[instrument(skip(self, patch), err)]
    pub async fn update(
        &self,
        id: DailyRecordId,
        expected_version: i64,
        patch: CropDailyPatch,
    ) -> StoreResult<CropDaily> {
        with_transaction(self.pool, move |conn| {
            Box::pin(update(conn, id, expected_version, patch))
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: DailyRecordId) -> StoreResult<()> {
        with_transaction(self.pool, move |conn| Box::pin(remove(conn, id))).await
    }
}
