//! Crop repository
//!
//! A crop belongs to one farm for its whole life and is found in the field
//! by its NFC tag. Deleting a crop removes its harvests.

use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::instrument;

use super::{counted, delete_row, lock_parent, reject_empty_patch, stale_or_missing};
use crate::db::with_transaction;
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::models::{
    Crop, CropId, CropPatch, FarmId, NewCrop, NfcCode, Paginated, Pagination, PlantMethodId,
    RecordStatus, ValidationError,
};

const RESOURCE: &str = "crop";

macro_rules! columns {
    () => {
        "id, farm_id, method_id, nfc_code, crop_type, crop_subtype, stage, status, planted_on, \
         last_harvest_on, observed_at, created_at, updated_at, version"
    };
}

/// Lock the method row and refuse methods that were retired.
async fn usable_method(conn: &mut PgConnection, id: PlantMethodId) -> StoreResult<()> {
    let status: String = sqlx::query_scalar("SELECT status FROM plant_methods WHERE id = $1 FOR KEY SHARE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("plant method", id, e))?
        .ok_or_else(|| StoreError::not_found("plant method", id))?;

    if status == RecordStatus::Deleted.as_str() {
        return Err(ValidationError::Rejected {
            field: "plant method",
            reason: format!("method {} is deleted", id),
        }
        .into());
    }
    Ok(())
}

pub async fn insert(conn: &mut PgConnection, new: NewCrop) -> StoreResult<Crop> {
    lock_parent(conn, "farms", "farm", new.farm_id.as_uuid()).await?;
    usable_method(conn, new.method_id).await?;

    let id = CropId::generate();
    sqlx::query_as::<_, Crop>(concat!(
        r#"
        INSERT INTO crops (id, farm_id, method_id, nfc_code, crop_type, crop_subtype, stage,
                           planted_on, last_harvest_on)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(new.farm_id)
    .bind(new.method_id)
    .bind(new.nfc_code.as_str())
    .bind(&new.crop_type)
    .bind(&new.crop_subtype)
    .bind(new.stage.map(|s| s.as_str()))
    .bind(new.planted_on)
    .bind(new.last_harvest_on)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, new.nfc_code.as_str(), e))
}

pub async fn fetch<'e, E: PgExecutor<'e>>(executor: E, id: CropId) -> StoreResult<Crop> {
    sqlx::query_as::<_, Crop>(concat!("SELECT ", columns!(), " FROM crops WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, id, e))?
        .ok_or_else(|| StoreError::not_found(RESOURCE, id))
}

pub async fn fetch_by_nfc<'e, E: PgExecutor<'e>>(executor: E, code: &NfcCode) -> StoreResult<Crop> {
    sqlx::query_as::<_, Crop>(concat!("SELECT ", columns!(), " FROM crops WHERE nfc_code = $1"))
        .bind(code.as_str())
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, code.as_str(), e))?
        .ok_or_else(|| StoreError::not_found(RESOURCE, code.as_str()))
}

pub async fn update(
    conn: &mut PgConnection,
    id: CropId,
    expected_version: i64,
    patch: CropPatch,
) -> StoreResult<Crop> {
    reject_empty_patch(patch.is_empty(), RESOURCE)?;

    if let Some(method_id) = patch.method_id {
        usable_method(conn, method_id).await?;
    }

    let set_subtype = patch.crop_subtype.is_some();
    // last_harvest_on and observed_at only move forward; GREATEST skips
    // NULLs on either side.
    let updated = sqlx::query_as::<_, Crop>(concat!(
        r#"
        UPDATE crops SET
            method_id = COALESCE($3, method_id),
            crop_subtype = CASE WHEN $4 THEN $5 ELSE crop_subtype END,
            stage = COALESCE($6, stage),
            status = COALESCE($7, status),
            planted_on = COALESCE($8, planted_on),
            last_harvest_on = GREATEST(last_harvest_on, $9),
            observed_at = GREATEST(observed_at, $10),
            version = version + 1,
            updated_at = GREATEST(clock_timestamp(), updated_at)
        WHERE id = $1 AND version = $2
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(expected_version)
    .bind(patch.method_id)
    .bind(set_subtype)
    .bind(patch.crop_subtype.flatten())
    .bind(patch.stage.map(|s| s.as_str()))
    .bind(patch.status.map(|s| s.as_str()))
    .bind(patch.planted_on)
    .bind(patch.last_harvest_on)
    .bind(patch.observed_at)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))?;

    match updated {
        Some(crop) => Ok(crop),
        None => Err(stale_or_missing(conn, "crops", RESOURCE, id.as_uuid(), expected_version).await),
    }
}

pub async fn remove(conn: &mut PgConnection, id: CropId) -> StoreResult<()> {
    delete_row(conn, "crops", RESOURCE, id.as_uuid()).await
}

/// Crop repository
pub struct CropRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> CropRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Register a crop on an existing farm.
    ///
    /// `NotFound` if the farm or method is missing, `Conflict(Duplicate)`
    /// if the NFC code is already tagged on another crop.
    #[instrument(skip(self, new), fields(farm_id = %new.farm_id, nfc = %new.nfc_code.as_str()), err)]
    pub async fn create(&self, new: NewCrop) -> StoreResult<Crop> {
        with_transaction(self.pool, move |conn| Box::pin(insert(conn, new))).await
    }

    #[instrument(skip(self), err)]
    pub async fn get(&self, id: CropId) -> StoreResult<Crop> {
        fetch(self.pool, id).await
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_nfc(&self, code: &str) -> StoreResult<Crop> {
        let code = NfcCode::new(code)?;
        fetch_by_nfc(self.pool, &code).await
    }

    /// Crops of one farm, most recently planted first.
    #[instrument(skip(self), err)]
    pub async fn list_for_farm(&self, farm_id: FarmId, page: Pagination) -> StoreResult<Paginated<Crop>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            columns!(),
            r#", COUNT(*) OVER() AS total
            FROM crops
            WHERE farm_id = $1
            ORDER BY planted_on DESC, id
            LIMIT $2 OFFSET $3"#
        ))
        .bind(farm_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, farm_id, e))?;

        Ok(Paginated::from_counted(counted(rows)?, page))
    }

    #[instrument(skip(self, patch), err)]
    pub async fn update(&self, id: CropId, expected_version: i64, patch: CropPatch) -> StoreResult<Crop> {
        with_transaction(self.pool, move |conn| {
            Box::pin(update(conn, id, expected_version, patch))
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: CropId) -> StoreResult<()> {
        with_transaction(self.pool, move |conn| Box::pin(remove(conn, id))).await
    }
}
