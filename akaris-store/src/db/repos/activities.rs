//! Crop activity repository
//!
//! An activity is logged against a farm and, optionally, one of that
//! farm's crops. The author is kept for the activity's whole life, so a
//! user with logged activities cannot be deleted.

use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::instrument;

use super::{counted, delete_row, lock_active_farm, lock_parent, reject_empty_patch, stale_or_missing};
use crate::db::with_transaction;
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::models::{
    ActivityId, CropActivity, CropActivityPatch, CropId, FarmId, NewCropActivity, Paginated,
    Pagination, RecordStatus, ValidationError,
};

const RESOURCE: &str = "crop activity";

macro_rules! columns {
    () => {
        "id, farm_id, crop_id, kind, other_activity, details, performed_by, performed_on, \
         status, created_at, updated_at, version"
    };
}

/// Lock the crop and require it to grow on `farm_id`.
async fn crop_on_farm(conn: &mut PgConnection, crop_id: CropId, farm_id: FarmId) -> StoreResult<()> {
    let owner: FarmId = sqlx::query_scalar("SELECT farm_id FROM crops WHERE id = $1 FOR KEY SHARE")
        .bind(crop_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("crop", crop_id, e))?
        .ok_or_else(|| StoreError::not_found("crop", crop_id))?;

    if owner != farm_id {
        return Err(ValidationError::Rejected {
            field: "crop",
            reason: format!("crop {} belongs to another farm", crop_id),
        }
        .into());
    }
    Ok(())
}

pub async fn insert(conn: &mut PgConnection, new: NewCropActivity) -> StoreResult<CropActivity> {
    lock_active_farm(conn, new.farm_id).await?;
    lock_parent(conn, "users", "user", new.performed_by.as_uuid()).await?;
    if let Some(crop_id) = new.crop_id {
        crop_on_farm(conn, crop_id, new.farm_id).await?;
    }

    let id = ActivityId::generate();
    sqlx::query_as::<_, CropActivity>(concat!(
        r#"
        INSERT INTO crop_activities (id, farm_id, crop_id, kind, other_activity, details,
                                     performed_by, performed_on)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(new.farm_id)
    .bind(new.crop_id)
    .bind(new.kind.as_str())
    .bind(&new.other_activity)
    .bind(&new.details)
    .bind(new.performed_by)
    .bind(new.performed_on)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))
}

pub async fn fetch<'e, E: PgExecutor<'e>>(executor: E, id: ActivityId) -> StoreResult<CropActivity> {
    sqlx::query_as::<_, CropActivity>(concat!("SELECT ", columns!(), " FROM crop_activities WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, id, e))?
        .ok_or_else(|| StoreError::not_found(RESOURCE, id))
}

pub async fn update(
    conn: &mut PgConnection,
    id: ActivityId,
    expected_version: i64,
    patch: CropActivityPatch,
) -> StoreResult<CropActivity> {
    reject_empty_patch(patch.is_empty(), RESOURCE)?;

    let (set_kind, kind, other_activity) = match patch.kind {
        Some((kind, other)) => (true, Some(kind.as_str()), other),
        None => (false, None, None),
    };
    let set_details = patch.details.is_some();
    let updated = sqlx::query_as::<_, CropActivity>(concat!(
        r#"
        UPDATE crop_activities SET
            kind = CASE WHEN $3 THEN $4 ELSE kind END,
            other_activity = CASE WHEN $3 THEN $5 ELSE other_activity END,
            details = CASE WHEN $6 THEN $7 ELSE details END,
            performed_on = COALESCE($8, performed_on),
            status = COALESCE($9, status),
            version = version + 1,
            updated_at = GREATEST(clock_timestamp(), updated_at)
        WHERE id = $1 AND version = $2
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(expected_version)
    .bind(set_kind)
    .bind(kind)
    .bind(other_activity)
    .bind(set_details)
    .bind(patch.details.flatten())
    .bind(patch.performed_on)
    .bind(patch.status.map(|s| s.as_str()))
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))?;

    match updated {
        Some(activity) => Ok(activity),
        None => Err(stale_or_missing(conn, "crop_activities", RESOURCE, id.as_uuid(), expected_version).await),
    }
}

pub async fn remove(conn: &mut PgConnection, id: ActivityId) -> StoreResult<()> {
    delete_row(conn, "crop_activities", RESOURCE, id.as_uuid()).await
}

/// Crop activity repository
pub struct CropActivityRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> CropActivityRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Log work on an active farm.
    ///
    /// `NotFound` for an unknown farm, crop or author; a crop of another
    /// farm is a validation error.
    #[instrument(skip(self, new), fields(farm_id = %new.farm_id, kind = %new.kind.as_str()), err)]
    pub async fn create(&self, new: NewCropActivity) -> StoreResult<CropActivity> {
        with_transaction(self.pool, move |conn| Box::pin(insert(conn, new))).await
    }

    #[instrument(skip(self), err)]
    pub async fn get(&self, id: ActivityId) -> StoreResult<CropActivity> {
        fetch(self.pool, id).await
    }

    /// Activities of a farm that are not deleted, most recent first.
    #[instrument(skip(self), err)]
    pub async fn list_for_farm(
        &self,
        farm_id: FarmId,
        page: Pagination,
    ) -> StoreResult<Paginated<CropActivity>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            columns!(),
            r#", COUNT(*) OVER() AS total
            FROM crop_activities
            WHERE farm_id = $1 AND status <> $2
            ORDER BY performed_on DESC, created_at DESC, id
            LIMIT $3 OFFSET $4"#
        ))
        .bind(farm_id)
        .bind(RecordStatus::Deleted.as_str())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, farm_id, e))?;

        Ok(Paginated::from_counted(counted(rows)?, page))
    }

    /// Activities logged against one crop that are not deleted, most
    /// recent first.
    #[instrument(skip(self), err)]
    pub async fn list_for_crop(
        &self,
        crop_id: CropId,
        page: Pagination,
    ) -> StoreResult<Paginated<CropActivity>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            columns!(),
            r#", COUNT(*) OVER() AS total
            FROM crop_activities
            WHERE crop_id = $1 AND status <> $2
            ORDER BY performed_on DESC, created_at DESC, id
            LIMIT $3 OFFSET $4"#
        ))
        .bind(crop_id)
        .bind(RecordStatus::Deleted.as_str())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, crop_id, e))?;

        Ok(Paginated::from_counted(counted(rows)?, page))
    }

    #[instrument(skip(self, patch), err)]
    pub async fn update(
        &self,
        id: ActivityId,
        expected_version: i64,
        patch: CropActivityPatch,
    ) -> StoreResult<CropActivity> {
        with_transaction(self.pool, move |conn| {
            Box::pin(update(conn, id, expected_version, patch))
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: ActivityId) -> StoreResult<()> {
        with_transaction(self.pool, move |conn| Box::pin(remove(conn, id))).await
    }
}
