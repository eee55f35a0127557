//! Farm repository
//!
//! Deleting a farm removes its crops, harvests and expenses with it.

use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::instrument;

use super::{counted, delete_row, lock_parent, reject_empty_patch, stale_or_missing};
use crate::db::with_transaction;
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::models::{Farm, FarmId, FarmPatch, NewFarm, Paginated, Pagination, UserId};

const RESOURCE: &str = "farm";

macro_rules! columns {
    () => {
        "id, owner_id, name, crop_type, size::float8 AS size, location, status, \
         created_at, updated_at, version"
    };
}

pub async fn insert(conn: &mut PgConnection, new: NewFarm) -> StoreResult<Farm> {
    lock_parent(conn, "users", "user", new.owner_id.as_uuid()).await?;

    let id = FarmId::generate();
    sqlx::query_as::<_, Farm>(concat!(
        "INSERT INTO farms (id, owner_id, name, crop_type, size, location) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING ",
        columns!()
    ))
    .bind(id)
    .bind(new.owner_id)
    .bind(&new.name)
    .bind(&new.crop_type)
    .bind(new.size)
    .bind(&new.location)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, &new.name, e))
}

pub async fn fetch<'e, E: PgExecutor<'e>>(executor: E, id: FarmId) -> StoreResult<Farm> {
    sqlx::query_as::<_, Farm>(concat!("SELECT ", columns!(), " FROM farms WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, id, e))?
        .ok_or_else(|| StoreError::not_found(RESOURCE, id))
}

pub async fn update(
    conn: &mut PgConnection,
    id: FarmId,
    expected_version: i64,
    patch: FarmPatch,
) -> StoreResult<Farm> {
    reject_empty_patch(patch.is_empty(), RESOURCE)?;

    let updated = sqlx::query_as::<_, Farm>(concat!(
        r#"
        UPDATE farms SET
            name = COALESCE($3, name),
            crop_type = COALESCE($4, crop_type),
            size = COALESCE($5, size),
            location = COALESCE($6, location),
            status = COALESCE($7, status),
            version = version + 1,
            updated_at = GREATEST(clock_timestamp(), updated_at)
        WHERE id = $1 AND version = $2
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(expected_version)
    .bind(patch.name)
    .bind(patch.crop_type)
    .bind(patch.size)
    .bind(patch.location)
    .bind(patch.status.map(|s| s.as_str()))
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))?;

    match updated {
        Some(farm) => Ok(farm),
        None => Err(stale_or_missing(conn, "farms", RESOURCE, id.as_uuid(), expected_version).await),
    }
}

pub async fn remove(conn: &mut PgConnection, id: FarmId) -> StoreResult<()> {
    delete_row(conn, "farms", RESOURCE, id.as_uuid()).await
}

/// Farm repository
pub struct FarmRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> FarmRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a farm for an existing owner.
    ///
    /// `NotFound` if the owner does not exist, `Conflict(Duplicate)` if the
    /// owner already has a farm with this name.
    #[instrument(skip(self, new), fields(owner_id = %new.owner_id, name = %new.name), err)]
    pub async fn create(&self, new: NewFarm) -> StoreResult<Farm> {
        with_transaction(self.pool, move |conn| Box::pin(insert(conn, new))).await
    }

    #[instrument(skip(self), err)]
    pub async fn get(&self, id: FarmId) -> StoreResult<Farm> {
        fetch(self.pool, id).await
    }

    /// Farms of one owner, oldest first.
    #[instrument(skip(self), err)]
    pub async fn list_for_owner(&self, owner_id: UserId, page: Pagination) -> StoreResult<Paginated<Farm>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            columns!(),
            r#", COUNT(*) OVER() AS total
            FROM farms
            WHERE owner_id = $1
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3"#
        ))
        .bind(owner_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, owner_id, e))?;

        Ok(Paginated::from_counted(counted(rows)?, page))
    }

    #[instrument(skip(self, patch), err)]
    pub async fn update(&self, id: FarmId, expected_version: i64, patch: FarmPatch) -> StoreResult<Farm> {
        with_transaction(self.pool, move |conn| {
            Box::pin(update(conn, id, expected_version, patch))
        })
        .await
    }

    /// Hard delete; crops, harvests and expenses of the farm go with it.
    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: FarmId) -> StoreResult<()> {
        with_transaction(self.pool, move |conn| Box::pin(remove(conn, id))).await
    }
}
