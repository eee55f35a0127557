//! Plant method repository

use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::instrument;

use super::{counted, delete_row, lock_parent, reject_empty_patch, stale_or_missing};
use crate::db::with_transaction;
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::models::{
    NewPlantMethod, Paginated, Pagination, PlantMethod, PlantMethodId, PlantMethodPatch,
};

const RESOURCE: &str = "plant method";

macro_rules! columns {
    () => {
        "id, kind, description, created_by, status, created_at, updated_at, version"
    };
}

pub async fn insert(conn: &mut PgConnection, new: NewPlantMethod) -> StoreResult<PlantMethod> {
    if let Some(author) = new.created_by {
        lock_parent(conn, "users", "user", author.as_uuid()).await?;
    }

    let id = PlantMethodId::generate();
    sqlx::query_as::<_, PlantMethod>(concat!(
        "INSERT INTO plant_methods (id, kind, description, created_by) \
         VALUES ($1, $2, $3, $4) RETURNING ",
        columns!()
    ))
    .bind(id)
    .bind(new.kind.as_str())
    .bind(&new.description)
    .bind(new.created_by)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))
}

pub async fn fetch<'e, E: PgExecutor<'e>>(executor: E, id: PlantMethodId) -> StoreResult<PlantMethod> {
    sqlx::query_as::<_, PlantMethod>(concat!("SELECT ", columns!(), " FROM plant_methods WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, id, e))?
        .ok_or_else(|| StoreError::not_found(RESOURCE, id))
}

pub async fn update(
    conn: &mut PgConnection,
    id: PlantMethodId,
    expected_version: i64,
    patch: PlantMethodPatch,
) -> StoreResult<PlantMethod> {
    reject_empty_patch(patch.is_empty(), RESOURCE)?;

    let set_description = patch.description.is_some();
    let updated = sqlx::query_as::<_, PlantMethod>(concat!(
        r#"
        UPDATE plant_methods SET
            description = CASE WHEN $3 THEN $4 ELSE description END,
            status = COALESCE($5, status),
            version = version + 1,
            updated_at = GREATEST(clock_timestamp(), updated_at)
        WHERE id = $1 AND version = $2
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(expected_version)
    .bind(set_description)
    .bind(patch.description.flatten())
    .bind(patch.status.map(|s| s.as_str()))
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))?;

    match updated {
        Some(method) => Ok(method),
        None => Err(stale_or_missing(conn, "plant_methods", RESOURCE, id.as_uuid(), expected_version).await),
    }
}

pub async fn remove(conn: &mut PgConnection, id: PlantMethodId) -> StoreResult<()> {
    delete_row(conn, "plant_methods", RESOURCE, id.as_uuid()).await
}

/// Plant method repository
pub struct PlantMethodRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> PlantMethodRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, new), fields(kind = %new.kind), err)]
    pub async fn create(&self, new: NewPlantMethod) -> StoreResult<PlantMethod> {
        with_transaction(self.pool, move |conn| Box::pin(insert(conn, new))).await
    }

    #[instrument(skip(self), err)]
    pub async fn get(&self, id: PlantMethodId) -> StoreResult<PlantMethod> {
        fetch(self.pool, id).await
    }

    /// Methods offered when registering a crop.
    #[instrument(skip(self), err)]
    pub async fn list_active(&self, page: Pagination) -> StoreResult<Paginated<PlantMethod>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            columns!(),
            r#", COUNT(*) OVER() AS total
            FROM plant_methods
            WHERE status = 'active'
            ORDER BY kind, created_at, id
            LIMIT $1 OFFSET $2"#
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, "active", e))?;

        Ok(Paginated::from_counted(counted(rows)?, page))
    }

    #[instrument(skip(self, patch), err)]
    pub async fn update(
        &self,
        id: PlantMethodId,
        expected_version: i64,
        patch: PlantMethodPatch,
    ) -> StoreResult<PlantMethod> {
        with_transaction(self.pool, move |conn| {
            Box::pin(update(conn, id, expected_version, patch))
        })
        .await
    }

    /// Hard delete; refused with `Conflict(Dependents)` while crops use it.
    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: PlantMethodId) -> StoreResult<()> {
        with_transaction(self.pool, move |conn| Box::pin(remove(conn, id))).await
    }
}
