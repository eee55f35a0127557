//! Repository implementations for database access
//!
//! Each entity module exposes two layers:
//! - connection-level functions (`insert`, `fetch`, `update`, `remove`, ...)
//!   taking `&mut PgConnection`, for composing several steps inside one
//!   [`with_transaction`](crate::db::with_transaction) scope;
//! - a `*Repo<'a>` borrowing the pool, whose writes each run in their own
//!   transaction and whose reads run as single statements.
//!
//! Patterns shared by all of them:
//! - Parent rows are locked `FOR KEY SHARE` before a child is inserted
//! - Updates are conditional on the caller's `version` (no lost updates)
//! - Constraint violations are mapped by SQLSTATE (no check-then-insert)
//! - List operations carry `COUNT(*) OVER()` for the page total

pub mod activities;
pub mod crops;
pub mod daily;
pub mod expectations;
pub mod expenses;
pub mod farms;
pub mod harvests;
pub mod plant_methods;
pub mod users;

pub use activities::CropActivityRepo;
pub use crops::CropRepo;
pub use daily::CropDailyRepo;
pub use expectations::FarmExpectationRepo;
pub use expenses::ExpenseRepo;
pub use farms::FarmRepo;
pub use harvests::HarvestRepo;
pub use plant_methods::PlantMethodRepo;
pub use users::UserRepo;

use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Row};
use uuid::Uuid;

use crate::error::{
    is_foreign_key_violation, map_sqlx_error, violated_constraint, ConflictKind, StoreError,
    StoreResult,
};
use crate::models::{FarmId, FarmStatus, ValidationError};

/// Lock `table.id` against deletion for the rest of the transaction.
pub(crate) async fn lock_parent(
    conn: &mut PgConnection,
    table: &'static str,
    resource: &'static str,
    id: Uuid,
) -> StoreResult<()> {
    let sql = format!("SELECT 1 FROM {} WHERE id = $1 FOR KEY SHARE", table);
    sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(resource, id, e))?
        .map(|_| ())
        .ok_or_else(|| StoreError::not_found(resource, id))
}

/// Lock a farm like [`lock_parent`] and require it to be active.
pub(crate) async fn lock_active_farm(conn: &mut PgConnection, id: FarmId) -> StoreResult<()> {
    let status: String = sqlx::query_scalar("SELECT status FROM farms WHERE id = $1 FOR KEY SHARE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("farm", id, e))?
        .ok_or_else(|| StoreError::not_found("farm", id))?;

    if status != FarmStatus::Active.as_str() {
        return Err(ValidationError::Rejected {
            field: "farm",
            reason: format!("farm is {}; records are only added to active farms", status),
        }
        .into());
    }
    Ok(())
}

/// Explain why a versioned `UPDATE` matched no row.
pub(crate) async fn stale_or_missing(
    conn: &mut PgConnection,
    table: &'static str,
    resource: &'static str,
    id: Uuid,
    expected: i64,
) -> StoreError {
    let sql = format!("SELECT version FROM {} WHERE id = $1", table);
    match sqlx::query_scalar::<_, i64>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    {
        Ok(Some(actual)) => {
            StoreError::conflict(resource, id, ConflictKind::StaleVersion { expected, actual })
        }
        Ok(None) => StoreError::not_found(resource, id),
        Err(e) => map_sqlx_error(resource, id, e),
    }
}

/// Hard delete by id. Rows blocked by a `RESTRICT` reference are a conflict.
pub(crate) async fn delete_row(
    conn: &mut PgConnection,
    table: &'static str,
    resource: &'static str,
    id: Uuid,
) -> StoreResult<()> {
    let sql = format!("DELETE FROM {} WHERE id = $1", table);
    let result = sqlx::query(&sql)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| delete_error(resource, id, e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(resource, id));
    }
    Ok(())
}

fn delete_error(resource: &'static str, id: Uuid, err: sqlx::Error) -> StoreError {
    if is_foreign_key_violation(&err) {
        StoreError::conflict(
            resource,
            id,
            ConflictKind::Dependents {
                constraint: violated_constraint(&err),
            },
        )
    } else {
        map_sqlx_error(resource, id, err)
    }
}

pub(crate) fn reject_empty_patch(is_empty: bool, resource: &'static str) -> StoreResult<()> {
    if is_empty {
        return Err(ValidationError::EmptyPatch { resource }.into());
    }
    Ok(())
}

/// Decode rows that carry a `total` window column.
pub(crate) fn counted<T>(rows: Vec<PgRow>) -> Result<Vec<(T, i64)>, sqlx::Error>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    rows.iter()
        .map(|row| Ok((T::from_row(row)?, row.try_get("total")?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn empty_patch_is_validation_error() {
        let err = reject_empty_patch(true, "farm").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "validation error: farm update must change at least one field"
        );
        assert!(reject_empty_patch(false, "farm").is_ok());
    }

    #[test]
    fn non_constraint_delete_errors_pass_through() {
        let err = delete_error("farm", Uuid::nil(), sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
    }
}
