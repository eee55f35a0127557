//! Expense repository

use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::instrument;

use super::{counted, delete_row, lock_parent, reject_empty_patch, stale_or_missing};
use crate::db::with_transaction;
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::models::{Expense, ExpenseId, ExpensePatch, FarmId, NewExpense, Paginated, Pagination};

const RESOURCE: &str = "expense";

macro_rules! columns {
    () => {
        "id, farm_id, category, description, amount::float8 AS amount, spent_on, \
         created_at, updated_at, version"
    };
}

pub async fn insert(conn: &mut PgConnection, new: NewExpense) -> StoreResult<Expense> {
    lock_parent(conn, "farms", "farm", new.farm_id.as_uuid()).await?;

    let id = ExpenseId::generate();
    sqlx::query_as::<_, Expense>(concat!(
        "INSERT INTO expenses (id, farm_id, category, description, amount, spent_on) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING ",
        columns!()
    ))
    .bind(id)
    .bind(new.farm_id)
    .bind(&new.category)
    .bind(&new.description)
    .bind(new.amount)
    .bind(new.spent_on)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))
}

pub async fn fetch<'e, E: PgExecutor<'e>>(executor: E, id: ExpenseId) -> StoreResult<Expense> {
    sqlx::query_as::<_, Expense>(concat!("SELECT ", columns!(), " FROM expenses WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, id, e))?
        .ok_or_else(|| StoreError::not_found(RESOURCE, id))
}

pub async fn update(
    conn: &mut PgConnection,
    id: ExpenseId,
    expected_version: i64,
    patch: ExpensePatch,
) -> StoreResult<Expense> {
    reject_empty_patch(patch.is_empty(), RESOURCE)?;

    let set_description = patch.description.is_some();
    let updated = sqlx::query_as::<_, Expense>(concat!(
        r#"
        UPDATE expenses SET
            category = COALESCE($3, category),
            description = CASE WHEN $4 THEN $5 ELSE description END,
            amount = COALESCE($6, amount),
            spent_on = COALESCE($7, spent_on),
            version = version + 1,
            updated_at = GREATEST(clock_timestamp(), updated_at)
        WHERE id = $1 AND version = $2
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(expected_version)
    .bind(patch.category)
    .bind(set_description)
    .bind(patch.description.flatten())
    .bind(patch.amount)
    .bind(patch.spent_on)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))?;

    match updated {
        Some(expense) => Ok(expense),
        None => Err(stale_or_missing(conn, "expenses", RESOURCE, id.as_uuid(), expected_version).await),
    }
}

pub async fn remove(conn: &mut PgConnection, id: ExpenseId) -> StoreResult<()> {
    delete_row(conn, "expenses", RESOURCE, id.as_uuid()).await
}

/// Expense repository
pub struct ExpenseRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ExpenseRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, new), fields(farm_id = %new.farm_id), err)]
    pub async fn create(&self, new: NewExpense) -> StoreResult<Expense> {
        with_transaction(self.pool, move |conn| Box::pin(insert(conn, new))).await
    }

    #[instrument(skip(self), err)]
    pub async fn get(&self, id: ExpenseId) -> StoreResult<Expense> {
        fetch(self.pool, id).await
    }

    /// Expenses of one farm, most recent first.
    #[instrument(skip(self), err)]
    pub async fn list_for_farm(&self, farm_id: FarmId, page: Pagination) -> StoreResult<Paginated<Expense>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            columns!(),
            r#", COUNT(*) OVER() AS total
            FROM expenses
            WHERE farm_id = $1
            ORDER BY spent_on DESC, created_at DESC, id
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

    /// Sum of all expenses of a farm; `NotFound` for an unknown farm.
    #[instrument(skip(self), err)]
    pub async fn total_for_farm(&self, farm_id: FarmId) -> StoreResult<f64> {
        sqlx::query_scalar::<_, f64>(
            r#"
            SELECT (SELECT COALESCE(SUM(e.amount), 0) FROM expenses e WHERE e.farm_id = f.id)::float8
            FROM farms f
            WHERE f.id = $1
            "#,
        )
        .bind(farm_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| map_sqlx_error("farm", farm_id, e))?
        .ok_or_else(|| StoreError::not_found("farm", farm_id))
    }

    #[instrument(skip(self, patch), err)]
    pub async fn update(&self, id: ExpenseId, expected_version: i64, patch: ExpensePatch) -> StoreResult<Expense> {
        with_transaction(self.pool, move |conn| {
            Box::pin(update(conn, id, expected_version, patch))
        })
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: ExpenseId) -> StoreResult<()> {
        with_transaction(self.pool, move |conn| Box::pin(remove(conn, id))).await
    }
}
