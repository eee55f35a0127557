//! User repository
//!
//! - create: INSERT, duplicate email is `Conflict(Duplicate)`
//! - delete: blocked while the user still owns farms
//! - record_login: audit row plus a monotonic `last_login_at`

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::instrument;

use super::{delete_row, reject_empty_patch, stale_or_missing};
use crate::db::with_transaction;
use crate::error::{map_sqlx_error, StoreError, StoreResult};
use crate::models::user::parse_ip;
use crate::models::{Email, Login, LoginId, NewUser, User, UserId, UserPatch};

const RESOURCE: &str = "user";

macro_rules! columns {
    () => {
        "id, first_name, last_name, email, credential_ref, phone_number, role, status, \
         registered_at, last_login_at, updated_at, version"
    };
}

pub async fn insert(conn: &mut PgConnection, new: NewUser) -> StoreResult<User> {
    let id = UserId::generate();
    sqlx::query_as::<_, User>(concat!(
        "INSERT INTO users (id, first_name, last_name, email, credential_ref, phone_number, role) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING ",
        columns!()
    ))
    .bind(id)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(new.email.as_str())
    .bind(&new.credential_ref)
    .bind(new.phone_number.as_str())
    .bind(new.role.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, new.email.as_str(), e))
}

pub async fn fetch<'e, E: PgExecutor<'e>>(executor: E, id: UserId) -> StoreResult<User> {
    sqlx::query_as::<_, User>(concat!("SELECT ", columns!(), " FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, id, e))?
        .ok_or_else(|| StoreError::not_found(RESOURCE, id))
}

pub async fn fetch_by_email<'e, E: PgExecutor<'e>>(executor: E, email: &Email) -> StoreResult<User> {
    sqlx::query_as::<_, User>(concat!("SELECT ", columns!(), " FROM users WHERE email = $1"))
        .bind(email.as_str())
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error(RESOURCE, email.as_str(), e))?
        .ok_or_else(|| StoreError::not_found(RESOURCE, email.as_str()))
}

pub async fn update(
    conn: &mut PgConnection,
    id: UserId,
    expected_version: i64,
    patch: UserPatch,
) -> StoreResult<User> {
    reject_empty_patch(patch.is_empty(), RESOURCE)?;

    let updated = sqlx::query_as::<_, User>(concat!(
        r#"
        UPDATE users SET
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            email = COALESCE($5, email),
            credential_ref = COALESCE($6, credential_ref),
            phone_number = COALESCE($7, phone_number),
            role = COALESCE($8, role),
            status = COALESCE($9, status),
            version = version + 1,
            updated_at = GREATEST(clock_timestamp(), updated_at)
        WHERE id = $1 AND version = $2
        RETURNING "#,
        columns!()
    ))
    .bind(id)
    .bind(expected_version)
    .bind(patch.first_name)
    .bind(patch.last_name)
    .bind(patch.email.as_ref().map(Email::as_str))
    .bind(patch.credential_ref)
    .bind(patch.phone_number.as_ref().map(|p| p.as_str()))
    .bind(patch.role.map(|r| r.as_str()))
    .bind(patch.status.map(|s| s.as_str()))
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))?;

    match updated {
        Some(user) => Ok(user),
        None => Err(stale_or_missing(conn, "users", RESOURCE, id.as_uuid(), expected_version).await),
    }
}

pub async fn remove(conn: &mut PgConnection, id: UserId) -> StoreResult<()> {
    delete_row(conn, "users", RESOURCE, id.as_uuid()).await
}

/// Append a login row and move `last_login_at` forward (never back).
pub async fn insert_login(conn: &mut PgConnection, id: UserId, ip_address: String) -> StoreResult<Login> {
    let logged_in_at: DateTime<Utc> = sqlx::query_scalar(
        r#"
        UPDATE users SET last_login_at = GREATEST(last_login_at, clock_timestamp())
        WHERE id = $1
        RETURNING last_login_at
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error(RESOURCE, id, e))?
    .ok_or_else(|| StoreError::not_found(RESOURCE, id))?;

    sqlx::query_as::<_, Login>(
        r#"
        INSERT INTO user_logins (id, user_id, logged_in_at, ip_address)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, logged_in_at, ip_address
        "#,
    )
    .bind(LoginId::generate())
    .bind(id)
    .bind(logged_in_at)
    .bind(ip_address)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("login", id, e))
}

/// User repository
pub struct UserRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, new), fields(email = %new.email.as_str()), err)]
    pub async fn create(&self, new: NewUser) -> StoreResult<User> {
        with_transaction(self.pool, move |conn| Box::pin(insert(conn, new))).await
    }

    #[instrument(skip(self), err)]
    pub async fn get(&self, id: UserId) -> StoreResult<User> {
        fetch(self.pool, id).await
    }

    /// Look up by email, case-insensitively.
    #[instrument(skip(self), err)]
    pub async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let email = Email::new(email)?;
        fetch_by_email(self.pool, &email).await
    }

    #[instrument(skip(self, patch), err)]
    pub async fn update(&self, id: UserId, expected_version: i64, patch: UserPatch) -> StoreResult<User> {
        with_transaction(self.pool, move |conn| {
            Box::pin(update(conn, id, expected_version, patch))
        })
        .await
    }

    /// Hard delete. Login history goes with the user and plant methods they
    /// authored lose their author; owned farms block the delete.
    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: UserId) -> StoreResult<()> {
        with_transaction(self.pool, move |conn| Box::pin(remove(conn, id))).await
    }

    #[instrument(skip(self), err)]
    pub async fn record_login(&self, id: UserId, ip_address: &str) -> StoreResult<Login> {
        let ip_address = parse_ip(ip_address)?;
        with_transaction(self.pool, move |conn| {
            Box::pin(insert_login(conn, id, ip_address))
        })
        .await
    }

    /// Most recent logins first. Unknown users have no logins.
    #[instrument(skip(self), err)]
    pub async fn recent_logins(&self, id: UserId, limit: u32) -> StoreResult<Vec<Login>> {
        sqlx::query_as::<_, Login>(
            r#"
            SELECT id, user_id, logged_in_at, ip_address
            FROM user_logins
            WHERE user_id = $1
            ORDER BY logged_in_at DESC, id
            LIMIT $2
            "#,
        )
        .bind(id)
        .bind(i64::from(limit.clamp(1, 100)))
        .fetch_all(self.pool)
        .await
        .map_err(|e| map_sqlx_error("login", id, e))
    }
}
