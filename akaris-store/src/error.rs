//! Error taxonomy for akaris-store
//!
//! Every repository and transaction operation returns [`StoreError`].
//! Driver errors are classified by SQLSTATE so the route layer only ever
//! sees one of the domain kinds below.
//!
//! | SQLx error | SQLSTATE | StoreError |
//! |------------|----------|------------|
//! | unique violation | `23505` | `Conflict(Duplicate)` |
//! | foreign key violation | `23503` | `NotFound` (writes), `Conflict(Dependents)` (deletes) |
//! | not null / check violation | `23502`, `23514` | `Validation` |
//! | data exception | `22xxx` | `Validation` |
//! | serialization failure / deadlock | `40001`, `40P01` | `Conflict(Serialization)` |
//! | lock timeout / statement timeout | `55P03`, `57014` | `ResourceUnavailable` |
//! | `PoolTimedOut`, `PoolClosed` | n/a | `ResourceUnavailable` |
//! | anything else | n/a | `Database` |

use thiserror::Error;

use crate::models::ValidationError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Why a write collided with another one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// Row changed since the caller last read it.
    StaleVersion { expected: i64, actual: i64 },
    /// A unique key is already taken.
    Duplicate { constraint: String },
    /// Delete blocked by rows that still reference this one.
    Dependents { constraint: String },
    /// The database aborted the transaction to keep it serializable.
    Serialization,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleVersion { expected, actual } => write!(
                f,
                "stale version: expected {}, found {}",
                expected, actual
            ),
            Self::Duplicate { constraint } => write!(f, "duplicate value ({})", constraint),
            Self::Dependents { constraint } => {
                write!(f, "dependent rows still exist ({})", constraint)
            }
            Self::Serialization => write!(f, "concurrent transaction collision"),
        }
    }
}

/// Fieldless error category, used for status mapping by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    ResourceUnavailable,
    SchemaConflict,
    Config,
    Internal,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("conflict on {resource} '{id}': {kind}")]
    Conflict {
        resource: &'static str,
        id: String,
        kind: ConflictKind,
    },

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("schema conflict on table '{table}': {reason}")]
    SchemaConflict { table: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn conflict(resource: &'static str, id: impl ToString, kind: ConflictKind) -> Self {
        Self::Conflict {
            resource,
            id: id.to_string(),
            kind,
        }
    }

    pub fn schema_conflict(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaConflict {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            Self::SchemaConflict { .. } => ErrorKind::SchemaConflict,
            Self::Config(_) => ErrorKind::Config,
            Self::Database(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-running the whole operation may succeed.
    ///
    /// Stale-version conflicts only resolve if the retried operation
    /// re-reads the row first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict { kind, .. } => matches!(
                kind,
                ConflictKind::StaleVersion { .. } | ConflictKind::Serialization
            ),
            Self::ResourceUnavailable(_) => true,
            _ => false,
        }
    }

    /// Message safe to hand to external callers. Driver and schema details
    /// stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::NotFound { resource, .. } => format!("{} not found", resource),
            Self::Conflict { resource, kind, .. } => match kind {
                ConflictKind::StaleVersion { .. } => {
                    format!("{} was modified concurrently; re-fetch and retry", resource)
                }
                ConflictKind::Duplicate { .. } => format!("{} already exists", resource),
                ConflictKind::Dependents { .. } => {
                    format!("{} still has dependent records", resource)
                }
                ConflictKind::Serialization => {
                    format!("{} is busy; retry later", resource)
                }
            },
            Self::ResourceUnavailable(_) => "service temporarily unavailable".to_string(),
            Self::SchemaConflict { .. } | Self::Config(_) | Self::Database(_) => {
                "internal error".to_string()
            }
        }
    }
}

/// SQLSTATE classes this crate cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SqlState {
    UniqueViolation,
    ForeignKeyViolation,
    InvalidData,
    SerializationFailure,
    Timeout,
    Other,
}

pub(crate) fn classify_sqlstate(code: &str) -> SqlState {
    match code {
        "23505" => SqlState::UniqueViolation,
        "23503" => SqlState::ForeignKeyViolation,
        "23502" | "23514" => SqlState::InvalidData,
        "40001" | "40P01" => SqlState::SerializationFailure,
        "55P03" | "57014" => SqlState::Timeout,
        c if c.starts_with("22") => SqlState::InvalidData,
        _ => SqlState::Other,
    }
}

pub(crate) fn sqlstate(err: &sqlx::Error) -> Option<SqlState> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|code| classify_sqlstate(&code)),
        _ => None,
    }
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    sqlstate(err) == Some(SqlState::ForeignKeyViolation)
}

/// Map a sqlx error raised while operating on `resource` / `id`.
pub(crate) fn map_sqlx_error(resource: &'static str, id: impl ToString, err: sqlx::Error) -> StoreError {
    let id = id.to_string();
    let (state, message, constraint) = match &err {
        sqlx::Error::Database(db_err) => (
            db_err.code().map(|code| classify_sqlstate(&code)),
            db_err.message().to_owned(),
            db_err.constraint().unwrap_or("unknown").to_owned(),
        ),
        _ => (None, String::new(), String::new()),
    };

    match state {
        Some(SqlState::UniqueViolation) => StoreError::Conflict {
            resource,
            id,
            kind: ConflictKind::Duplicate { constraint },
        },
        Some(SqlState::ForeignKeyViolation) => StoreError::NotFound {
            resource: "referenced record",
            id: constraint,
        },
        Some(SqlState::InvalidData) => StoreError::Validation(ValidationError::Rejected {
            field: resource,
            reason: message,
        }),
        Some(SqlState::SerializationFailure) => StoreError::Conflict {
            resource,
            id,
            kind: ConflictKind::Serialization,
        },
        Some(SqlState::Timeout) => {
            StoreError::ResourceUnavailable(format!("{} '{}': {}", resource, id, message))
        }
        Some(SqlState::Other) | None => match err {
            sqlx::Error::PoolTimedOut => StoreError::ResourceUnavailable(
                "timed out waiting for a database connection".into(),
            ),
            sqlx::Error::PoolClosed => {
                StoreError::ResourceUnavailable("connection pool is closed".into())
            }
            other => StoreError::Database(other),
        },
    }
}

/// Constraint named in a driver error, if any.
pub(crate) fn violated_constraint(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint().unwrap_or("unknown").to_owned(),
        _ => "unknown".to_owned(),
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        map_sqlx_error("record", "-", err)
    }
}
