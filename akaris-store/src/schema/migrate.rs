//! Bring a database in line with the declared registry
//!
//! [`ensure_schema`] reads the catalog, plans the missing pieces and applies
//! them inside one transaction under an advisory lock, so concurrent
//! starters serialize and a failed step leaves nothing half-applied.
//! Running it against an up-to-date database plans nothing and writes
//! nothing.
//!
//! Existing columns are never altered or dropped. A declared column whose
//! stored type or nullability differs is a [`StoreError::SchemaConflict`],
//! and so is a constraint that enforces something other than its
//! declaration. Constraints are matched by what they enforce, so a table
//! created elsewhere with Postgres' default constraint names is accepted.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument, warn};

use super::{registry, ConstraintRow, ConstraintStatus, ObservedColumn, ObservedConstraint, TableDef};
use crate::db::with_transaction;
use crate::error::{sqlstate, SqlState, StoreError, StoreResult};

/// Version written to `schema_migrations` once the registry is applied.
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_DESCRIPTION: &str =
    "farm records: users, farms, plant methods, crops, harvests, expenses, expectations, daily records, activities";

/// `pg_advisory_xact_lock` key ("akaris" in ASCII).
const MIGRATION_LOCK_KEY: i64 = 0x616b_6172_6973;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    CreateTable,
    AddColumn,
    AddConstraint,
    CreateIndex,
}

/// One DDL statement the plan will run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaChange {
    pub table: &'static str,
    pub action: ChangeAction,
    /// Column, constraint or index name; the table name for `CreateTable`
    pub object: String,
    pub sql: String,
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            ChangeAction::CreateTable => write!(f, "create table {}", self.table),
            ChangeAction::AddColumn => write!(f, "add column {}.{}", self.table, self.object),
            ChangeAction::AddConstraint => {
                write!(f, "add constraint {} on {}", self.object, self.table)
            }
            ChangeAction::CreateIndex => write!(f, "create index {} on {}", self.object, self.table),
        }
    }
}

/// Difference between the registry and a database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaPlan {
    pub changes: Vec<SchemaChange>,
    /// `table.column` present in the database but not declared; left alone
    pub undeclared_columns: Vec<String>,
    /// Highest version recorded in `schema_migrations`
    pub recorded_version: Option<i32>,
}

impl SchemaPlan {
    pub fn needs_version_record(&self) -> bool {
        self.recorded_version != Some(SCHEMA_VERSION)
    }

    /// Nothing to create and the version is already recorded.
    pub fn is_current(&self) -> bool {
        self.changes.is_empty() && !self.needs_version_record()
    }

    pub fn tables_created(&self) -> Vec<&'static str> {
        self.changes
            .iter()
            .filter(|c| c.action == ChangeAction::CreateTable)
            .map(|c| c.table)
            .collect()
    }
}

/// Snapshot of the parts of the catalog the plan depends on
#[derive(Debug, Default)]
pub(crate) struct Catalog {
    columns: HashMap<String, Vec<ObservedColumn>>,
    constraints: HashMap<String, Vec<ObservedConstraint>>,
    indexes: HashSet<String>,
    recorded_version: Option<i32>,
}

/// Diff `tables` against `catalog`. Pure; no I/O.
pub(crate) fn plan(tables: &[TableDef], catalog: &Catalog) -> StoreResult<SchemaPlan> {
    if let Some(recorded) = catalog.recorded_version {
        if recorded > SCHEMA_VERSION {
            return Err(StoreError::schema_conflict(
                "schema_migrations",
                format!(
                    "database is at version {}, this build only knows version {}",
                    recorded, SCHEMA_VERSION
                ),
            ));
        }
    }

    let mut out = SchemaPlan {
        recorded_version: catalog.recorded_version,
        ..SchemaPlan::default()
    };

    for table in tables {
        match catalog.columns.get(table.name) {
            None => {
                out.changes.push(SchemaChange {
                    table: table.name,
                    action: ChangeAction::CreateTable,
                    object: table.name.to_owned(),
                    sql: table.create_sql(),
                });
            }
            Some(observed) => {
                plan_columns(table, observed, &mut out)?;
                let constraints = catalog
                    .constraints
                    .get(table.name)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                plan_constraints(table, constraints, &mut out)?;
            }
        }

        for (name, sql) in table.index_sql() {
            if !catalog.indexes.contains(&name) {
                out.changes.push(SchemaChange {
                    table: table.name,
                    action: ChangeAction::CreateIndex,
                    object: name,
                    sql,
                });
            }
        }
    }

    Ok(out)
}

fn plan_columns(table: &TableDef, observed: &[ObservedColumn], out: &mut SchemaPlan) -> StoreResult<()> {
    for column in &table.columns {
        match observed.iter().find(|o| o.column_name == column.name) {
            None if column.addable() => out.changes.push(SchemaChange {
                table: table.name,
                action: ChangeAction::AddColumn,
                object: column.name.to_owned(),
                sql: format!("ALTER TABLE {} ADD COLUMN {}", table.name, column.ddl()),
            }),
            None => {
                return Err(StoreError::schema_conflict(
                    table.name,
                    format!(
                        "column '{}' is missing and is NOT NULL without a default",
                        column.name
                    ),
                ))
            }
            Some(found) if !column.ty.matches(found) => {
                return Err(StoreError::schema_conflict(
                    table.name,
                    format!(
                        "column '{}' is {}, declared {}",
                        column.name,
                        found.describe(),
                        column.ty
                    ),
                ))
            }
            Some(found) if found.is_nullable != column.nullable => {
                let describe = |nullable: bool| if nullable { "nullable" } else { "NOT NULL" };
                return Err(StoreError::schema_conflict(
                    table.name,
                    format!(
                        "column '{}' is {}, declared {}",
                        column.name,
                        describe(found.is_nullable),
                        describe(column.nullable)
                    ),
                ));
            }
            Some(_) => {}
        }
    }

    for found in observed {
        if table.find_column(&found.column_name).is_none() {
            out.undeclared_columns
                .push(format!("{}.{}", table.name, found.column_name));
        }
    }

    Ok(())
}

fn plan_constraints(
    table: &TableDef,
    observed: &[ObservedConstraint],
    out: &mut SchemaPlan,
) -> StoreResult<()> {
    for constraint in table.constraints() {
        match constraint.status(observed) {
            ConstraintStatus::Present => {}
            ConstraintStatus::Missing => out.changes.push(SchemaChange {
                table: table.name,
                action: ChangeAction::AddConstraint,
                sql: format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} {}",
                    table.name,
                    constraint.name,
                    constraint.body()
                ),
                object: constraint.name,
            }),
            ConstraintStatus::Contradicted(found) => {
                return Err(StoreError::schema_conflict(
                    table.name,
                    format!(
                        "constraint '{}' is {}, declared {} as {}",
                        found.name,
                        found.definition,
                        constraint.name,
                        constraint.body()
                    ),
                ))
            }
        }
    }
    Ok(())
}

async fn load_catalog(conn: &mut PgConnection, tables: &[&str]) -> StoreResult<Catalog> {
    let observed: Vec<ObservedColumn> = sqlx::query_as(
        r#"
        SELECT table_name::text AS table_name,
               column_name::text AS column_name,
               data_type::text AS data_type,
               (is_nullable = 'YES') AS is_nullable,
               character_maximum_length::int4 AS char_max_len,
               numeric_precision::int4 AS numeric_precision,
               numeric_scale::int4 AS numeric_scale
        FROM information_schema.columns
        WHERE table_schema = current_schema()
          AND table_name::text = ANY($1)
        ORDER BY table_name, ordinal_position
        "#,
    )
    .bind(tables)
    .fetch_all(&mut *conn)
    .await?;

    let mut columns: HashMap<String, Vec<ObservedColumn>> = HashMap::new();
    for col in observed {
        columns.entry(col.table_name.clone()).or_default().push(col);
    }

    let rows: Vec<ConstraintRow> = sqlx::query_as(
        r#"
        SELECT t.relname::text AS table_name,
               c.conname::text AS name,
               c.contype::text AS kind,
               ARRAY(
                   SELECT a.attname::text
                   FROM unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord)
                   JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum
                   ORDER BY k.ord
               ) AS columns,
               rt.relname::text AS ref_table,
               ARRAY(
                   SELECT a.attname::text
                   FROM unnest(c.confkey) WITH ORDINALITY AS k(attnum, ord)
                   JOIN pg_attribute a ON a.attrelid = c.confrelid AND a.attnum = k.attnum
                   ORDER BY k.ord
               ) AS ref_columns,
               c.confdeltype::text AS on_delete,
               pg_get_constraintdef(c.oid) AS definition
        FROM pg_constraint c
        JOIN pg_class t ON t.oid = c.conrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        LEFT JOIN pg_class rt ON rt.oid = c.confrelid
        WHERE n.nspname = current_schema()
          AND c.contype IN ('p', 'u', 'f', 'c')
          AND t.relname::text = ANY($1)
        ORDER BY t.relname, c.conname
        "#,
    )
    .bind(tables)
    .fetch_all(&mut *conn)
    .await?;

    let mut constraints: HashMap<String, Vec<ObservedConstraint>> = HashMap::new();
    for row in rows {
        let table = row.table_name.clone();
        if let Some(observed) = ObservedConstraint::from_row(row) {
            constraints.entry(table).or_default().push(observed);
        }
    }

    let indexes: Vec<String> =
        sqlx::query_scalar("SELECT indexname::text FROM pg_indexes WHERE schemaname = current_schema()")
            .fetch_all(&mut *conn)
            .await?;

    let recorded_version = if columns.contains_key("schema_migrations") {
        sqlx::query_scalar::<_, Option<i32>>("SELECT MAX(version) FROM schema_migrations")
            .fetch_one(&mut *conn)
            .await?
    } else {
        None
    };

    Ok(Catalog {
        columns,
        constraints,
        indexes: indexes.into_iter().collect(),
        recorded_version,
    })
}

async fn current_plan(conn: &mut PgConnection) -> StoreResult<SchemaPlan> {
    let tables = registry();
    let names: Vec<&str> = tables.iter().map(|t| t.name).collect();
    let catalog = load_catalog(conn, &names).await?;
    let plan = plan(tables, &catalog)?;

    for column in &plan.undeclared_columns {
        warn!(column = %column, "column not declared in schema registry; leaving it in place");
    }

    Ok(plan)
}

/// Report what [`ensure_schema`] would do without changing anything.
#[instrument(skip(pool), err)]
pub async fn verify_schema(pool: &PgPool) -> StoreResult<SchemaPlan> {
    let mut conn = pool.acquire().await?;
    current_plan(&mut conn).await
}

/// Create or extend every declared table and record [`SCHEMA_VERSION`].
///
/// Returns the plan that was applied. A second call against the same
/// database returns a plan with no changes.
///
/// # Errors
///
/// [`StoreError::SchemaConflict`] when an existing column disagrees with
/// its declaration, when existing rows violate a constraint being added,
/// or when the database records a newer schema version. Nothing is
/// applied in that case.
#[instrument(skip(pool), err)]
pub async fn ensure_schema(pool: &PgPool) -> StoreResult<SchemaPlan> {
    info!("Ensuring database schema...");

    let applied = with_transaction(pool, |conn| {
        Box::pin(async move {
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(MIGRATION_LOCK_KEY)
                .execute(&mut *conn)
                .await?;

            let plan = current_plan(&mut *conn).await?;

            for change in &plan.changes {
                sqlx::query(&change.sql)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| ddl_error(change, e))?;
                info!(change = %change, "schema change applied");
            }

            if plan.needs_version_record() {
                sqlx::query(
                    "INSERT INTO schema_migrations (version, description) VALUES ($1, $2) \
                     ON CONFLICT (version) DO NOTHING",
                )
                .bind(SCHEMA_VERSION)
                .bind(SCHEMA_DESCRIPTION)
                .execute(&mut *conn)
                .await?;
            }

            Ok(plan)
        })
    })
    .await?;

    if applied.is_current() {
        info!(version = SCHEMA_VERSION, "Schema already up to date");
    } else {
        info!(
            version = SCHEMA_VERSION,
            changes = applied.changes.len(),
            "Schema ensured"
        );
    }

    Ok(applied)
}

/// A statement the database refuses means the stored schema or its rows
/// disagree with the registry. Lock waits and serialization failures keep
/// their own kinds so callers can retry.
fn ddl_error(change: &SchemaChange, err: sqlx::Error) -> StoreError {
    match sqlstate(&err) {
        None | Some(SqlState::Timeout | SqlState::SerializationFailure) => StoreError::from(err),
        Some(state) => {
            let reason = match state {
                SqlState::UniqueViolation | SqlState::ForeignKeyViolation | SqlState::InvalidData => {
                    "existing rows violate it"
                }
                _ => "the database refused it",
            };
            let detail = match &err {
                sqlx::Error::Database(db_err) => db_err.message().to_owned(),
                other => other.to_string(),
            };
            StoreError::schema_conflict(
                change.table,
                format!("cannot {}: {} ({})", change, reason, detail),
            )
        }
    }
}
