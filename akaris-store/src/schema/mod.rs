//! Schema registry
//!
//! Every persisted table is declared here as data: columns, types,
//! nullability, uniqueness, checks and foreign keys. The declarations drive
//! both DDL generation and verification of an existing database, so the
//! two can never drift apart.
//!
//! Constraint and index names are deterministic (`pk_<table>`,
//! `fk_<table>_<column>`, `uq_<table>_<columns>`, `ck_<table>_<name>`,
//! `idx_<table>_<columns>`, and `uix_<table>_<columns>` for partial unique
//! indexes) which lets [`migrate`] detect what is missing.

pub mod migrate;
pub mod tables;

use std::fmt;

pub use migrate::{ensure_schema, verify_schema, SchemaChange, SchemaPlan, SCHEMA_VERSION};
pub use tables::registry;

/// Column type as declared and as reported by `information_schema.columns`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    Text,
    Varchar(i32),
    Integer,
    BigInt,
    Numeric(i32, i32),
    Date,
    Timestamptz,
}

impl ColumnType {
    pub fn ddl(&self) -> String {
        match self {
            Self::Uuid => "UUID".into(),
            Self::Text => "TEXT".into(),
            Self::Varchar(n) => format!("VARCHAR({})", n),
            Self::Integer => "INTEGER".into(),
            Self::BigInt => "BIGINT".into(),
            Self::Numeric(p, s) => format!("NUMERIC({},{})", p, s),
            Self::Date => "DATE".into(),
            Self::Timestamptz => "TIMESTAMPTZ".into(),
        }
    }

    fn catalog_name(&self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::Text => "text",
            Self::Varchar(_) => "character varying",
            Self::Integer => "integer",
            Self::BigInt => "bigint",
            Self::Numeric(..) => "numeric",
            Self::Date => "date",
            Self::Timestamptz => "timestamp with time zone",
        }
    }

    /// Whether an observed catalog column has exactly this type.
    pub(crate) fn matches(&self, observed: &ObservedColumn) -> bool {
        if observed.data_type != self.catalog_name() {
            return false;
        }
        match self {
            Self::Varchar(n) => observed.char_max_len == Some(*n),
            Self::Numeric(p, s) => {
                observed.numeric_precision == Some(*p) && observed.numeric_scale == Some(*s)
            }
            _ => true,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ddl().to_lowercase())
    }
}

/// What happens to referencing rows when the referenced row is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    Restrict,
    SetNull,
    SetDefault,
    /// Postgres default when `ON DELETE` is omitted
    NoAction,
}

impl OnDelete {
    fn sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::NoAction => "NO ACTION",
        }
    }

    /// `pg_constraint.confdeltype` code.
    fn from_catalog(code: &str) -> Option<Self> {
        match code {
            "c" => Some(Self::Cascade),
            "r" => Some(Self::Restrict),
            "n" => Some(Self::SetNull),
            "d" => Some(Self::SetDefault),
            "a" => Some(Self::NoAction),
            _ => None,
        }
    }

    /// RESTRICT and NO ACTION both refuse the delete; they differ only for
    /// deferred checks, which this schema never declares.
    fn same_effect(self, other: Self) -> bool {
        let refuses = |d: Self| matches!(d, Self::Restrict | Self::NoAction);
        self == other || (refuses(self) && refuses(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<&'static str>,
    pub references: Option<ForeignKey>,
}

impl ColumnDef {
    /// NOT NULL column without default.
    pub fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            default: None,
            references: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    pub fn references(mut self, table: &'static str, column: &'static str, on_delete: OnDelete) -> Self {
        self.references = Some(ForeignKey {
            table,
            column,
            on_delete,
        });
        self
    }

    fn ddl(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.ty.ddl());
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }

    /// Can be added to a table that already holds rows.
    fn addable(&self) -> bool {
        self.nullable || self.default.is_some()
    }
}

/// What a table-level constraint enforces, independent of its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintShape {
    PrimaryKey(Vec<String>),
    Unique(Vec<String>),
    ForeignKey {
        columns: Vec<String>,
        table: String,
        references: Vec<String>,
        on_delete: OnDelete,
    },
    /// Boolean expression. Postgres rewrites check expressions when it
    /// stores them, so two checks are compared by kind only.
    Check(String),
}

impl ConstraintShape {
    /// Body after `CONSTRAINT <name>`.
    pub fn sql(&self) -> String {
        match self {
            Self::PrimaryKey(cols) => format!("PRIMARY KEY ({})", cols.join(", ")),
            Self::Unique(cols) => format!("UNIQUE ({})", cols.join(", ")),
            Self::ForeignKey {
                columns,
                table,
                references,
                on_delete,
            } => format!(
                "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                columns.join(", "),
                table,
                references.join(", "),
                on_delete.sql()
            ),
            Self::Check(expr) => format!("CHECK ({})", expr),
        }
    }

    /// Whether `other` enforces the same rule.
    pub fn agrees_with(&self, other: &ConstraintShape) -> bool {
        match (self, other) {
            (Self::PrimaryKey(a), Self::PrimaryKey(b)) | (Self::Unique(a), Self::Unique(b)) => {
                same_columns(a, b)
            }
            (
                Self::ForeignKey {
                    columns,
                    table,
                    references,
                    on_delete,
                },
                Self::ForeignKey {
                    columns: other_columns,
                    table: other_table,
                    references: other_references,
                    on_delete: other_on_delete,
                },
            ) => {
                columns == other_columns
                    && table == other_table
                    && references == other_references
                    && on_delete.same_effect(*other_on_delete)
            }
            (Self::Check(_), Self::Check(_)) => true,
            _ => false,
        }
    }

    /// Whether `other` covers the same columns and target, whatever its
    /// actions. Used to find an existing constraint under another name.
    fn same_target(&self, other: &ConstraintShape) -> bool {
        match (self, other) {
            (Self::PrimaryKey(_), Self::PrimaryKey(_)) => true,
            (Self::Unique(a), Self::Unique(b) | Self::PrimaryKey(b)) => same_columns(a, b),
            (
                Self::ForeignKey {
                    columns,
                    table,
                    references,
                    ..
                },
                Self::ForeignKey {
                    columns: other_columns,
                    table: other_table,
                    references: other_references,
                    ..
                },
            ) => columns == other_columns && table == other_table && references == other_references,
            _ => false,
        }
    }
}

fn owned(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

fn same_columns(a: &[String], b: &[String]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

/// Named table-level constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintDef {
    pub name: String,
    pub shape: ConstraintShape,
}

impl ConstraintDef {
    pub fn body(&self) -> String {
        self.shape.sql()
    }
}

/// Secondary index. A unique index with a predicate enforces uniqueness
/// over a subset of rows, which a table constraint cannot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub columns: Vec<&'static str>,
    pub unique: bool,
    pub predicate: Option<&'static str>,
}

impl IndexDef {
    fn name(&self, table: &str) -> String {
        let prefix = if self.unique { "uix" } else { "idx" };
        format!("{}_{}_{}", prefix, table, self.columns.join("_"))
    }
}

#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: &'static str,
    pub primary_key: Vec<&'static str>,
    pub columns: Vec<ColumnDef>,
    pub uniques: Vec<Vec<&'static str>>,
    /// (short name, boolean SQL expression)
    pub checks: Vec<(&'static str, String)>,
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            primary_key: Vec::new(),
            columns: Vec::new(),
            uniques: Vec::new(),
            checks: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn primary_key(mut self, columns: &[&'static str]) -> Self {
        self.primary_key = columns.to_vec();
        self
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn unique(mut self, columns: &[&'static str]) -> Self {
        self.uniques.push(columns.to_vec());
        self
    }

    pub fn check(mut self, name: &'static str, expr: impl Into<String>) -> Self {
        self.checks.push((name, expr.into()));
        self
    }

    pub fn index(mut self, columns: &[&'static str]) -> Self {
        self.indexes.push(IndexDef {
            columns: columns.to_vec(),
            unique: false,
            predicate: None,
        });
        self
    }

    /// Unique over the rows matching `predicate` only.
    pub fn unique_where(mut self, columns: &[&'static str], predicate: &'static str) -> Self {
        self.indexes.push(IndexDef {
            columns: columns.to_vec(),
            unique: true,
            predicate: Some(predicate),
        });
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// All named constraints in declaration order.
    pub fn constraints(&self) -> Vec<ConstraintDef> {
        let mut out = Vec::new();

        if !self.primary_key.is_empty() {
            out.push(ConstraintDef {
                name: format!("pk_{}", self.name),
                shape: ConstraintShape::PrimaryKey(owned(&self.primary_key)),
            });
        }

        for col in &self.columns {
            if let Some(fk) = col.references {
                out.push(ConstraintDef {
                    name: format!("fk_{}_{}", self.name, col.name),
                    shape: ConstraintShape::ForeignKey {
                        columns: vec![col.name.to_owned()],
                        table: fk.table.to_owned(),
                        references: vec![fk.column.to_owned()],
                        on_delete: fk.on_delete,
                    },
                });
            }
        }

        for cols in &self.uniques {
            out.push(ConstraintDef {
                name: format!("uq_{}_{}", self.name, cols.join("_")),
                shape: ConstraintShape::Unique(owned(cols)),
            });
        }

        for (name, expr) in &self.checks {
            out.push(ConstraintDef {
                name: format!("ck_{}_{}", self.name, name),
                shape: ConstraintShape::Check(expr.clone()),
            });
        }

        out
    }

    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(ColumnDef::ddl).collect();
        parts.extend(
            self.constraints()
                .into_iter()
                .map(|c| format!("CONSTRAINT {} {}", c.name, c.body())),
        );
        format!("CREATE TABLE {} (\n    {}\n)", self.name, parts.join(",\n    "))
    }

    /// (index name, CREATE INDEX statement)
    pub fn index_sql(&self) -> Vec<(String, String)> {
        self.indexes
            .iter()
            .map(|index| {
                let name = index.name(self.name);
                let mut sql = format!(
                    "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                    if index.unique { "UNIQUE " } else { "" },
                    name,
                    self.name,
                    index.columns.join(", ")
                );
                if let Some(predicate) = index.predicate {
                    sql.push_str(" WHERE ");
                    sql.push_str(predicate);
                }
                (name, sql)
            })
            .collect()
    }
}

/// Column as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ObservedColumn {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub char_max_len: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
}

impl ObservedColumn {
    fn describe(&self) -> String {
        match (self.data_type.as_str(), self.char_max_len, self.numeric_precision) {
            ("character varying", Some(n), _) => format!("varchar({})", n),
            ("numeric", _, Some(p)) => format!("numeric({},{})", p, self.numeric_scale.unwrap_or(0)),
            (ty, _, _) => ty.to_owned(),
        }
    }
}

/// Constraint row from `pg_constraint`, columns resolved to names
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ConstraintRow {
    pub table_name: String,
    pub name: String,
    /// `contype`: p, u, f or c
    pub kind: String,
    pub columns: Vec<String>,
    pub ref_table: Option<String>,
    pub ref_columns: Vec<String>,
    /// `confdeltype`; blank unless `kind` is f
    pub on_delete: String,
    /// `pg_get_constraintdef` output
    pub definition: String,
}

/// Constraint as it exists in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedConstraint {
    pub name: String,
    pub shape: ConstraintShape,
    pub definition: String,
}

impl ObservedConstraint {
    /// `None` for constraint kinds the registry never declares.
    pub fn from_row(row: ConstraintRow) -> Option<Self> {
        let shape = match row.kind.as_str() {
            "p" => ConstraintShape::PrimaryKey(row.columns),
            "u" => ConstraintShape::Unique(row.columns),
            "f" => ConstraintShape::ForeignKey {
                columns: row.columns,
                table: row.ref_table?,
                references: row.ref_columns,
                on_delete: OnDelete::from_catalog(&row.on_delete)?,
            },
            "c" => ConstraintShape::Check(row.definition.clone()),
            _ => return None,
        };
        Some(Self {
            name: row.name,
            shape,
            definition: row.definition,
        })
    }

    /// Declared constraint as Postgres would report it once applied.
    #[cfg(test)]
    pub(crate) fn from_declared(def: &ConstraintDef) -> Self {
        Self {
            name: def.name.clone(),
            shape: def.shape.clone(),
            definition: def.body(),
        }
    }
}

/// How an existing table stands against one declared constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConstraintStatus<'a> {
    /// Present under the declared name, or equivalent under another one
    Present,
    Missing,
    /// Present but enforcing something else
    Contradicted(&'a ObservedConstraint),
}

impl ConstraintDef {
    pub(crate) fn status<'a>(&self, observed: &'a [ObservedConstraint]) -> ConstraintStatus<'a> {
        if let Some(found) = observed.iter().find(|c| c.name == self.name) {
            return if self.shape.agrees_with(&found.shape) {
                ConstraintStatus::Present
            } else {
                ConstraintStatus::Contradicted(found)
            };
        }

        match observed.iter().find(|c| self.shape.same_target(&c.shape)) {
            Some(found) if self.shape.agrees_with(&found.shape) => ConstraintStatus::Present,
            // A unique rule already enforced by the primary key.
            Some(found) if matches!(found.shape, ConstraintShape::PrimaryKey(_))
                && matches!(self.shape, ConstraintShape::Unique(_)) =>
            {
                ConstraintStatus::Present
            }
            Some(found) => ConstraintStatus::Contradicted(found),
            None => ConstraintStatus::Missing,
        }
    }
}

/// `col IN ('a', 'b')` for a label set.
pub(crate) fn one_of(column: &str, labels: &[&str]) -> String {
    let quoted: Vec<String> = labels.iter().map(|l| format!("'{}'", l.replace('\'', "''"))).collect();
    format!("{} IN ({})", column, quoted.join(", "))
}
