//! Planting methods referenced by crops

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use super::validation::optional_text;
use super::{decode_label, PlantMethodId, UserId, ValidationError};

const MAX_DESCRIPTION_LEN: usize = 100;

text_enum!(
    /// How a crop was established
    MethodKind, "planting method" {
        Transplant => "transplant",
        DirectSowing => "direct sowing",
        Cutting => "cutting",
        Grafting => "grafting",
        Other => "other",
    }
);

text_enum!(
    /// Lifecycle of reference records
    RecordStatus, "record status" {
        Active => "active",
        Inactive => "inactive",
        Deleted => "deleted",
    }
);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantMethod {
    pub id: PlantMethodId,
    pub kind: MethodKind,
    pub description: Option<String>,
    /// `None` for built-in methods or once the creator is deleted
    pub created_by: Option<UserId>,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl<'r> FromRow<'r, PgRow> for PlantMethod {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            kind: decode_label(row.try_get("kind")?)?,
            description: row.try_get("description")?,
            created_by: row.try_get("created_by")?,
            status: decode_label(row.try_get("status")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewPlantMethod {
    pub kind: MethodKind,
    pub description: Option<String>,
    pub created_by: Option<UserId>,
}

impl NewPlantMethod {
    /// `Other` methods must say what they are.
    pub fn new(
        kind: MethodKind,
        description: Option<&str>,
        created_by: Option<UserId>,
    ) -> Result<Self, ValidationError> {
        let description = optional_text("method description", description, MAX_DESCRIPTION_LEN)?;

        if kind == MethodKind::Other && description.is_none() {
            return Err(ValidationError::Missing {
                field: "method description",
                reason: "when the method is 'other'",
            });
        }

        Ok(Self {
            kind,
            description,
            created_by,
        })
    }
}

/// Partial update. Clearing the description of an `other` method is
/// rejected by the table's check constraint.
#[derive(Debug, Clone, Default)]
pub struct PlantMethodPatch {
    pub(crate) description: Option<Option<String>>,
    pub(crate) status: Option<RecordStatus>,
}

impl PlantMethodPatch {
    pub fn description(mut self, v: Option<&str>) -> Result<Self, ValidationError> {
        self.description = Some(optional_text("method description", v, MAX_DESCRIPTION_LEN)?);
        Ok(self)
    }

    pub fn status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.status.is_none()
    }
}
