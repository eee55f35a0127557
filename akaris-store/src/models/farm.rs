//! Farms owned by users

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use super::validation::{bounded_text, positive};
use super::{decode_label, round_to_scale, FarmId, UserId, ValidationError};

const MAX_NAME_LEN: usize = 50;
const MAX_CROP_TYPE_LEN: usize = 50;
const MAX_LOCATION_LEN: usize = 255;
/// NUMERIC(10,2) upper bound
const MAX_SIZE: f64 = 99_999_999.99;

text_enum!(
    /// Operating state of a farm
    FarmStatus, "farm status" {
        Active => "active",
        Inactive => "inactive",
        Terminated => "terminated",
    }
);

/// Stored farm row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Farm {
    pub id: FarmId,
    pub owner_id: UserId,
    /// Short name, unique per owner
    pub name: String,
    pub crop_type: String,
    /// Planted area in acres, two decimals
    pub size: f64,
    pub location: String,
    pub status: FarmStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl<'r> FromRow<'r, PgRow> for Farm {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            name: row.try_get("name")?,
            crop_type: row.try_get("crop_type")?,
            size: row.try_get("size")?,
            location: row.try_get("location")?,
            status: decode_label(row.try_get("status")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

fn farm_size(v: f64) -> Result<f64, ValidationError> {
    let size = round_to_scale(positive("farm size", v)?, 2);
    if size > MAX_SIZE {
        return Err(ValidationError::OutOfRange {
            field: "farm size",
            reason: format!("must not exceed {}", MAX_SIZE),
        });
    }
    // 0.004 rounds to zero at two decimals
    positive("farm size", size)
}

/// Validated input for creating a farm
#[derive(Debug, Clone)]
pub struct NewFarm {
    pub owner_id: UserId,
    pub name: String,
    pub crop_type: String,
    pub size: f64,
    pub location: String,
}

impl NewFarm {
    pub fn new(
        owner_id: UserId,
        name: &str,
        crop_type: &str,
        size: f64,
        location: &str,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            owner_id,
            name: bounded_text("farm name", name, MAX_NAME_LEN)?,
            crop_type: bounded_text("crop type", crop_type, MAX_CROP_TYPE_LEN)?,
            size: farm_size(size)?,
            location: bounded_text("location", location, MAX_LOCATION_LEN)?,
        })
    }
}

/// Partial farm update. Ownership is not transferable through a patch.
#[derive(Debug, Clone, Default)]
pub struct FarmPatch {
    pub(crate) name: Option<String>,
    pub(crate) crop_type: Option<String>,
    pub(crate) size: Option<f64>,
    pub(crate) location: Option<String>,
    pub(crate) status: Option<FarmStatus>,
}

impl FarmPatch {
    pub fn name(mut self, v: &str) -> Result<Self, ValidationError> {
        self.name = Some(bounded_text("farm name", v, MAX_NAME_LEN)?);
        Ok(self)
    }

    pub fn crop_type(mut self, v: &str) -> Result<Self, ValidationError> {
        self.crop_type = Some(bounded_text("crop type", v, MAX_CROP_TYPE_LEN)?);
        Ok(self)
    }

    pub fn size(mut self, v: f64) -> Result<Self, ValidationError> {
        self.size = Some(farm_size(v)?);
        Ok(self)
    }

    pub fn location(mut self, v: &str) -> Result<Self, ValidationError> {
        self.location = Some(bounded_text("location", v, MAX_LOCATION_LEN)?);
        Ok(self)
    }

    pub fn status(mut self, status: FarmStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.crop_type.is_none()
            && self.size.is_none()
            && self.location.is_none()
            && self.status.is_none()
    }
}
