//! Field work logged against a farm or one of its crops

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use super::validation::optional_text;
use super::{decode_label, ActivityId, CropId, FarmId, RecordStatus, UserId, ValidationError};

const MAX_OTHER_LEN: usize = 50;
const MAX_DETAILS_LEN: usize = 2000;

text_enum!(
    ActivityKind, "activity" {
        Watering => "watering",
        Fertilizing => "fertilizing",
        Pesticiding => "pesticiding",
        Weeding => "weeding",
        Transplanting => "transplanting",
        DiseaseTreatment => "disease treatment",
        PestInspection => "pest inspection",
        Other => "other",
    }
);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CropActivity {
    pub id: ActivityId,
    pub farm_id: FarmId,
    /// `None` for farm-wide work
    pub crop_id: Option<CropId>,
    pub kind: ActivityKind,
    /// What the work was, for `ActivityKind::Other`
    pub other_activity: Option<String>,
    pub details: Option<String>,
    pub performed_by: UserId,
    pub performed_on: NaiveDate,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl<'r> FromRow<'r, PgRow> for CropActivity {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            farm_id: row.try_get("farm_id")?,
            crop_id: row.try_get("crop_id")?,
            kind: decode_label(row.try_get("kind")?)?,
            other_activity: row.try_get("other_activity")?,
            details: row.try_get("details")?,
            performed_by: row.try_get("performed_by")?,
            performed_on: row.try_get("performed_on")?,
            status: decode_label(row.try_get("status")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

fn described(kind: ActivityKind, other: Option<&str>) -> Result<Option<String>, ValidationError> {
    let other = optional_text("other activity", other, MAX_OTHER_LEN)?;
    if kind == ActivityKind::Other && other.is_none() {
        return Err(ValidationError::Missing {
            field: "other activity",
            reason: "when the activity is 'other'",
        });
    }
    Ok(other)
}

#[derive(Debug, Clone)]
pub struct NewCropActivity {
    pub farm_id: FarmId,
    pub crop_id: Option<CropId>,
    pub kind: ActivityKind,
    pub other_activity: Option<String>,
    pub details: Option<String>,
    pub performed_by: UserId,
    pub performed_on: NaiveDate,
}

impl NewCropActivity {
    pub fn new(
        farm_id: FarmId,
        crop_id: Option<CropId>,
        kind: ActivityKind,
        other_activity: Option<&str>,
        details: Option<&str>,
        performed_by: UserId,
        performed_on: NaiveDate,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            farm_id,
            crop_id,
            kind,
            other_activity: described(kind, other_activity)?,
            details: optional_text("activity details", details, MAX_DETAILS_LEN)?,
            performed_by,
            performed_on,
        })
    }
}

/// Partial activity update. Farm, crop and author are fixed.
#[derive(Debug, Clone, Default)]
pub struct CropActivityPatch {
    pub(crate) kind: Option<(ActivityKind, Option<String>)>,
    pub(crate) details: Option<Option<String>>,
    pub(crate) performed_on: Option<NaiveDate>,
    pub(crate) status: Option<RecordStatus>,
}

impl CropActivityPatch {
    /// Kind and its free-text label change together.
    pub fn kind(mut self, kind: ActivityKind, other: Option<&str>) -> Result<Self, ValidationError> {
        self.kind = Some((kind, described(kind, other)?));
        Ok(self)
    }

    pub fn details(mut self, v: Option<&str>) -> Result<Self, ValidationError> {
        self.details = Some(optional_text("activity details", v, MAX_DETAILS_LEN)?);
        Ok(self)
    }

    pub fn performed_on(mut self, date: NaiveDate) -> Self {
        self.performed_on = Some(date);
        self
    }

    pub fn status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.details.is_none()
            && self.performed_on.is_none()
            && self.status.is_none()
    }
}
