//! Crops: individually NFC-tagged plantings on a farm

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use super::validation::{bounded_text, optional_text};
use super::{decode_label, round_to_scale, CropId, FarmId, PlantMethodId, ValidationError};

const MAX_NFC_LEN: usize = 30;
const MAX_CROP_TYPE_LEN: usize = 30;
const MAX_SUBTYPE_LEN: usize = 50;

static NFC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("invalid nfc regex"));

text_enum!(
    /// Growth stage as last observed
    GrowthStage, "growth stage" {
        Sprouting => "sprouting",
        Growing => "growing",
        Flowering => "flowering",
        Fruiting => "fruiting",
        Harvest => "harvest",
        PostHarvest => "post-harvest",
    }
);

text_enum!(
    CropStatus, "crop status" {
        Active => "active",
        Inactive => "inactive",
        Terminated => "terminated",
    }
);

/// Code printed on the crop's NFC tag; unique across all farms
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NfcCode(String);

impl NfcCode {
    /// # Example
    /// ```
    /// use akaris_store::models::NfcCode;
    ///
    /// assert!(NfcCode::new("DRN-0042").is_ok());
    /// assert!(NfcCode::new("-DRN").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let value = bounded_text("nfc code", s, MAX_NFC_LEN)?;

        if !NFC_RE.is_match(&value) {
            return Err(ValidationError::InvalidFormat {
                field: "nfc code",
                reason: "must be alphanumeric with dashes/underscores, starting with alphanumeric",
            });
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Crop {
    pub id: CropId,
    pub farm_id: FarmId,
    pub method_id: PlantMethodId,
    pub nfc_code: String,
    pub crop_type: String,
    pub crop_subtype: Option<String>,
    pub stage: Option<GrowthStage>,
    pub status: CropStatus,
    pub planted_on: NaiveDate,
    pub last_harvest_on: Option<NaiveDate>,
    /// Latest field observation; only ever moves forward
    pub observed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Crop {
    /// Age in years at `today`, counting whole months (two decimals).
    ///
    /// ```
    /// # use chrono::NaiveDate;
    /// # let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
    /// assert_eq!(akaris_store::models::crop::age_in_years(d(2020, 1, 15), d(2021, 7, 15)), 1.5);
    /// ```
    pub fn age_years(&self, today: NaiveDate) -> f64 {
        age_in_years(self.planted_on, today)
    }
}

pub fn age_in_years(planted_on: NaiveDate, today: NaiveDate) -> f64 {
    let mut months = (today.year() - planted_on.year()) * 12 + today.month() as i32
        - planted_on.month() as i32;
    if today.day() < planted_on.day() {
        months -= 1;
    }
    round_to_scale(months.max(0) as f64 / 12.0, 2)
}

impl<'r> FromRow<'r, PgRow> for Crop {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let stage: Option<String> = row.try_get("stage")?;
        Ok(Self {
            id: row.try_get("id")?,
            farm_id: row.try_get("farm_id")?,
            method_id: row.try_get("method_id")?,
            nfc_code: row.try_get("nfc_code")?,
            crop_type: row.try_get("crop_type")?,
            crop_subtype: row.try_get("crop_subtype")?,
            stage: stage.map(decode_label::<GrowthStage>).transpose()?,
            status: decode_label(row.try_get("status")?)?,
            planted_on: row.try_get("planted_on")?,
            last_harvest_on: row.try_get("last_harvest_on")?,
            observed_at: row.try_get("observed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

fn harvest_not_before_planting(
    planted_on: NaiveDate,
    last_harvest_on: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    match last_harvest_on {
        Some(h) if h < planted_on => Err(ValidationError::OutOfRange {
            field: "last harvest date",
            reason: format!("{} is before planting date {}", h, planted_on),
        }),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct NewCrop {
    pub farm_id: FarmId,
    pub method_id: PlantMethodId,
    pub nfc_code: NfcCode,
    pub crop_type: String,
    pub crop_subtype: Option<String>,
    pub stage: Option<GrowthStage>,
    pub planted_on: NaiveDate,
    pub last_harvest_on: Option<NaiveDate>,
}

impl NewCrop {
    pub fn new(
        farm_id: FarmId,
        method_id: PlantMethodId,
        nfc_code: &str,
        crop_type: &str,
        planted_on: NaiveDate,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            farm_id,
            method_id,
            nfc_code: NfcCode::new(nfc_code)?,
            crop_type: bounded_text("crop type", crop_type, MAX_CROP_TYPE_LEN)?,
            crop_subtype: None,
            stage: None,
            planted_on,
            last_harvest_on: None,
        })
    }

    pub fn with_subtype(mut self, subtype: &str) -> Result<Self, ValidationError> {
        self.crop_subtype = optional_text("crop subtype", Some(subtype), MAX_SUBTYPE_LEN)?;
        Ok(self)
    }

    pub fn with_stage(mut self, stage: GrowthStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_last_harvest(mut self, date: NaiveDate) -> Result<Self, ValidationError> {
        harvest_not_before_planting(self.planted_on, Some(date))?;
        self.last_harvest_on = Some(date);
        Ok(self)
    }
}

/// Partial crop update. The farm and NFC code of a crop never change.
///
/// Date ordering across stored and patched values is enforced by the
/// table's check constraint.
#[derive(Debug, Clone, Default)]
pub struct CropPatch {
    pub(crate) method_id: Option<PlantMethodId>,
    pub(crate) crop_subtype: Option<Option<String>>,
    pub(crate) stage: Option<GrowthStage>,
    pub(crate) status: Option<CropStatus>,
    pub(crate) planted_on: Option<NaiveDate>,
    pub(crate) last_harvest_on: Option<NaiveDate>,
    pub(crate) observed_at: Option<DateTime<Utc>>,
}

impl CropPatch {
    pub fn method(mut self, id: PlantMethodId) -> Self {
        self.method_id = Some(id);
        self
    }

    pub fn subtype(mut self, v: Option<&str>) -> Result<Self, ValidationError> {
        self.crop_subtype = Some(optional_text("crop subtype", v, MAX_SUBTYPE_LEN)?);
        Ok(self)
    }

    pub fn stage(mut self, stage: GrowthStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn status(mut self, status: CropStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn planted_on(mut self, date: NaiveDate) -> Result<Self, ValidationError> {
        harvest_not_before_planting(date, self.last_harvest_on)?;
        self.planted_on = Some(date);
        Ok(self)
    }

    /// Dates earlier than the stored one leave it unchanged.
    pub fn last_harvest_on(mut self, date: NaiveDate) -> Result<Self, ValidationError> {
        if let Some(planted) = self.planted_on {
            harvest_not_before_planting(planted, Some(date))?;
        }
        self.last_harvest_on = Some(date);
        Ok(self)
    }

    /// Record a field observation. Older timestamps than the stored one are
    /// ignored rather than rewinding history.
    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = Some(at);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.method_id.is_none()
            && self.crop_subtype.is_none()
            && self.stage.is_none()
            && self.status.is_none()
            && self.planted_on.is_none()
            && self.last_harvest_on.is_none()
            && self.observed_at.is_none()
    }
}
