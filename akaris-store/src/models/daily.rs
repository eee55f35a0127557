//! Daily crop observations, recorded by scanning the crop's NFC tag

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use super::{decode_label, CropId, DailyRecordId, GrowthStage, NfcCode, ValidationError};

/// Longest stage duration accepted, in days
const MAX_STAGE_DAYS: i32 = 3650;

text_enum!(
    DailyStatus, "daily record status" {
        Active => "active",
        Retracted => "retracted",
    }
);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CropDaily {
    pub id: DailyRecordId,
    pub crop_id: CropId,
    /// Tag the record was scanned from, copied from the crop
    pub nfc_code: String,
    pub stage: GrowthStage,
    /// Days the crop has spent in `stage`, when the farmer knows it
    pub stage_duration_days: Option<i32>,
    pub status: DailyStatus,
    pub recorded_on: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl<'r> FromRow<'r, PgRow> for CropDaily {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            crop_id: row.try_get("crop_id")?,
            nfc_code: row.try_get("nfc_code")?,
            stage: decode_label(row.try_get("stage")?)?,
            stage_duration_days: row.try_get("stage_duration_days")?,
            status: decode_label(row.try_get("status")?)?,
            recorded_on: row.try_get("recorded_on")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

fn stage_days(days: i32) -> Result<i32, ValidationError> {
    if !(0..=MAX_STAGE_DAYS).contains(&days) {
        return Err(ValidationError::OutOfRange {
            field: "stage duration",
            reason: format!("must be between 0 and {} days (got {})", MAX_STAGE_DAYS, days),
        });
    }
    Ok(days)
}

#[derive(Debug, Clone)]
pub struct NewCropDaily {
    pub nfc_code: NfcCode,
    pub stage: GrowthStage,
    pub stage_duration_days: Option<i32>,
    pub recorded_on: NaiveDate,
}

impl NewCropDaily {
    pub fn new(
        nfc_code: &str,
        stage: GrowthStage,
        stage_duration_days: Option<i32>,
        recorded_on: NaiveDate,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            nfc_code: NfcCode::new(nfc_code)?,
            stage,
            stage_duration_days: stage_duration_days.map(stage_days).transpose()?,
            recorded_on,
        })
    }
}

/// Partial daily record update. The crop and day are fixed once recorded.
#[derive(Debug, Clone, Default)]
pub struct CropDailyPatch {
    pub(crate) stage: Option<GrowthStage>,
    pub(crate) stage_duration_days: Option<Option<i32>>,
    pub(crate) status: Option<DailyStatus>,
}

impl CropDailyPatch {
    pub fn stage(mut self, stage: GrowthStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn stage_duration_days(mut self, days: Option<i32>) -> Result<Self, ValidationError> {
        self.stage_duration_days = Some(days.map(stage_days).transpose()?);
        Ok(self)
    }

    pub fn status(mut self, status: DailyStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether applying the patch can change which stage the crop is in.
    pub(crate) fn moves_stage(&self) -> bool {
        self.stage.is_some() || self.status.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.stage.is_none() && self.stage_duration_days.is_none() && self.status.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 3).unwrap()
    }

    #[test]
    fn nfc_code_and_duration_checked() {
        assert!(NewCropDaily::new("DRN-01", GrowthStage::Growing, Some(12), day()).is_ok());
        assert!(NewCropDaily::new("-bad", GrowthStage::Growing, None, day()).is_err());

        let err = NewCropDaily::new("DRN-01", GrowthStage::Growing, Some(-1), day()).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { field: "stage duration", .. }));
    }

    #[test]
    fn duration_only_patch_keeps_stage() {
        let patch = CropDailyPatch::default().stage_duration_days(None).unwrap();
        assert!(!patch.is_empty());
        assert!(!patch.moves_stage());
        assert!(CropDailyPatch::default().status(DailyStatus::Retracted).moves_stage());
    }
}
