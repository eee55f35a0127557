//! Harvest records per crop

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use super::validation::{non_negative, positive};
use super::{decode_label, round_to_scale, CropId, FarmId, HarvestId, ValidationError};

/// NUMERIC(14,4) upper bound
const MAX_AMOUNT: f64 = 9_999_999_999.9999;

text_enum!(
    HarvestUnit, "harvest unit" {
        Kg => "kg",
        Unit => "unit",
    }
);

text_enum!(
    /// Average grade of a harvest
    HarvestQuality, "harvest quality" {
        Excellent => "excellent",
        Good => "good",
        Fair => "fair",
        Poor => "poor",
    }
);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Harvest {
    pub id: HarvestId,
    pub crop_id: CropId,
    /// Copied from the crop at insert time
    pub farm_id: FarmId,
    pub quantity: f64,
    pub unit: HarvestUnit,
    /// Weight estimate for harvests counted in units
    pub estimated_kg: Option<f64>,
    pub quality: HarvestQuality,
    pub earnings: f64,
    pub harvested_on: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl<'r> FromRow<'r, PgRow> for Harvest {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            crop_id: row.try_get("crop_id")?,
            farm_id: row.try_get("farm_id")?,
            quantity: row.try_get("quantity")?,
            unit: decode_label(row.try_get("unit")?)?,
            estimated_kg: row.try_get("estimated_kg")?,
            quality: decode_label(row.try_get("quality")?)?,
            earnings: row.try_get("earnings")?,
            harvested_on: row.try_get("harvested_on")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

pub(crate) fn amount(field: &'static str, v: f64, strictly_positive: bool) -> Result<f64, ValidationError> {
    let checked = if strictly_positive {
        positive(field, v)?
    } else {
        non_negative(field, v)?
    };
    let rounded = round_to_scale(checked, 4);
    if rounded > MAX_AMOUNT {
        return Err(ValidationError::OutOfRange {
            field,
            reason: format!("must not exceed {}", MAX_AMOUNT),
        });
    }
    if strictly_positive {
        positive(field, rounded)
    } else {
        Ok(rounded)
    }
}

fn unit_weight(unit: HarvestUnit, estimated_kg: Option<f64>) -> Result<Option<f64>, ValidationError> {
    let estimated_kg = estimated_kg
        .map(|kg| amount("estimated kg", kg, true))
        .transpose()?;

    if unit == HarvestUnit::Unit && estimated_kg.is_none() {
        return Err(ValidationError::Missing {
            field: "estimated kg",
            reason: "when the harvest is counted in units",
        });
    }

    Ok(estimated_kg)
}

#[derive(Debug, Clone)]
pub struct NewHarvest {
    pub crop_id: CropId,
    pub quantity: f64,
    pub unit: HarvestUnit,
    pub estimated_kg: Option<f64>,
    pub quality: HarvestQuality,
    pub earnings: f64,
    pub harvested_on: NaiveDate,
}

impl NewHarvest {
    pub fn new(
        crop_id: CropId,
        quantity: f64,
        unit: HarvestUnit,
        estimated_kg: Option<f64>,
        quality: HarvestQuality,
        earnings: f64,
        harvested_on: NaiveDate,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            crop_id,
            quantity: amount("quantity", quantity, true)?,
            estimated_kg: unit_weight(unit, estimated_kg)?,
            unit,
            quality,
            earnings: amount("earnings", earnings, false)?,
            harvested_on,
        })
    }
}

/// Partial harvest update. Crop, farm and date are fixed once recorded.
#[derive(Debug, Clone, Default)]
pub struct HarvestPatch {
    pub(crate) quantity: Option<f64>,
    pub(crate) unit: Option<(HarvestUnit, Option<f64>)>,
    pub(crate) quality: Option<HarvestQuality>,
    pub(crate) earnings: Option<f64>,
}

impl HarvestPatch {
    pub fn quantity(mut self, v: f64) -> Result<Self, ValidationError> {
        self.quantity = Some(amount("quantity", v, true)?);
        Ok(self)
    }

    /// Unit and weight estimate change together.
    pub fn unit(mut self, unit: HarvestUnit, estimated_kg: Option<f64>) -> Result<Self, ValidationError> {
        self.unit = Some((unit, unit_weight(unit, estimated_kg)?));
        Ok(self)
    }

    pub fn quality(mut self, quality: HarvestQuality) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn earnings(mut self, v: f64) -> Result<Self, ValidationError> {
        self.earnings = Some(amount("earnings", v, false)?);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.quantity.is_none()
            && self.unit.is_none()
            && self.quality.is_none()
            && self.earnings.is_none()
    }
}
