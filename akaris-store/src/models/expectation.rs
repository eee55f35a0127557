//! Expected yield and income per farm
//!
//! Expectations are history: the figures of a recorded expectation never
//! change. A newer expectation supersedes an older one, and a mistaken one
//! is retracted through its status.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use super::harvest::amount;
use super::{decode_label, ExpectationId, FarmId, ValidationError};

text_enum!(
    ExpectationStatus, "expectation status" {
        Active => "active",
        Retracted => "retracted",
    }
);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FarmExpectation {
    pub id: ExpectationId,
    pub farm_id: FarmId,
    pub expected_harvest_on: NaiveDate,
    pub expected_quantity_kg: f64,
    pub expected_income: f64,
    pub status: ExpectationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl<'r> FromRow<'r, PgRow> for FarmExpectation {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            farm_id: row.try_get("farm_id")?,
            expected_harvest_on: row.try_get("expected_harvest_on")?,
            expected_quantity_kg: row.try_get("expected_quantity_kg")?,
            expected_income: row.try_get("expected_income")?,
            status: decode_label(row.try_get("status")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewFarmExpectation {
    pub farm_id: FarmId,
    pub expected_harvest_on: NaiveDate,
    pub expected_quantity_kg: f64,
    pub expected_income: f64,
}

impl NewFarmExpectation {
    pub fn new(
        farm_id: FarmId,
        expected_harvest_on: NaiveDate,
        expected_quantity_kg: f64,
        expected_income: f64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            farm_id,
            expected_harvest_on,
            expected_quantity_kg: amount("expected quantity", expected_quantity_kg, true)?,
            expected_income: amount("expected income", expected_income, false)?,
        })
    }
}
