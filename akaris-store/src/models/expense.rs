//! Farm expenses

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::harvest::amount;
use super::validation::{bounded_text, optional_text};
use super::{ExpenseId, FarmId, ValidationError};

const MAX_CATEGORY_LEN: usize = 50;
const MAX_DESCRIPTION_LEN: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Expense {
    pub id: ExpenseId,
    pub farm_id: FarmId,
    pub category: String,
    pub description: Option<String>,
    pub amount: f64,
    pub spent_on: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub farm_id: FarmId,
    pub category: String,
    pub description: Option<String>,
    pub amount: f64,
    pub spent_on: NaiveDate,
}

impl NewExpense {
    pub fn new(
        farm_id: FarmId,
        category: &str,
        description: Option<&str>,
        amount_spent: f64,
        spent_on: NaiveDate,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            farm_id,
            category: bounded_text("category", category, MAX_CATEGORY_LEN)?,
            description: optional_text("description", description, MAX_DESCRIPTION_LEN)?,
            amount: amount("amount", amount_spent, false)?,
            spent_on,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExpensePatch {
    pub(crate) category: Option<String>,
    pub(crate) description: Option<Option<String>>,
    pub(crate) amount: Option<f64>,
    pub(crate) spent_on: Option<NaiveDate>,
}

impl ExpensePatch {
    pub fn category(mut self, v: &str) -> Result<Self, ValidationError> {
        self.category = Some(bounded_text("category", v, MAX_CATEGORY_LEN)?);
        Ok(self)
    }

    pub fn description(mut self, v: Option<&str>) -> Result<Self, ValidationError> {
        self.description = Some(optional_text("description", v, MAX_DESCRIPTION_LEN)?);
        Ok(self)
    }

    pub fn amount(mut self, v: f64) -> Result<Self, ValidationError> {
        self.amount = Some(amount("amount", v, false)?);
        Ok(self)
    }

    pub fn spent_on(mut self, date: NaiveDate) -> Self {
        self.spent_on = Some(date);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.description.is_none()
            && self.amount.is_none()
            && self.spent_on.is_none()
    }
}
