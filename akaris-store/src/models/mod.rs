//! Domain models with validation at construction
//!
//! All user input is validated when creating these types.
//! Invalid input returns ValidationError, not panic.

/// Closed set of lowercase labels persisted as TEXT with a CHECK constraint.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $field:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err($crate::models::ValidationError::InvalidVariant {
                        field: $field,
                        value: s.to_owned(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $crate::models::Labels for $name {
            fn labels() -> Vec<&'static str> {
                Self::ALL.iter().map(|v| v.as_str()).collect()
            }
        }
    };
}

pub mod validation;
pub mod ids;
pub mod pagination;
pub mod user;
pub mod farm;
pub mod plant_method;
pub mod crop;
pub mod harvest;
pub mod expense;
pub mod expectation;
pub mod daily;
pub mod activity;

pub use validation::ValidationError;
pub use ids::{
    ActivityId, CropId, DailyRecordId, ExpectationId, ExpenseId, FarmId, HarvestId, LoginId,
    PlantMethodId, UserId,
};
pub use pagination::{Paginated, Pagination};
pub use user::{Email, Login, NewUser, PhoneNumber, User, UserPatch, UserRole, UserStatus};
pub use farm::{Farm, FarmPatch, FarmStatus, NewFarm};
pub use plant_method::{MethodKind, NewPlantMethod, PlantMethod, PlantMethodPatch, RecordStatus};
pub use crop::{Crop, CropPatch, CropStatus, GrowthStage, NewCrop, NfcCode};
pub use harvest::{Harvest, HarvestPatch, HarvestQuality, HarvestUnit, NewHarvest};
pub use expense::{Expense, ExpensePatch, NewExpense};
pub use expectation::{ExpectationStatus, FarmExpectation, NewFarmExpectation};
pub use daily::{CropDaily, CropDailyPatch, DailyStatus, NewCropDaily};
pub use activity::{ActivityKind, CropActivity, CropActivityPatch, NewCropActivity};

/// Persisted label set of a [`text_enum!`] type, used to build CHECK constraints.
pub trait Labels {
    fn labels() -> Vec<&'static str>;
}

/// Round to the scale of the NUMERIC column the value is stored in.
pub(crate) fn round_to_scale(value: f64, scale: i32) -> f64 {
    let factor = 10f64.powi(scale);
    (value * factor).round() / factor
}

/// Decode a TEXT column into one of the label enums.
pub(crate) fn decode_label<T>(value: String) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr<Err = ValidationError>,
{
    value
        .parse::<T>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
