//! Typed row identifiers
//!
//! Ids are assigned once at insert time and never rewritten.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Fresh random id for a row about to be inserted.
            pub(crate) fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

row_id!(
    /// Identifier of a registered user
    UserId
);
row_id!(
    /// Identifier of a login audit row
    LoginId
);
row_id!(
    /// Identifier of a farm
    FarmId
);
row_id!(
    /// Identifier of a planting method
    PlantMethodId
);
row_id!(
    /// Identifier of a crop (one tagged plant or bed)
    CropId
);
row_id!(
    /// Identifier of a harvest record
    HarvestId
);
row_id!(
    /// Identifier of an expense record
    ExpenseId
);
row_id!(
    /// Identifier of a farm's expected-yield record
    ExpectationId
);
row_id!(
    /// Identifier of a daily crop observation
    DailyRecordId
);
row_id!(
    /// Identifier of a field activity log entry
    ActivityId
);
