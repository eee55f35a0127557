//! Declared tables, in dependency order

use once_cell::sync::Lazy;

use super::{one_of, ColumnDef, ColumnType, OnDelete, TableDef};
use crate::models::{
    ActivityKind, CropStatus, DailyStatus, ExpectationStatus, FarmStatus, GrowthStage,
    HarvestQuality, HarvestUnit, Labels, MethodKind, RecordStatus, UserRole, UserStatus,
};

use ColumnType::*;

static REGISTRY: Lazy<Vec<TableDef>> = Lazy::new(build);

/// All tables this crate owns. Referenced tables precede referencing ones.
pub fn registry() -> &'static [TableDef] {
    &REGISTRY
}

fn id() -> ColumnDef {
    ColumnDef::new("id", Uuid)
}

/// `created_at`, `updated_at`, `version` shared by every entity table.
fn with_audit(table: TableDef) -> TableDef {
    table
        .column(ColumnDef::new("created_at", Timestamptz).default("NOW()"))
        .column(ColumnDef::new("updated_at", Timestamptz).default("NOW()"))
        .column(ColumnDef::new("version", BigInt).default("1"))
        .check("version_positive", "version >= 1")
        .check("updated_after_created", "updated_at >= created_at")
}

fn build() -> Vec<TableDef> {
    vec![
        TableDef::new("schema_migrations")
            .primary_key(&["version"])
            .column(ColumnDef::new("version", Integer))
            .column(ColumnDef::new("description", Text))
            .column(ColumnDef::new("applied_at", Timestamptz).default("NOW()")),
        users(),
        TableDef::new("user_logins")
            .primary_key(&["id"])
            .column(id())
            .column(ColumnDef::new("user_id", Uuid).references("users", "id", OnDelete::Cascade))
            .column(ColumnDef::new("logged_in_at", Timestamptz).default("NOW()"))
            .column(ColumnDef::new("ip_address", Varchar(45)))
            .index(&["user_id", "logged_in_at"]),
        plant_methods(),
        farms(),
        crops(),
        harvests(),
        expenses(),
        farm_expectations(),
        crop_daily(),
        crop_activities(),
    ]
}

fn users() -> TableDef {
    TableDef::new("users")
        .primary_key(&["id"])
        .column(id())
        .column(ColumnDef::new("first_name", Varchar(50)))
        .column(ColumnDef::new("last_name", Varchar(50)))
        .column(ColumnDef::new("email", Varchar(254)))
        .column(ColumnDef::new("credential_ref", Text))
        .column(ColumnDef::new("phone_number", Varchar(15)))
        .column(ColumnDef::new("role", Text).default("'farmer'"))
        .column(ColumnDef::new("status", Text).default("'active'"))
        .column(ColumnDef::new("registered_at", Timestamptz).default("NOW()"))
        .column(ColumnDef::new("last_login_at", Timestamptz).nullable())
        .column(ColumnDef::new("updated_at", Timestamptz).default("NOW()"))
        .column(ColumnDef::new("version", BigInt).default("1"))
        .unique(&["email"])
        .check("role", one_of("role", &UserRole::labels()))
        .check("status", one_of("status", &UserStatus::labels()))
        .check("version_positive", "version >= 1")
}

fn plant_methods() -> TableDef {
    with_audit(
        TableDef::new("plant_methods")
            .primary_key(&["id"])
            .column(id())
            .column(ColumnDef::new("kind", Text))
            .column(ColumnDef::new("description", Varchar(100)).nullable())
            .column(
                ColumnDef::new("created_by", Uuid)
                    .nullable()
                    .references("users", "id", OnDelete::SetNull),
            )
            .column(ColumnDef::new("status", Text).default("'active'")),
    )
    .check("kind", one_of("kind", &MethodKind::labels()))
    .check("status", one_of("status", &RecordStatus::labels()))
    .check("other_described", "kind <> 'other' OR description IS NOT NULL")
    .index(&["status"])
}

fn farms() -> TableDef {
    with_audit(
        TableDef::new("farms")
            .primary_key(&["id"])
            .column(id())
            .column(ColumnDef::new("owner_id", Uuid).references("users", "id", OnDelete::Restrict))
            .column(ColumnDef::new("name", Varchar(50)))
            .column(ColumnDef::new("crop_type", Varchar(50)))
            .column(ColumnDef::new("size", Numeric(10, 2)))
            .column(ColumnDef::new("location", Text))
            .column(ColumnDef::new("status", Text).default("'active'")),
    )
    .unique(&["owner_id", "name"])
    .check("size_positive", "size > 0")
    .check("status", one_of("status", &FarmStatus::labels()))
}

fn crops() -> TableDef {
    with_audit(
        TableDef::new("crops")
            .primary_key(&["id"])
            .column(id())
            .column(ColumnDef::new("farm_id", Uuid).references("farms", "id", OnDelete::Cascade))
            .column(
                ColumnDef::new("method_id", Uuid).references("plant_methods", "id", OnDelete::Restrict),
            )
            .column(ColumnDef::new("nfc_code", Varchar(30)))
            .column(ColumnDef::new("crop_type", Varchar(30)))
            .column(ColumnDef::new("crop_subtype", Varchar(50)).nullable())
            .column(ColumnDef::new("stage", Text).nullable())
            .column(ColumnDef::new("status", Text).default("'active'"))
            .column(ColumnDef::new("planted_on", Date))
            .column(ColumnDef::new("last_harvest_on", Date).nullable())
            .column(ColumnDef::new("observed_at", Timestamptz).nullable()),
    )
    .unique(&["nfc_code"])
    .check("stage", format!("stage IS NULL OR {}", one_of("stage", &GrowthStage::labels())))
    .check("status", one_of("status", &CropStatus::labels()))
    .check(
        "harvest_after_planting",
        "last_harvest_on IS NULL OR last_harvest_on >= planted_on",
    )
    .index(&["farm_id"])
    .index(&["method_id"])
    .index(&["crop_type"])
}

fn harvests() -> TableDef {
    with_audit(
        TableDef::new("harvests")
            .primary_key(&["id"])
            .column(id())
            .column(ColumnDef::new("crop_id", Uuid).references("crops", "id", OnDelete::Cascade))
            .column(ColumnDef::new("farm_id", Uuid).references("farms", "id", OnDelete::Cascade))
            .column(ColumnDef::new("quantity", Numeric(14, 4)))
            .column(ColumnDef::new("unit", Text))
            .column(ColumnDef::new("estimated_kg", Numeric(14, 4)).nullable())
            .column(ColumnDef::new("quality", Text))
            .column(ColumnDef::new("earnings", Numeric(14, 4)))
            .column(ColumnDef::new("harvested_on", Date)),
    )
    .unique(&["crop_id", "harvested_on"])
    .check("quantity_positive", "quantity > 0")
    .check("earnings_non_negative", "earnings >= 0")
    .check("unit", one_of("unit", &HarvestUnit::labels()))
    .check("quality", one_of("quality", &HarvestQuality::labels()))
    .check("unit_weighed", "unit <> 'unit' OR estimated_kg IS NOT NULL")
    .index(&["farm_id"])
}

fn expenses() -> TableDef {
    with_audit(
        TableDef::new("expenses")
            .primary_key(&["id"])
            .column(id())
            .column(ColumnDef::new("farm_id", Uuid).references("farms", "id", OnDelete::Cascade))
            .column(ColumnDef::new("category", Varchar(50)))
            .column(ColumnDef::new("description", Text).nullable())
            .column(ColumnDef::new("amount", Numeric(14, 4)))
            .column(ColumnDef::new("spent_on", Date)),
    )
    .check("amount_non_negative", "amount >= 0")
    .index(&["farm_id", "spent_on"])
}

fn farm_expectations() -> TableDef {
    with_audit(
        TableDef::new("farm_expectations")
            .primary_key(&["id"])
            .column(id())
            .column(ColumnDef::new("farm_id", Uuid).references("farms", "id", OnDelete::Cascade))
            .column(ColumnDef::new("expected_harvest_on", Date))
            .column(ColumnDef::new("expected_quantity_kg", Numeric(14, 4)))
            .column(ColumnDef::new("expected_income", Numeric(14, 4)))
            .column(ColumnDef::new("status", Text).default("'active'")),
    )
    .check("quantity_positive", "expected_quantity_kg > 0")
    .check("income_non_negative", "expected_income >= 0")
    .check("status", one_of("status", &ExpectationStatus::labels()))
    .index(&["farm_id", "created_at"])
}

fn crop_daily() -> TableDef {
    with_audit(
        TableDef::new("crop_daily")
            .primary_key(&["id"])
            .column(id())
            .column(ColumnDef::new("crop_id", Uuid).references("crops", "id", OnDelete::Cascade))
            .column(ColumnDef::new("nfc_code", Varchar(30)))
            .column(ColumnDef::new("stage", Text))
            .column(ColumnDef::new("stage_duration_days", Integer).nullable())
            .column(ColumnDef::new("status", Text).default("'active'"))
            .column(ColumnDef::new("recorded_on", Date)),
    )
    .check("stage", one_of("stage", &GrowthStage::labels()))
    .check("status", one_of("status", &DailyStatus::labels()))
    .check(
        "stage_duration_non_negative",
        "stage_duration_days IS NULL OR stage_duration_days >= 0",
    )
    .unique_where(&["crop_id", "recorded_on"], "status = 'active'")
    .index(&["nfc_code", "recorded_on"])
}

fn crop_activities() -> TableDef {
    with_audit(
        TableDef::new("crop_activities")
            .primary_key(&["id"])
            .column(id())
            .column(ColumnDef::new("farm_id", Uuid).references("farms", "id", OnDelete::Cascade))
            .column(
                ColumnDef::new("crop_id", Uuid)
                    .nullable()
                    .references("crops", "id", OnDelete::Cascade),
            )
            .column(ColumnDef::new("kind", Text))
            .column(ColumnDef::new("other_activity", Varchar(50)).nullable())
            .column(ColumnDef::new("details", Text).nullable())
            .column(
                ColumnDef::new("performed_by", Uuid).references("users", "id", OnDelete::Restrict),
            )
            .column(ColumnDef::new("performed_on", Date))
            .column(ColumnDef::new("status", Text).default("'active'")),
    )
    .check("kind", one_of("kind", &ActivityKind::labels()))
    .check("other_named", "kind <> 'other' OR other_activity IS NOT NULL")
    .check("status", one_of("status", &RecordStatus::labels()))
    .index(&["farm_id", "performed_on"])
    .index(&["crop_id"])
    .index(&["performed_by"])
}
