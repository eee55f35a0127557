//! Repository behaviour against a live database

mod common;

use akaris_store::db::repos::{farms, users};
use akaris_store::models::{
    ActivityKind, CropActivityPatch, CropDailyPatch, CropPatch, CropStatus, DailyStatus,
    ExpectationStatus, ExpensePatch, FarmId, FarmPatch, FarmStatus, GrowthStage, HarvestQuality,
    HarvestUnit, MethodKind, NewCropActivity, NewCropDaily, NewExpense, NewFarm,
    NewFarmExpectation, NewHarvest, NewPlantMethod, Pagination, PlantMethodPatch, RecordStatus,
    UserPatch,
};
use akaris_store::{ConflictKind, ErrorKind, StoreError};
use chrono::{Duration, Utc};
use common::{date, new_user, seed_crop, seed_farm, seed_method, seed_user, store, unique};
use uuid::Uuid;

// === Round trips ===

#[tokio::test]
#[ignore = "requires database"]
async fn user_create_then_get() {
    let store = store().await;
    let created = seed_user(&store).await;

    assert_eq!(created.version, 1);
    assert!(created.last_login_at.is_none());

    let fetched = store.users().get(created.id).await.unwrap();
    assert_eq!(fetched, created);

    let by_email = store
        .users()
        .get_by_email(&created.email.to_uppercase())
        .await
        .unwrap();
    assert_eq!(by_email.id, created.id);
}

#[tokio::test]
#[ignore = "requires database"]
async fn farm_create_then_get_keeps_decimal_size() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let new = NewFarm::new(owner.id, &unique("KLT"), "oil palm", 12.345, "Kluang").unwrap();

    let farm = store.farms().create(new).await.unwrap();
    assert_eq!(farm.size, 12.35);
    assert_eq!(farm.status, FarmStatus::Active);
    assert_eq!(store.farms().get(farm.id).await.unwrap(), farm);
}

#[tokio::test]
#[ignore = "requires database"]
async fn crop_create_then_get_and_lookup_by_tag() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;

    let crop = seed_crop(&store, &farm, &method).await;
    assert_eq!(crop.farm_id, farm.id);
    assert_eq!(crop.status, CropStatus::Active);
    assert_eq!(store.crops().get(crop.id).await.unwrap(), crop);
    assert_eq!(store.crops().get_by_nfc(&crop.nfc_code).await.unwrap().id, crop.id);
    assert_eq!(crop.age_years(date(2021, 9, 10)), 2.5);
}

// === Delete then get ===

#[tokio::test]
#[ignore = "requires database"]
async fn deleted_rows_are_not_found() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;

    store.farms().delete(farm.id).await.unwrap();
    let err = store.farms().get(farm.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = store.farms().delete(farm.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    store.users().delete(owner.id).await.unwrap();
    assert_eq!(
        store.users().get(owner.id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

// === Referential integrity ===

#[tokio::test]
#[ignore = "requires database"]
async fn deleting_farm_cascades_to_crops() {
    let store = store().await;
    let u1 = seed_user(&store).await;
    let f1 = seed_farm(&store, &u1).await;
    let method = seed_method(&store).await;
    let c1 = seed_crop(&store, &f1, &method).await;

    store.farms().delete(f1.id).await.unwrap();

    let err = store.crops().get(c1.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { resource: "crop", .. }));

    let orphans: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM crops c LEFT JOIN farms f ON f.id = c.farm_id WHERE f.id IS NULL",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(orphans, 0);
}

#[tokio::test]
#[ignore = "requires database"]
async fn deleting_farm_removes_harvests_and_expenses() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;
    let crop = seed_crop(&store, &farm, &method).await;

    let harvest = store
        .harvests()
        .create(
            NewHarvest::new(crop.id, 40.0, HarvestUnit::Kg, None, HarvestQuality::Good, 800.0, date(2024, 7, 1))
                .unwrap(),
        )
        .await
        .unwrap();
    let expense = store
        .expenses()
        .create(NewExpense::new(farm.id, "fertiliser", None, 150.0, date(2024, 6, 1)).unwrap())
        .await
        .unwrap();

    store.farms().delete(farm.id).await.unwrap();

    assert_eq!(
        store.harvests().get(harvest.id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        store.expenses().get(expense.id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
#[ignore = "requires database"]
async fn owner_with_farms_cannot_be_deleted() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;

    let err = store.users().delete(owner.id).await.unwrap_err();
    match err {
        StoreError::Conflict {
            kind: ConflictKind::Dependents { constraint },
            ..
        } => assert_eq!(constraint, "fk_farms_owner_id"),
        other => panic!("expected dependents conflict, got {other:?}"),
    }

    // Nothing was removed.
    assert!(store.users().get(owner.id).await.is_ok());
    assert!(store.farms().get(farm.id).await.is_ok());
}

#[tokio::test]
#[ignore = "requires database"]
async fn plant_method_in_use_cannot_be_deleted() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;
    seed_crop(&store, &farm, &method).await;

    let err = store.plant_methods().delete(method.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
#[ignore = "requires database"]
async fn deleting_author_keeps_plant_method() {
    let store = store().await;
    let author = seed_user(&store).await;
    let method = store
        .plant_methods()
        .create(NewPlantMethod::new(MethodKind::Other, Some("air layering"), Some(author.id)).unwrap())
        .await
        .unwrap();

    store.users().delete(author.id).await.unwrap();

    let method = store.plant_methods().get(method.id).await.unwrap();
    assert!(method.created_by.is_none());
}

#[tokio::test]
#[ignore = "requires database"]
async fn child_of_missing_parent_is_not_found() {
    let store = store().await;
    let ghost = seed_user(&store).await;
    store.users().delete(ghost.id).await.unwrap();

    let err = store
        .farms()
        .create(NewFarm::new(ghost.id, "GHOST", "durian", 1.0, "nowhere").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { resource: "user", .. }));
}

// === Uniqueness ===

#[tokio::test]
#[ignore = "requires database"]
async fn duplicate_email_is_conflict() {
    let store = store().await;
    let first = seed_user(&store).await;

    let mut again = new_user();
    again.email = akaris_store::models::Email::new(&first.email).unwrap();
    let err = store.users().create(again).await.unwrap_err();

    assert!(matches!(
        err,
        StoreError::Conflict {
            kind: ConflictKind::Duplicate { .. },
            ..
        }
    ));
}

#[tokio::test]
#[ignore = "requires database"]
async fn farm_names_unique_per_owner_only() {
    let store = store().await;
    let a = seed_user(&store).await;
    let b = seed_user(&store).await;
    let name = unique("SHARED");

    store
        .farms()
        .create(NewFarm::new(a.id, &name, "durian", 1.0, "Raub").unwrap())
        .await
        .unwrap();
    store
        .farms()
        .create(NewFarm::new(b.id, &name, "durian", 1.0, "Raub").unwrap())
        .await
        .unwrap();

    let err = store
        .farms()
        .create(NewFarm::new(a.id, &name, "rubber", 3.0, "Bentong").unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

// === Updates ===

#[tokio::test]
#[ignore = "requires database"]
async fn update_bumps_version_and_keeps_id() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;

    let patch = FarmPatch::default()
        .size(4.0)
        .unwrap()
        .status(FarmStatus::Inactive);
    let updated = store.farms().update(farm.id, farm.version, patch).await.unwrap();

    assert_eq!(updated.id, farm.id);
    assert_eq!(updated.version, farm.version + 1);
    assert_eq!(updated.size, 4.0);
    assert_eq!(updated.status, FarmStatus::Inactive);
    assert_eq!(updated.name, farm.name);
    assert_eq!(updated.created_at, farm.created_at);
    assert!(updated.updated_at >= farm.updated_at);
}

#[tokio::test]
#[ignore = "requires database"]
async fn stale_version_is_conflict() {
    let store = store().await;
    let owner = seed_user(&store).await;

    let patch = UserPatch::default().first_name("Nur").unwrap();
    store.users().update(owner.id, 1, patch.clone()).await.unwrap();

    let err = store.users().update(owner.id, 1, patch).await.unwrap_err();
    match err {
        StoreError::Conflict {
            kind: ConflictKind::StaleVersion { expected, actual },
            ..
        } => {
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("expected stale version, got {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires database"]
async fn update_of_missing_row_is_not_found() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    store.farms().delete(farm.id).await.unwrap();

    let err = store
        .farms()
        .update(farm.id, 1, FarmPatch::default().location("Bentong").unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
#[ignore = "requires database"]
async fn empty_patch_is_rejected() {
    let store = store().await;
    let owner = seed_user(&store).await;

    let err = store
        .users()
        .update(owner.id, owner.version, UserPatch::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
#[ignore = "requires database"]
async fn crop_observation_never_moves_backwards() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;
    let crop = seed_crop(&store, &farm, &method).await;

    let now = Utc::now();
    let crop = store
        .crops()
        .update(
            crop.id,
            crop.version,
            CropPatch::default().observed_at(now).stage(GrowthStage::Flowering),
        )
        .await
        .unwrap();
    let first_seen = crop.observed_at.unwrap();

    let crop = store
        .crops()
        .update(crop.id, crop.version, CropPatch::default().observed_at(now - Duration::days(3)))
        .await
        .unwrap();

    assert_eq!(crop.observed_at, Some(first_seen));
    assert_eq!(crop.stage, Some(GrowthStage::Flowering));
}

#[tokio::test]
#[ignore = "requires database"]
async fn crop_last_harvest_never_moves_backwards() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;
    let crop = seed_crop(&store, &farm, &method).await;

    let crop = store
        .crops()
        .update(crop.id, crop.version, CropPatch::default().last_harvest_on(date(2024, 6, 1)).unwrap())
        .await
        .unwrap();
    assert_eq!(crop.last_harvest_on, Some(date(2024, 6, 1)));

    let crop = store
        .crops()
        .update(crop.id, crop.version, CropPatch::default().last_harvest_on(date(2020, 1, 1)).unwrap())
        .await
        .unwrap();
    assert_eq!(crop.last_harvest_on, Some(date(2024, 6, 1)));
    assert_eq!(crop.version, 3);
}

#[tokio::test]
#[ignore = "requires database"]
async fn crop_dates_checked_against_stored_values() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;
    let crop = seed_crop(&store, &farm, &method).await;

    // Stored planting date is 2019-03-10.
    let err = store
        .crops()
        .update(crop.id, crop.version, CropPatch::default().last_harvest_on(date(2018, 1, 1)).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
#[ignore = "requires database"]
async fn other_method_keeps_its_description() {
    let store = store().await;
    let method = store
        .plant_methods()
        .create(NewPlantMethod::new(MethodKind::Other, Some("marcotting"), None).unwrap())
        .await
        .unwrap();

    let err = store
        .plant_methods()
        .update(method.id, method.version, PlantMethodPatch::default().description(None).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// === Harvests ===

#[tokio::test]
#[ignore = "requires database"]
async fn harvest_advances_crop_last_harvest() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;
    let crop = seed_crop(&store, &farm, &method).await;

    let harvest = |day| {
        NewHarvest::new(crop.id, 12.0, HarvestUnit::Unit, Some(30.0), HarvestQuality::Excellent, 600.0, day)
            .unwrap()
    };

    let later = store.harvests().create(harvest(date(2024, 7, 10))).await.unwrap();
    assert_eq!(later.farm_id, farm.id);
    assert_eq!(later.estimated_kg, Some(30.0));

    let after_first = store.crops().get(crop.id).await.unwrap();
    assert_eq!(after_first.last_harvest_on, Some(date(2024, 7, 10)));
    assert_eq!(after_first.version, crop.version + 1);

    // Back-filling an earlier harvest leaves the crop untouched.
    store.harvests().create(harvest(date(2024, 7, 1))).await.unwrap();
    let after_second = store.crops().get(crop.id).await.unwrap();
    assert_eq!(after_second.last_harvest_on, Some(date(2024, 7, 10)));
    assert_eq!(after_second.version, after_first.version);

    let latest = store.harvests().latest_for_crop(crop.id).await.unwrap().unwrap();
    assert_eq!(latest.id, later.id);

    let page = store
        .harvests()
        .list_for_crop(crop.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].harvested_on, date(2024, 7, 10));
}

#[tokio::test]
#[ignore = "requires database"]
async fn one_harvest_per_crop_per_day() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;
    let crop = seed_crop(&store, &farm, &method).await;

    let new = NewHarvest::new(crop.id, 5.0, HarvestUnit::Kg, None, HarvestQuality::Fair, 90.0, date(2024, 8, 1))
        .unwrap();
    store.harvests().create(new.clone()).await.unwrap();

    let err = store.harvests().create(new).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Conflict {
            kind: ConflictKind::Duplicate { .. },
            ..
        }
    ));
}

#[tokio::test]
#[ignore = "requires database"]
async fn harvest_requires_active_crop_and_valid_date() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;
    let crop = seed_crop(&store, &farm, &method).await;

    let before_planting =
        NewHarvest::new(crop.id, 5.0, HarvestUnit::Kg, None, HarvestQuality::Fair, 0.0, date(2019, 1, 1)).unwrap();
    let err = store.harvests().create(before_planting).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    store
        .crops()
        .update(crop.id, crop.version, CropPatch::default().status(CropStatus::Terminated))
        .await
        .unwrap();

    let new = NewHarvest::new(crop.id, 5.0, HarvestUnit::Kg, None, HarvestQuality::Fair, 0.0, date(2024, 1, 1)).unwrap();
    let err = store.harvests().create(new).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// === Expenses ===

#[tokio::test]
#[ignore = "requires database"]
async fn expenses_total_and_update() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;

    assert_eq!(store.expenses().total_for_farm(farm.id).await.unwrap(), 0.0);

    let seed = store
        .expenses()
        .create(NewExpense::new(farm.id, "seedlings", Some("D197 grafts"), 1200.5, date(2024, 1, 5)).unwrap())
        .await
        .unwrap();
    store
        .expenses()
        .create(NewExpense::new(farm.id, "fuel", None, 80.25, date(2024, 2, 1)).unwrap())
        .await
        .unwrap();

    assert_eq!(store.expenses().total_for_farm(farm.id).await.unwrap(), 1280.75);

    let updated = store
        .expenses()
        .update(seed.id, seed.version, ExpensePatch::default().description(None).unwrap())
        .await
        .unwrap();
    assert!(updated.description.is_none());
    assert_eq!(updated.amount, 1200.5);

    let page = store
        .expenses()
        .list_for_farm(farm.id, Pagination::new(1, 1))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].category, "fuel");
    assert!(page.has_next());

    store.farms().delete(farm.id).await.unwrap();
    assert_eq!(
        store.expenses().total_for_farm(farm.id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

// === Listing ===

#[tokio::test]
#[ignore = "requires database"]
async fn farms_listed_per_owner() {
    let store = store().await;
    let owner = seed_user(&store).await;
    for _ in 0..3 {
        seed_farm(&store, &owner).await;
    }

    let page = store
        .farms()
        .list_for_owner(owner.id, Pagination::new(2, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.total_pages(), 2);
    assert!(!page.has_next());
    assert!(page.has_prev());
}

// === Logins ===

#[tokio::test]
#[ignore = "requires database"]
async fn logins_recorded_and_last_login_monotonic() {
    let store = store().await;
    let user = seed_user(&store).await;

    let first = store.users().record_login(user.id, "10.0.0.7").await.unwrap();
    let second = store.users().record_login(user.id, " ::1 ").await.unwrap();
    assert!(second.logged_in_at >= first.logged_in_at);
    assert_eq!(second.ip_address, "::1");

    let refreshed = store.users().get(user.id).await.unwrap();
    assert_eq!(refreshed.last_login_at, Some(second.logged_in_at));
    // Logging in is not a profile edit.
    assert_eq!(refreshed.version, user.version);

    let recent = store.users().recent_logins(user.id, 10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].id, second.id);

    let err = store.users().record_login(user.id, "localhost").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// === Expectations ===

#[tokio::test]
#[ignore = "requires database"]
async fn latest_expectation_skips_retracted_ones() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;

    assert!(store.expectations().latest_for_farm(farm.id).await.unwrap().is_none());

    let first = store
        .expectations()
        .create(NewFarmExpectation::new(farm.id, date(2025, 6, 1), 900.0, 18000.0).unwrap())
        .await
        .unwrap();
    let second = store
        .expectations()
        .create(NewFarmExpectation::new(farm.id, date(2025, 7, 1), 1100.0, 22000.0).unwrap())
        .await
        .unwrap();
    assert_eq!(second.status, ExpectationStatus::Active);

    let latest = store.expectations().latest_for_farm(farm.id).await.unwrap().unwrap();
    assert_eq!(latest.id, second.id);

    let retracted = store.expectations().retract(second.id, second.version).await.unwrap();
    assert_eq!(retracted.status, ExpectationStatus::Retracted);
    assert_eq!(retracted.expected_quantity_kg, 1100.0);
    assert_eq!(retracted.version, second.version + 1);

    let latest = store.expectations().latest_for_farm(farm.id).await.unwrap().unwrap();
    assert_eq!(latest.id, first.id);

    let page = store
        .expectations()
        .list_for_farm(farm.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    let err = store.expectations().retract(second.id, second.version).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Conflict {
            kind: ConflictKind::StaleVersion { .. },
            ..
        }
    ));
}

#[tokio::test]
#[ignore = "requires database"]
async fn records_only_added_to_active_farms() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    store
        .farms()
        .update(farm.id, farm.version, FarmPatch::default().status(FarmStatus::Inactive))
        .await
        .unwrap();

    let err = store
        .expectations()
        .create(NewFarmExpectation::new(farm.id, date(2025, 6, 1), 10.0, 0.0).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let activity =
        NewCropActivity::new(farm.id, None, ActivityKind::Weeding, None, None, owner.id, date(2025, 5, 2)).unwrap();
    let err = store.activities().create(activity).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let missing = NewFarmExpectation::new(FarmId::from_uuid(Uuid::new_v4()), date(2025, 6, 1), 10.0, 0.0).unwrap();
    let err = store.expectations().create(missing).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { resource: "farm", .. }));
}

// === Daily records ===

#[tokio::test]
#[ignore = "requires database"]
async fn crop_stage_follows_latest_active_daily_record() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;
    let crop = seed_crop(&store, &farm, &method).await;
    assert!(crop.stage.is_none());

    let flowering = store
        .daily_records()
        .create(NewCropDaily::new(&crop.nfc_code, GrowthStage::Flowering, Some(9), date(2025, 3, 2)).unwrap())
        .await
        .unwrap();
    assert_eq!(flowering.crop_id, crop.id);
    assert_eq!(store.crops().get(crop.id).await.unwrap().stage, Some(GrowthStage::Flowering));

    // A back-filled record does not override a later one.
    let growing = store
        .daily_records()
        .create(NewCropDaily::new(&crop.nfc_code, GrowthStage::Growing, None, date(2025, 2, 1)).unwrap())
        .await
        .unwrap();
    assert_eq!(store.crops().get(crop.id).await.unwrap().stage, Some(GrowthStage::Flowering));

    store
        .daily_records()
        .update(flowering.id, flowering.version, CropDailyPatch::default().status(DailyStatus::Retracted))
        .await
        .unwrap();
    assert_eq!(store.crops().get(crop.id).await.unwrap().stage, Some(GrowthStage::Growing));

    let latest = store.daily_records().latest_for_crop(&crop.nfc_code).await.unwrap().unwrap();
    assert_eq!(latest.id, growing.id);
    let history = store
        .daily_records()
        .history(&crop.nfc_code, Pagination::default())
        .await
        .unwrap();
    assert_eq!(history.total, 2);
    assert_eq!(history.items[0].id, flowering.id);

    store.daily_records().delete(growing.id).await.unwrap();
    assert!(store.crops().get(crop.id).await.unwrap().stage.is_none());
}

#[tokio::test]
#[ignore = "requires database"]
async fn one_active_daily_record_per_crop_and_day() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;
    let crop = seed_crop(&store, &farm, &method).await;

    let new = NewCropDaily::new(&crop.nfc_code, GrowthStage::Fruiting, None, date(2025, 4, 4)).unwrap();
    let first = store.daily_records().create(new.clone()).await.unwrap();

    let err = store.daily_records().create(new.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Conflict {
            kind: ConflictKind::Duplicate { .. },
            ..
        }
    ));

    // Once retracted, the day can be recorded again.
    store
        .daily_records()
        .update(first.id, first.version, CropDailyPatch::default().status(DailyStatus::Retracted))
        .await
        .unwrap();
    store.daily_records().create(new).await.unwrap();
}

#[tokio::test]
#[ignore = "requires database"]
async fn daily_record_needs_known_active_crop() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;
    let crop = seed_crop(&store, &farm, &method).await;

    let unknown = NewCropDaily::new(&unique("NONE"), GrowthStage::Growing, None, date(2025, 1, 1)).unwrap();
    let err = store.daily_records().create(unknown).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { resource: "crop", .. }));

    let before_planting = NewCropDaily::new(&crop.nfc_code, GrowthStage::Sprouting, None, date(2019, 1, 1)).unwrap();
    let err = store.daily_records().create(before_planting).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    store
        .crops()
        .update(crop.id, crop.version, CropPatch::default().status(CropStatus::Inactive))
        .await
        .unwrap();
    let err = store
        .daily_records()
        .create(NewCropDaily::new(&crop.nfc_code, GrowthStage::Growing, None, date(2025, 1, 1)).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// === Activities ===

#[tokio::test]
#[ignore = "requires database"]
async fn activity_crop_must_belong_to_the_farm() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let other_farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;
    let crop = seed_crop(&store, &other_farm, &method).await;

    let new = NewCropActivity::new(
        farm.id,
        Some(crop.id),
        ActivityKind::Fertilizing,
        None,
        Some("NPK 15-15-15"),
        owner.id,
        date(2025, 5, 1),
    )
    .unwrap();
    let err = store.activities().create(new).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let new = NewCropActivity::new(
        other_farm.id,
        Some(crop.id),
        ActivityKind::Other,
        Some("pruning"),
        None,
        owner.id,
        date(2025, 5, 1),
    )
    .unwrap();
    let activity = store.activities().create(new).await.unwrap();
    assert_eq!(activity.status, RecordStatus::Active);
    assert_eq!(activity.other_activity.as_deref(), Some("pruning"));

    let updated = store
        .activities()
        .update(
            activity.id,
            activity.version,
            CropActivityPatch::default().kind(ActivityKind::Weeding, None).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(updated.kind, ActivityKind::Weeding);
    assert!(updated.other_activity.is_none());

    let page = store
        .activities()
        .list_for_crop(crop.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
#[ignore = "requires database"]
async fn crop_children_removed_with_crop_and_farm() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;
    let method = seed_method(&store).await;
    let crop = seed_crop(&store, &farm, &method).await;

    let daily = store
        .daily_records()
        .create(NewCropDaily::new(&crop.nfc_code, GrowthStage::Growing, None, date(2025, 1, 1)).unwrap())
        .await
        .unwrap();
    let on_crop = store
        .activities()
        .create(
            NewCropActivity::new(farm.id, Some(crop.id), ActivityKind::Watering, None, None, owner.id, date(2025, 1, 2))
                .unwrap(),
        )
        .await
        .unwrap();
    let farm_wide = store
        .activities()
        .create(
            NewCropActivity::new(farm.id, None, ActivityKind::PestInspection, None, None, owner.id, date(2025, 1, 3))
                .unwrap(),
        )
        .await
        .unwrap();
    let expectation = store
        .expectations()
        .create(NewFarmExpectation::new(farm.id, date(2025, 7, 1), 500.0, 9000.0).unwrap())
        .await
        .unwrap();

    store.crops().delete(crop.id).await.unwrap();
    assert_eq!(store.daily_records().get(daily.id).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(store.activities().get(on_crop.id).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert!(store.activities().get(farm_wide.id).await.is_ok());

    store.farms().delete(farm.id).await.unwrap();
    assert_eq!(store.activities().get(farm_wide.id).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(store.expectations().get(expectation.id).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
#[ignore = "requires database"]
async fn author_of_activities_cannot_be_deleted() {
    let store = store().await;
    let owner = seed_user(&store).await;
    let worker = seed_user(&store).await;
    let farm = seed_farm(&store, &owner).await;

    store
        .activities()
        .create(
            NewCropActivity::new(farm.id, None, ActivityKind::Transplanting, None, None, worker.id, date(2025, 2, 2))
                .unwrap(),
        )
        .await
        .unwrap();

    let err = store.users().delete(worker.id).await.unwrap_err();
    match err {
        StoreError::Conflict {
            kind: ConflictKind::Dependents { constraint },
            ..
        } => assert_eq!(constraint, "fk_crop_activities_performed_by"),
        other => panic!("expected dependents conflict, got {other:?}"),
    }
}

// === Transactions ===

#[tokio::test]
#[ignore = "requires database"]
async fn multi_step_transaction_commits_together() {
    let store = store().await;
    let new = new_user();

    let (user, farm) = store
        .transaction(move |conn| {
            Box::pin(async move {
                let user = users::insert(&mut *conn, new).await?;
                let farm = farms::insert(
                    &mut *conn,
                    NewFarm::new(user.id, "TXN", "durian", 1.5, "Raub")?,
                )
                .await?;
                Ok((user, farm))
            })
        })
        .await
        .unwrap();

    assert_eq!(store.farms().get(farm.id).await.unwrap().owner_id, user.id);
}

#[tokio::test]
#[ignore = "requires database"]
async fn failed_transaction_leaves_nothing_behind() {
    let store = store().await;
    let new = new_user();
    let email = new.email.as_str().to_owned();

    let err = store
        .transaction(move |conn| {
            Box::pin(async move {
                let user = users::insert(&mut *conn, new).await?;
                // Second step fails after the first one wrote.
                farms::insert(&mut *conn, NewFarm::new(user.id, "BAD", "durian", 1.0, "Raub")?).await?;
                Err::<(), _>(StoreError::not_found("farm", "forced"))
            })
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = store.users().get_by_email(&email).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
