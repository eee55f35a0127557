//! Shared setup for database integration tests
//!
//! Run with: DATABASE_URL=postgres://... cargo test -p akaris-store -- --ignored

#![allow(dead_code)]

use akaris_store::models::{
    Crop, Farm, MethodKind, NewCrop, NewFarm, NewPlantMethod, NewUser, PlantMethod, User,
    UserRole,
};
use akaris_store::{Store, StoreConfig};
use chrono::NaiveDate;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub fn database_url() -> String {
    std::env::var("DATABASE_URL").expect("DATABASE_URL required")
}

/// Log to the test harness; `RUST_LOG=akaris_store=debug` shows the SQL flow.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// Connected store with the schema in place.
pub async fn store() -> Store {
    init_tracing();
    let mut config = StoreConfig::new(database_url());
    config.max_connections = 10;
    let store = Store::connect(config).await.expect("connect failed");
    store.ensure_schema().await.expect("ensure_schema failed");
    store
}

/// Short random suffix so parallel tests never share keys.
pub fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn new_user() -> NewUser {
    NewUser::new(
        "Siti",
        "Aminah",
        &format!("{}@example.my", unique("siti")),
        "$argon2id$v=19$m=19456,t=2,p=1$hash",
        "+60 12-345 6789",
        UserRole::Farmer,
    )
    .unwrap()
}

pub async fn seed_user(store: &Store) -> User {
    store.users().create(new_user()).await.expect("create user")
}

pub async fn seed_farm(store: &Store, owner: &User) -> Farm {
    let new = NewFarm::new(owner.id, &unique("MSK"), "durian", 2.5, "Raub, Pahang").unwrap();
    store.farms().create(new).await.expect("create farm")
}

pub async fn seed_method(store: &Store) -> PlantMethod {
    let new = NewPlantMethod::new(MethodKind::Grafting, Some("cleft graft"), None).unwrap();
    store.plant_methods().create(new).await.expect("create plant method")
}

pub async fn seed_crop(store: &Store, farm: &Farm, method: &PlantMethod) -> Crop {
    let new = NewCrop::new(farm.id, method.id, &unique("T"), "durian", date(2019, 3, 10)).unwrap();
    store.crops().create(new).await.expect("create crop")
}
