//! akaris-store: persistence core for akaris farm records
//!
//! Declares the relational schema, manages pooled connections and
//! transactions, and exposes typed repositories for users, farms, plant
//! methods, crops, harvests and expenses. Route dispatch and request
//! handling live elsewhere and talk to this crate through [`Store`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod schema;
pub mod store;

pub use config::{RetryConfig, StoreConfig};
pub use db::{create_pool, create_pool_lazy, retry_on_conflict, with_transaction, RetryPolicy};
pub use error::{ConflictKind, ErrorKind, StoreError, StoreResult};
pub use schema::{ensure_schema, verify_schema, SchemaChange, SchemaPlan, SCHEMA_VERSION};
pub use store::Store;
