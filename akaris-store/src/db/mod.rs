//! Database layer - connection pool, transactions and repositories
//!
//! # Design Principles
//!
//! - Pool handle passed in explicitly - no global connection
//! - One transaction per logical operation, never held across requests
//! - Rely on DB constraints, handle conflicts - no check-then-insert
//! - Optimistic versioning on every update

pub mod pool;
pub mod repos;
pub mod tx;

pub use pool::{create_pool, create_pool_lazy};
pub use repos::*;
pub use tx::{retry_on_conflict, with_transaction, RetryPolicy};
