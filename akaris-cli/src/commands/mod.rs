//! Command implementations for the akaris CLI

pub mod config;
pub mod schema;

pub use config::run_config;
pub use schema::{run_check, run_migrate, run_schema};
