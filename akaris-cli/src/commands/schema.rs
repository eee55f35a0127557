//! Schema commands: migrate, check, schema

use std::path::Path;

use akaris_store::schema::registry;
use akaris_store::{SchemaPlan, Store, StoreConfig, SCHEMA_VERSION};
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Show pending changes without applying them
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

async fn connect(config_path: Option<&Path>) -> Result<Store> {
    let mut config = StoreConfig::load(config_path).context("Failed to load store config")?;
    // The commands below decide themselves whether to touch the schema.
    config.ensure_schema_on_connect = false;
    info!("Connecting to {}", config.redacted_url());
    Store::connect(config)
        .await
        .context("Failed to connect to database")
}

pub async fn run_migrate(config_path: Option<&Path>, args: MigrateArgs) -> Result<()> {
    let store = connect(config_path).await?;

    let result = if args.dry_run {
        store.verify_schema().await
    } else {
        store.ensure_schema().await
    };
    store.close().await;
    let plan = result.context("Schema migration failed")?;

    if args.format == OutputFormat::Json {
        return print_json(&plan);
    }

    print_plan(&plan);
    if plan.is_current() {
        println!("Schema already at version {}", SCHEMA_VERSION);
    } else if args.dry_run {
        println!("{} change(s) pending; run without --dry-run to apply", plan.changes.len());
    } else {
        println!(
            "Applied {} change(s); schema at version {}",
            plan.changes.len(),
            SCHEMA_VERSION
        );
    }
    Ok(())
}

pub async fn run_check(config_path: Option<&Path>, args: CheckArgs) -> Result<()> {
    let store = connect(config_path).await?;
    let result = store.verify_schema().await;
    store.close().await;
    let plan = result.context("Schema check failed")?;

    match args.format {
        OutputFormat::Json => print_json(&plan)?,
        OutputFormat::Text => print_plan(&plan),
    }

    if !plan.is_current() {
        bail!(
            "Schema is behind version {}: {} change(s) pending",
            SCHEMA_VERSION,
            plan.changes.len()
        );
    }
    if args.format == OutputFormat::Text {
        println!("Schema is current (version {})", SCHEMA_VERSION);
    }
    Ok(())
}

/// Print the declared DDL in creation order.
pub fn run_schema() {
    for table in registry() {
        println!("{};", table.create_sql());
        for (_, sql) in table.index_sql() {
            println!("{};", sql);
        }
        println!();
    }
}

fn print_plan(plan: &SchemaPlan) {
    for change in &plan.changes {
        println!("  + {}", change);
    }
    for column in &plan.undeclared_columns {
        println!("  ? undeclared column {}", column);
    }
}

fn print_json(plan: &SchemaPlan) -> Result<()> {
    let json = serde_json::to_string_pretty(plan).context("Failed to serialize schema plan")?;
    println!("{}", json);
    Ok(())
}
