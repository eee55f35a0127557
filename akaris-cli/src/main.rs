//! akaris CLI - operator tooling for the akaris farm records store
//!
//! - Bring a database up to the declared schema (`migrate`)
//! - Report schema drift without changing anything (`check`)
//! - Print the declared DDL (`schema`)
//! - Inspect the effective store configuration (`config`)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "akaris",
    author,
    version,
    about = "Schema and configuration tooling for the akaris farm records store"
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file (default: ./akaris.toml, then ~/.akaris/config.toml)
    #[arg(long, global = true, env = "AKARIS_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create missing tables, columns, constraints and indexes
    Migrate(commands::schema::MigrateArgs),
    /// Compare the database with the declared schema; exit non-zero on drift
    Check(commands::schema::CheckArgs),
    /// Print the DDL for every declared table
    Schema,
    /// Inspect store configuration (show, path)
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_setup::init(&tracing_setup::TracingConfig { debug: cli.debug }).ok();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Migrate(args) => commands::run_migrate(config, args).await?,
        Commands::Check(args) => commands::run_check(config, args).await?,
        Commands::Schema => commands::run_schema(),
        Commands::Config(args) => commands::run_config(config, args)?,
    }
    Ok(())
}
