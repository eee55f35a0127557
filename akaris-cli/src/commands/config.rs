//! Config commands: show, path

use std::path::Path;

use akaris_store::StoreConfig;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration (file + environment), password redacted
    Show {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
    /// Show which config file would be read
    Path,
}

pub fn run_config(config_path: Option<&Path>, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show { json } => run_show(config_path, json),
        ConfigCommands::Path => run_path(config_path),
    }
}

fn run_show(config_path: Option<&Path>, json: bool) -> Result<()> {
    let mut config = StoreConfig::load(config_path).context("Failed to load store config")?;
    config.database_url = config.redacted_url();

    let rendered = if json {
        serde_json::to_string_pretty(&config).context("Failed to serialize config to JSON")?
    } else {
        toml::to_string_pretty(&config).context("Failed to serialize config to TOML")?
    };
    println!("{}", rendered);
    Ok(())
}

fn run_path(config_path: Option<&Path>) -> Result<()> {
    match StoreConfig::locate(config_path) {
        Some(path) => println!("{}", path.display()),
        None => println!("(none; using defaults and environment)"),
    }
    Ok(())
}
