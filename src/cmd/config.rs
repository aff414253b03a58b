//! Configuration view and validation commands: `sitesmith config`.

use std::path::Path;

use anyhow::{Context, Result};
use sitesmith::config::Config;

use super::super::ConfigCommands;

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Sitesmith Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No sitesmith.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let mut config = Config::load_or_default(config_path)?;
            config.apply_env()?;
            println!("Effective values (with env overrides):");
            println!();
            print!("{}", config.to_toml()?);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No sitesmith.toml found. Using defaults (valid).");
                return Ok(());
            }

            let config = Config::load(config_path)?;
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("sitesmith.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }

            Config::default().save(config_path)?;

            println!("Created sitesmith.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, data_dir");
            println!("  - [sites] root, remote, branch, overrides");
            println!("  - [assistant] command, model, timeout_secs");
            println!("  - [llm] model, api_key_env");
            println!();
        }
    }

    Ok(())
}
