use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

use crate::config::Config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show effective configuration (file plus environment overrides)
    Show {
        /// Output format: toml (default) or json
        #[arg(short, long, default_value = "toml")]
        format: String,
    },

    /// Get a configuration value
    Get {
        /// Config key (e.g., executor.timeout_secs)
        key: String,
    },

    /// Set a configuration value in the config file
    Set {
        /// Config key (e.g., executor.timeout_secs)
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,

    /// Initialize default config file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn run(args: ConfigArgs, explicit: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommands::Show { format } => show_config(explicit, &format),
        ConfigCommands::Get { key } => get_config(explicit, &key),
        ConfigCommands::Set { key, value } => set_config(explicit, &key, &value),
        ConfigCommands::Path => show_path(explicit),
        ConfigCommands::Init { force } => init_config(explicit, force),
    }
}

fn show_config(explicit: Option<&Path>, format: &str) -> Result<()> {
    let config = Config::load(explicit)?;

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        _ => {
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
    }

    Ok(())
}

fn get_config(explicit: Option<&Path>, key: &str) -> Result<()> {
    let config = Config::load(explicit)?;
    let value = config.get_value(key)?;
    println!("{}", value);
    Ok(())
}

fn set_config(explicit: Option<&Path>, key: &str, value: &str) -> Result<()> {
    let path = Config::config_path(explicit)?;

    // File contents only, so environment overrides are not written back.
    let mut config = Config::load_with_env(&path, |_| Err(std::env::VarError::NotPresent))?;
    config.set_value(key, value)?;
    config.save(&path)?;

    println!("Set {} = {}", key, value);
    Ok(())
}

fn show_path(explicit: Option<&Path>) -> Result<()> {
    let path = Config::config_path(explicit)?;
    println!("{}", path.display());
    Ok(())
}

fn init_config(explicit: Option<&Path>, force: bool) -> Result<()> {
    let path = Config::config_path(explicit)?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    Config::write_template(&path)?;

    println!("Created config file at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");

        init_config(Some(&path), false).unwrap();
        assert!(init_config(Some(&path), false).is_err());
        init_config(Some(&path), true).unwrap();
    }

    #[test]
    fn set_persists_to_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");

        set_config(Some(&path), "executor.timeout_secs", "7").unwrap();

        let saved = Config::load_with_env(&path, |_| Err(std::env::VarError::NotPresent)).unwrap();
        assert_eq!(saved.executor.timeout_secs, 7);
    }
}
