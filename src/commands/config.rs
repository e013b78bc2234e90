use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;

use crate::core::config::Config;

pub fn handle_config(matches: &ArgMatches, effective: &Config, config_path: Option<&PathBuf>) -> Result<()> {
    match matches.subcommand() {
        Some(("show", _)) => {
            let json = serde_json::to_string_pretty(effective).context("Failed to serialize config")?;
            println!("{}", json);
            Ok(())
        }
        Some(("set", sub_matches)) => {
            let key = sub_matches
                .get_one::<String>("key")
                .context("Key argument is required")?;
            let value = sub_matches
                .get_one::<String>("value")
                .context("Value argument is required")?;

            set_and_save(key, value, config_path.map(PathBuf::as_path))?;
            println!("{} {} = {}", "Saved".green(), key, value);
            Ok(())
        }
        Some(("path", _)) => {
            let path = match config_path {
                Some(path) => path.clone(),
                None => Config::get_config_path()?,
            };
            println!("{}", path.display());
            Ok(())
        }
        _ => {
            println!("Use 'gpustat config --help' for more information.");
            Ok(())
        }
    }
}

/// Update one key in the stored file, leaving the others as they are.
///
/// Without `path` the default config location is used.
pub fn set_and_save(key: &str, value: &str, path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    config.set_value(key, value)?;

    match path {
        Some(path) => config.save_to(path)?,
        None => config.save()?,
    }
    Ok(config)
}
