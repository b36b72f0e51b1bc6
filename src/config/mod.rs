// Configuration management module
// Handles TOML configuration loading and validation

pub mod settings;


pub use settings::{Config, ConfigError, LlmConfig, StoreConfig};

use anyhow::{Context, Result};

/// Get the configuration directory path, creating it if necessary
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    let dir = dirs::config_dir()
        .ok_or(ConfigError::DirectoryError)?
        .join("partsbot");
    std::fs::create_dir_all(&dir).map_err(|_| ConfigError::DirectoryError)?;
    Ok(dir)
}

/// Print the effective configuration as TOML
#[inline]
pub fn show_config() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir)?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config as TOML")?;

    println!("Configuration directory: {}", config_dir.display());
    println!();
    print!("{rendered}");
    Ok(())
}
