//! Library interface for the devbridge CLI
//!
//! This module exposes internal functions for integration testing while keeping
//! the main binary logic in main.rs.

pub mod logging;

// Re-export commonly needed types for tests
pub use anyhow::Result;
pub use devbridge_core::config::Config;

use anyhow::Context;
use std::path::Path;

/// Load and validate the effective configuration
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Render the effective configuration as TOML
pub fn render_config(config_path: Option<&Path>) -> Result<String> {
    let config = load_config(config_path)?;
    config
        .to_toml_string()
        .context("Failed to render configuration")
}
