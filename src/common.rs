//! Common helpers shared across command modules.

use anyhow::{anyhow, Result};
use tradewind::classify::Collector;
use tradewind::config::Config;

use crate::cli::ConfigSource;

/// Resolve the effective config file for a command.
pub fn load_config(source: &ConfigSource) -> Result<Config> {
    match source {
        ConfigSource::Default => Config::load_default(),
        ConfigSource::File(path) => Config::load(path),
        ConfigSource::Disabled => Ok(Config::default()),
    }
}

/// Parse a `--collector` value.
pub fn parse_collector(value: &str) -> Result<Collector> {
    Collector::from_segment(&value.to_uppercase())
        .ok_or_else(|| anyhow!("invalid collector: {} (expected RAM or PI)", value))
}
