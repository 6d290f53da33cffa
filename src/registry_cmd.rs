//! `tradewind registry` command.

use std::path::PathBuf;

use anyhow::Result;
use tradewind::adapters::AdapterRegistry;
use tradewind::catalog::Catalog;

use crate::cli::ConfigSource;
use crate::common::load_config;

pub fn run_registry_cmd(db: Option<PathBuf>, config_source: &ConfigSource) -> Result<()> {
    let config = load_config(config_source)?;

    let registry = AdapterRegistry::builtin();
    println!("Adapters:");
    for name in registry.names() {
        println!("  {}", name);
    }

    // Queue status only when a catalog exists to read.
    let db_path = db.unwrap_or_else(|| config.db_path());
    if !db_path.exists() {
        return Ok(());
    }
    let catalog = Catalog::open(&db_path)?;
    let counts = catalog.gap_fix_status_counts()?;
    if counts.is_empty() {
        println!("Gap-fix queue: empty");
        return Ok(());
    }
    println!("Gap-fix queue:");
    for (exchange, status, count) in counts {
        let marker = if registry.get(&exchange).is_some() { "" } else { " (no adapter)" };
        println!("  {:<10} {:<24} {}{}", exchange, status, count, marker);
    }
    Ok(())
}
