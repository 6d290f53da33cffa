//! `tradewind index` command.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use tradewind::catalog::Catalog;
use tradewind::indexer::{run_index, IndexOptions};

use crate::cli::ConfigSource;
use crate::common::{load_config, parse_collector};

#[allow(clippy::too_many_arguments)]
pub fn run_index_cmd(
    root: Option<PathBuf>,
    db: Option<PathBuf>,
    batch: Option<usize>,
    include: Vec<String>,
    collector: Option<String>,
    config_source: &ConfigSource,
) -> Result<()> {
    let config = load_config(config_source)?;

    let root = root
        .or_else(|| config.root.as_ref().map(PathBuf::from))
        .ok_or_else(|| anyhow!("--root is required (or `root` in the config file)"))?;
    let db_path = db.unwrap_or_else(|| config.db_path());
    let batch_size = batch.unwrap_or_else(|| config.batch_size());
    let mut include_prefixes = include;
    if include_prefixes.is_empty() {
        include_prefixes = config.include_paths.clone();
    }
    let collector = match collector.or_else(|| config.collector.clone()) {
        Some(value) => Some(parse_collector(&value)?),
        None => None,
    };

    let catalog = Catalog::open(&db_path)?;
    let options = IndexOptions {
        batch_size,
        include_prefixes,
        collector,
        progress: true,
    };
    let report = run_index(&catalog, &root, &options)?;

    println!("Seen:      {}", report.seen);
    println!("Inserted:  {}", report.inserted);
    println!("Existing:  {}", report.existing);
    println!("Conflicts: {}", report.conflicts);
    println!("Skipped:   {}", report.skipped);
    Ok(())
}
