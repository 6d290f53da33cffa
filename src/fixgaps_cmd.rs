//! `tradewind fixgaps` command.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use tradewind::adapters::AdapterRegistry;
use tradewind::catalog::events::GapFixFilter;
use tradewind::catalog::Catalog;
use tradewind::fixgaps::{run_fixgaps, FixOptions};
use tradewind::http::{HostPolicy, RateLimitedClient, ReqwestFetcher};

use crate::cli::ConfigSource;
use crate::common::{load_config, parse_collector};

#[allow(clippy::too_many_arguments)]
pub fn run_fixgaps_cmd(
    db: Option<PathBuf>,
    root: Option<PathBuf>,
    collector: Option<String>,
    exchange: Option<String>,
    symbol: Option<String>,
    limit: Option<u64>,
    retry_status: Vec<String>,
    id: Option<i64>,
    dry_run: bool,
    config_source: &ConfigSource,
) -> Result<()> {
    let config = load_config(config_source)?;

    let db_path = db.unwrap_or_else(|| config.db_path());
    let logical_root = root
        .or_else(|| config.root.as_ref().map(PathBuf::from))
        .ok_or_else(|| anyhow!("--root is required (or `root` in the config file)"))?;

    let collector = match collector.or_else(|| config.collector.clone()) {
        Some(value) => Some(parse_collector(&value)?.as_str().to_string()),
        None => None,
    };
    let filter = GapFixFilter {
        collector,
        exchange: exchange.or_else(|| config.exchange.clone()).map(|e| e.to_uppercase()),
        symbol: symbol.or_else(|| config.symbol.clone()).map(|s| s.to_uppercase()),
        retry_statuses: retry_status,
        limit,
        id,
    };

    let catalog = Catalog::open(&db_path)?;
    let registry = AdapterRegistry::builtin();
    let client = RateLimitedClient::new(Box::new(ReqwestFetcher::new()?), HostPolicy::default());
    let options = FixOptions { filter, logical_root, dry_run };

    let report = run_fixgaps(&catalog, &registry, &client, &options)?;

    println!("Examined:  {}", report.examined);
    println!("Fetched:   {}", report.fetched);
    println!("Merged:    {}", report.merged);
    println!("Failed:    {}", report.failed);
    println!("Recovered: {}", report.recovered_trades);
    if report.duplicates > 0 {
        println!("Duplicates dropped: {}", report.duplicates);
    }
    Ok(())
}
