//! `tradewind process` command.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tradewind::catalog::files::MarketFilter;
use tradewind::catalog::Catalog;
use tradewind::config::DEFAULT_TIMEFRAME;
use tradewind::process::{run_process, ProcessOptions};
use tradewind::timeframe::Timeframe;

use crate::cli::ConfigSource;
use crate::common::{load_config, parse_collector};

#[allow(clippy::too_many_arguments)]
pub fn run_process_cmd(
    db: Option<PathBuf>,
    collector: Option<String>,
    exchange: Option<String>,
    symbol: Option<String>,
    timeframe: Option<String>,
    outdir: Option<PathBuf>,
    force: bool,
    sparse: bool,
    workers: Option<usize>,
    flush_interval: Option<u64>,
    config_source: &ConfigSource,
) -> Result<()> {
    let config = load_config(config_source)?;

    let db_path = db.unwrap_or_else(|| config.db_path());
    let timeframe = timeframe
        .or_else(|| config.timeframe.clone())
        .unwrap_or_else(|| DEFAULT_TIMEFRAME.to_string());
    let timeframe = Timeframe::parse(&timeframe)?;
    let out_dir = outdir.unwrap_or_else(|| config.out_dir());

    // Filter values normalize the way the classifier stores them.
    let collector = match collector.or_else(|| config.collector.clone()) {
        Some(value) => Some(parse_collector(&value)?.as_str().to_string()),
        None => None,
    };
    let filter = MarketFilter {
        collector,
        exchange: exchange.or_else(|| config.exchange.clone()).map(|e| e.to_uppercase()),
        symbol: symbol.or_else(|| config.symbol.clone()).map(|s| s.to_uppercase()),
    };

    let options = ProcessOptions {
        filter,
        timeframe,
        out_dir,
        force: force || config.force.unwrap_or(false),
        sparse: sparse || config.sparse_output.unwrap_or(false),
        workers: workers.unwrap_or_else(|| config.workers()),
        flush_interval: Duration::from_secs(
            flush_interval.unwrap_or_else(|| config.flush_interval_seconds()),
        ),
        notional_ceiling: config.notional_ceiling(),
        progress: true,
    };

    // SIGINT flips the cancel flag; the driver stops at the next file
    // boundary with only flushed progress recorded.
    let cancel = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, cancel.clone())?;

    let catalog = Catalog::open(&db_path)?;
    let report = run_process(&catalog, &options, &cancel)?;

    println!("Processed: {}", report.files_processed);
    println!("Skipped:   {}", report.files_skipped);
    println!("Failed:    {}", report.files_failed);
    println!("Trades:    {}", report.trades);
    println!("Rejects:   {}", report.rejects);
    println!("Gaps:      {}", report.gaps);
    println!("Candles:   {}", report.candles_written);
    Ok(())
}
