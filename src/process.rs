//! Process driver: stream catalog files into candles and events.
//!
//! Files are grouped per (collector, exchange, symbol) and each group is
//! consumed in ascending start_ts order with its own parser, gap tracker,
//! candle accumulator and event accumulator. Groups are independent; with
//! `workers > 1` they run on a rayon pool and the catalog is the only shared
//! resource. Everything attributable to a single file is recorded and
//! skipped over; only catalog failures abort the run.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::candle::writer::{candle_file_name, write_dense, write_sparse};
use crate::candle::CandleAccumulator;
use crate::catalog::events::EventFileRef;
use crate::catalog::files::{CatalogFile, MarketFilter};
use crate::catalog::Catalog;
use crate::events::{EventAccumulator, EventKind, GapMeta};
use crate::gap::GapTracker;
use crate::timeframe::Timeframe;
use crate::trade::ParsedLine;

/// Marker values written to `files.process_status`.
const STATUS_PROCESSED: &str = "processed";
const STATUS_FAILED: &str = "failed";

/// Processing options.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub filter: MarketFilter,
    pub timeframe: Timeframe,
    pub out_dir: PathBuf,
    /// Re-process files already marked processed.
    pub force: bool,
    /// Write sparse artifacts instead of dense ones.
    pub sparse: bool,
    /// Market groups processed concurrently.
    pub workers: usize,
    /// Periodic flush for very long files.
    pub flush_interval: Duration,
    pub notional_ceiling: f64,
    pub progress: bool,
}

/// Aggregate counters over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub files_processed: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub trades: u64,
    pub rejects: u64,
    pub gaps: u64,
    pub candles_written: u64,
    /// Volume fields clamped at serialization; logged, not fatal.
    pub saturated: u64,
}

impl ProcessReport {
    fn absorb(&mut self, other: ProcessReport) {
        self.files_processed += other.files_processed;
        self.files_skipped += other.files_skipped;
        self.files_failed += other.files_failed;
        self.trades += other.trades;
        self.rejects += other.rejects;
        self.gaps += other.gaps;
        self.candles_written += other.candles_written;
        self.saturated += other.saturated;
    }
}

struct MarketGroup {
    collector: String,
    exchange: String,
    symbol: String,
    files: Vec<CatalogFile>,
}

/// Run the driver over every catalog file matching the filter.
///
/// `cancel` is checked between files; a cancelled run leaves only flushed
/// progress in the catalog and no temp files on disk.
pub fn run_process(
    catalog: &Catalog,
    options: &ProcessOptions,
    cancel: &AtomicBool,
) -> Result<ProcessReport> {
    std::fs::create_dir_all(&options.out_dir)
        .with_context(|| format!("create out dir {}", options.out_dir.display()))?;

    let files = catalog.files_for_processing(&options.filter)?;
    let groups = group_by_market(files);
    info!(groups = groups.len(), "processing markets");

    let bar = if options.progress {
        let total: u64 = groups.iter().map(|g| g.files.len() as u64).sum();
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Some(bar)
    } else {
        None
    };
    let bar = bar.as_ref();

    let mut report = ProcessReport::default();
    if options.workers > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .build()
            .context("build worker pool")?;
        let results: Vec<Result<ProcessReport>> = pool.install(|| {
            groups
                .par_iter()
                .map(|group| process_market(catalog, options, group, cancel, bar))
                .collect()
        });
        for result in results {
            report.absorb(result?);
        }
    } else {
        for group in &groups {
            report.absorb(process_market(catalog, options, group, cancel, bar)?);
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    if report.saturated > 0 {
        warn!(
            saturated = report.saturated,
            "volume counters clamped to i64 during candle serialization"
        );
    }
    info!(
        processed = report.files_processed,
        skipped = report.files_skipped,
        failed = report.files_failed,
        trades = report.trades,
        gaps = report.gaps,
        "process complete"
    );
    Ok(report)
}

/// One group per (collector, exchange, symbol); files keep their ascending
/// start_ts order within each group. Grouping by full key (not adjacency)
/// guarantees a market never spans two groups, so no two workers ever share
/// an output artifact or gap snapshot.
fn group_by_market(files: Vec<CatalogFile>) -> Vec<MarketGroup> {
    let mut map: std::collections::BTreeMap<(String, String, String), Vec<CatalogFile>> =
        std::collections::BTreeMap::new();
    for file in files {
        let key = (file.collector.clone(), file.exchange.clone(), file.symbol.clone());
        map.entry(key).or_default().push(file);
    }
    map.into_iter()
        .map(|((collector, exchange, symbol), files)| MarketGroup {
            collector,
            exchange,
            symbol,
            files,
        })
        .collect()
}

/// Per-market streaming state, flushed together.
struct MarketRun<'a> {
    catalog: &'a Catalog,
    options: &'a ProcessOptions,
    group: &'a MarketGroup,
    candles: CandleAccumulator,
    events: EventAccumulator,
    tracker: GapTracker,
    /// Fixed at the first flush; names the output artifact for the run.
    start_slot: Option<i64>,
    report: ProcessReport,
}

impl<'a> MarketRun<'a> {
    fn flush(&mut self, file: &CatalogFile) -> Result<()> {
        let file_ref = EventFileRef {
            root_id: file.root_id,
            relative_path: file.relative_path.clone(),
            collector: file.collector.clone(),
            exchange: file.exchange.clone(),
            symbol: file.symbol.clone(),
        };
        let events = self.events.finish();
        self.catalog.insert_events(&file_ref, &events)?;

        if !self.candles.is_empty() {
            let start_slot = match self.start_slot {
                Some(slot) => slot,
                None => {
                    // Accumulator is non-empty, min_slot exists.
                    let slot = self.candles.min_slot().unwrap_or(0);
                    self.start_slot = Some(slot);
                    slot
                }
            };
            let name = candle_file_name(
                crate::classify::Collector::from_segment(&self.group.collector)
                    .unwrap_or(crate::classify::Collector::Ram),
                &self.group.exchange,
                &self.group.symbol,
                self.options.timeframe.label(),
                start_slot,
                self.options.sparse,
            );
            let path = self.options.out_dir.join(name);
            let write_report = if self.options.sparse {
                write_sparse(&path, &self.candles)?
            } else {
                write_dense(&path, &self.candles)?
            };
            self.report.candles_written = write_report.records;
            self.report.saturated = write_report.saturated;
        }

        self.catalog.store_market_state(
            &self.group.collector,
            &self.group.exchange,
            &self.group.symbol,
            &self.tracker.snapshot(),
        )?;
        Ok(())
    }
}

fn process_market(
    catalog: &Catalog,
    options: &ProcessOptions,
    group: &MarketGroup,
    cancel: &AtomicBool,
    bar: Option<&ProgressBar>,
) -> Result<ProcessReport> {
    let tracker = match catalog.load_market_state(&group.collector, &group.exchange, &group.symbol)? {
        Some(snapshot) => GapTracker::restore(snapshot),
        None => GapTracker::new(),
    };
    let mut run = MarketRun {
        catalog,
        options,
        group,
        candles: CandleAccumulator::new(options.timeframe.clone()),
        events: EventAccumulator::new(),
        tracker,
        start_slot: None,
        report: ProcessReport::default(),
    };

    for file in &group.files {
        if cancel.load(Ordering::Relaxed) {
            info!(
                exchange = %group.exchange,
                symbol = %group.symbol,
                "cancelled, stopping before next file"
            );
            break;
        }
        if let Some(bar) = bar {
            bar.inc(1);
            bar.set_message(format!("{} {}", group.exchange, group.symbol));
        }
        if !options.force && file.process_status.as_deref() == Some(STATUS_PROCESSED) {
            run.report.files_skipped += 1;
            continue;
        }

        match stream_file(&mut run, file) {
            Ok(()) => {
                run.flush(file)?;
                catalog.mark_file(file.root_id, &file.relative_path, STATUS_PROCESSED)?;
                run.report.files_processed += 1;
            }
            Err(e) => {
                warn!(
                    path = %file.relative_path,
                    error = %e,
                    "file failed, continuing with next"
                );
                // Anomalies seen before the failure are still real.
                run.flush(file)?;
                catalog.mark_file(file.root_id, &file.relative_path, STATUS_FAILED)?;
                run.report.files_failed += 1;
            }
        }
    }
    Ok(run.report)
}

/// Stream one file through parser, gap tracker and accumulators.
fn stream_file(run: &mut MarketRun<'_>, file: &CatalogFile) -> Result<()> {
    let path = Path::new(&file.root_path).join(&file.relative_path);
    let handle = File::open(&path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(handle);

    let timeframe_ms = run.options.timeframe.ms();
    let mut parsed = ParsedLine::default();
    let mut last_flush = Instant::now();
    let mut line_no: u64 = 0;

    debug!(path = %file.relative_path, "streaming");
    for line in reader.lines() {
        line_no += 1;
        let line = line.with_context(|| format!("read {}:{}", path.display(), line_no))?;

        crate::trade::parse_line(&line, run.options.notional_ceiling, &mut parsed);
        if let Some(reason) = parsed.reject {
            run.events.record(EventKind::from(reason), line_no, None, None);
            run.report.rejects += 1;
        } else if let Some(trade) = parsed.trade {
            if let Some(hit) = run.tracker.record_gap(trade.ts, timeframe_ms) {
                run.events.record(
                    EventKind::Gap,
                    line_no,
                    Some(trade.ts - hit.gap_ms),
                    Some(GapMeta {
                        gap_ms: hit.gap_ms,
                        gap_miss: hit.gap_miss,
                        gap_end_ts: trade.ts,
                    }),
                );
                run.report.gaps += 1;
            }
            run.candles.add(&trade);
            run.report.trades += 1;
        }

        if last_flush.elapsed() >= run.options.flush_interval {
            run.flush(file)?;
            last_flush = Instant::now();
        }
    }
    Ok(())
}
