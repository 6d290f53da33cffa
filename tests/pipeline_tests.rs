//! End-to-end pipeline: index a collector tree, process it into candles,
//! and verify the catalog and binary artifacts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tempfile::TempDir;
use tradewind::catalog::files::MarketFilter;
use tradewind::catalog::Catalog;
use tradewind::indexer::{run_index, IndexOptions};
use tradewind::process::{run_process, ProcessOptions};
use tradewind::read_dense;
use tradewind::timeframe::Timeframe;

/// 2023-05-02 00:00 UTC.
const BASE: i64 = 1_682_985_600_000;

fn write_raw_file(root: &Path, rel: &str, lines: &[String]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

/// A day of BTCUSD with tight trades, one large gap and one garbage line.
fn standard_lines() -> Vec<String> {
    vec![
        format!("{} 100 1 1 0", BASE),
        format!("{} 100.5 1 1 0", BASE + 100),
        format!("{} 101 1 0 0", BASE + 200),
        format!("{} 102 1 1 0", BASE + 120_200),
        "garbage".to_string(),
    ]
}

fn options(out_dir: PathBuf) -> ProcessOptions {
    ProcessOptions {
        filter: MarketFilter::default(),
        timeframe: Timeframe::parse("1m").unwrap(),
        out_dir,
        force: false,
        sparse: false,
        workers: 1,
        flush_interval: Duration::from_secs(10),
        notional_ceiling: 1e9,
        progress: false,
    }
}

fn setup() -> (TempDir, PathBuf, Catalog) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("RAM");
    write_raw_file(&root, "BYBIT/BTCUSD/2023/05/02", &standard_lines());
    let catalog = Catalog::open(&tmp.path().join("catalog.db")).unwrap();
    (tmp, root, catalog)
}

#[test]
fn test_index_then_process_produces_candles_and_events() {
    let (tmp, root, catalog) = setup();
    let out_dir = tmp.path().join("candles");

    let index_report = run_index(&catalog, &root, &IndexOptions::default()).unwrap();
    assert_eq!(index_report.inserted, 1);

    let report = run_process(&catalog, &options(out_dir.clone()), &AtomicBool::new(false)).unwrap();
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.trades, 4);
    assert_eq!(report.rejects, 1);
    assert_eq!(report.gaps, 1);

    // Dense artifact spans [BASE, BASE + 120000]: three 1m slots, the middle
    // one an all-zero gap marker.
    let candle_path = out_dir.join(format!("RAM_BYBIT_BTCUSD_1m_{}.bin", BASE));
    assert!(candle_path.exists(), "expected {}", candle_path.display());
    let candles = read_dense(&candle_path).unwrap();
    assert_eq!(candles.len(), 3);

    let first = &candles[0];
    assert_eq!(first.open, 1_000_000);
    assert_eq!(first.high, 1_010_000);
    assert_eq!(first.low, 1_000_000);
    assert_eq!(first.close, 1_010_000);
    assert_eq!(first.buy_vol, 200_500_000);
    assert_eq!(first.sell_vol, 101_000_000);
    assert_eq!(first.buy_count, 2);
    assert_eq!(first.sell_count, 1);

    assert!(candles[1].is_empty(), "gap slot must be all-zero");
    assert_eq!(candles[2].close, 1_020_000);

    // One gap event (enqueued) and one parse event.
    assert_eq!(catalog.count_events(Some("gap")).unwrap(), 1);
    assert_eq!(catalog.count_events(Some("parts_short")).unwrap(), 1);
    let queue = catalog
        .iterate_gap_events_for_fix(&tradewind::GapFixFilter::default())
        .unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].start_line, 4);
    assert_eq!(queue[0].ts, Some(BASE + 200));
    assert_eq!(queue[0].gap_end_ts, Some(BASE + 120_200));
    assert_eq!(queue[0].gap_ms, Some(120_000));
}

#[test]
fn test_rerun_skips_processed_files_and_force_redoes_them() {
    let (tmp, root, catalog) = setup();
    let out_dir = tmp.path().join("candles");

    run_index(&catalog, &root, &IndexOptions::default()).unwrap();
    let mut opts = options(out_dir);
    run_process(&catalog, &opts, &AtomicBool::new(false)).unwrap();

    let second = run_process(&catalog, &opts, &AtomicBool::new(false)).unwrap();
    assert_eq!(second.files_processed, 0);
    assert_eq!(second.files_skipped, 1);
    assert_eq!(second.trades, 0, "skipped files are not re-read");

    opts.force = true;
    let forced = run_process(&catalog, &opts, &AtomicBool::new(false)).unwrap();
    assert_eq!(forced.files_processed, 1);
    assert_eq!(forced.files_skipped, 0);
}

#[test]
fn test_cancelled_run_processes_nothing() {
    let (tmp, root, catalog) = setup();
    run_index(&catalog, &root, &IndexOptions::default()).unwrap();

    let cancel = AtomicBool::new(true);
    let report = run_process(&catalog, &options(tmp.path().join("candles")), &cancel).unwrap();
    assert_eq!(report.files_processed, 0);
    assert_eq!(report.trades, 0);
}

#[test]
fn test_sparse_output_contains_only_populated_slots() {
    let (tmp, root, catalog) = setup();
    let out_dir = tmp.path().join("candles");
    run_index(&catalog, &root, &IndexOptions::default()).unwrap();

    let mut opts = options(out_dir.clone());
    opts.sparse = true;
    run_process(&catalog, &opts, &AtomicBool::new(false)).unwrap();

    let path = out_dir.join(format!("RAM_BYBIT_BTCUSD_1m_{}.sparse.bin", BASE));
    let records = tradewind::read_sparse(&path).unwrap();
    let slots: Vec<i64> = records.iter().map(|(slot, _)| *slot).collect();
    assert_eq!(slots, vec![BASE, BASE + 120_000], "no zero-fill in sparse output");
}

#[test]
fn test_market_filter_limits_processing() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("RAM");
    write_raw_file(&root, "BYBIT/BTCUSD/2023/05/02", &standard_lines());
    write_raw_file(&root, "BINANCE/BTCUSDT/2023/05/02", &standard_lines());
    let catalog = Catalog::open(&tmp.path().join("catalog.db")).unwrap();
    run_index(&catalog, &root, &IndexOptions::default()).unwrap();

    let mut opts = options(tmp.path().join("candles"));
    opts.filter.exchange = Some("BINANCE".to_string());
    let report = run_process(&catalog, &opts, &AtomicBool::new(false)).unwrap();
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.files_skipped, 0);
}

#[test]
fn test_worker_pool_processes_all_markets() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("RAM");
    for market in ["BYBIT/BTCUSD", "BINANCE/BTCUSDT", "KRAKEN/XBT-USD"] {
        write_raw_file(&root, &format!("{}/2023/05/02", market), &standard_lines());
    }
    let catalog = Catalog::open(&tmp.path().join("catalog.db")).unwrap();
    run_index(&catalog, &root, &IndexOptions::default()).unwrap();

    let mut opts = options(tmp.path().join("candles"));
    opts.workers = 3;
    let report = run_process(&catalog, &opts, &AtomicBool::new(false)).unwrap();
    assert_eq!(report.files_processed, 3);
    assert_eq!(report.trades, 12);
    assert_eq!(report.gaps, 3);
}

#[test]
fn test_missing_raw_file_marks_failed_and_continues() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("RAM");
    write_raw_file(&root, "BYBIT/BTCUSD/2023/05/02", &standard_lines());
    write_raw_file(&root, "BYBIT/BTCUSD/2023/05/03", &standard_lines());
    let catalog = Catalog::open(&tmp.path().join("catalog.db")).unwrap();
    run_index(&catalog, &root, &IndexOptions::default()).unwrap();

    // Remove one file after indexing; the driver must fail it and move on.
    fs::remove_file(root.join("BYBIT/BTCUSD/2023/05/02")).unwrap();

    let report = run_process(&catalog, &options(tmp.path().join("candles")), &AtomicBool::new(false))
        .unwrap();
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.files_processed, 1);

    let files = catalog.files_for_processing(&MarketFilter::default()).unwrap();
    let statuses: Vec<Option<&str>> =
        files.iter().map(|f| f.process_status.as_deref()).collect();
    assert!(statuses.contains(&Some("failed")));
    assert!(statuses.contains(&Some("processed")));
}

#[test]
fn test_gap_snapshot_persists_across_runs() {
    let (tmp, root, catalog) = setup();
    run_index(&catalog, &root, &IndexOptions::default()).unwrap();
    run_process(&catalog, &options(tmp.path().join("candles")), &AtomicBool::new(false)).unwrap();

    let snapshot = catalog
        .load_market_state("RAM", "BYBIT", "BTCUSD")
        .unwrap()
        .expect("snapshot stored at flush");
    assert_eq!(snapshot.last_trade_ts, Some(BASE + 120_200));
    assert!(snapshot.gap_samples > 0);
}
