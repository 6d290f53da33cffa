//! Indexer driver: walk → classify → batched catalog upsert.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::catalog::files::NewFile;
use crate::catalog::Catalog;
use crate::classify::{classify_path, Collector};
use crate::walk::Walker;

/// How many skipped paths are logged before going quiet.
const SKIP_LOG_LIMIT: u64 = 50;
/// Progress cadence, in walked entries.
const PROGRESS_EVERY: u64 = 10_000;

/// Indexing options.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Batch size for catalog inserts.
    pub batch_size: usize,
    /// Walk only these prefixes (relative to the root) when non-empty.
    pub include_prefixes: Vec<String>,
    /// Collector override; defaults to the root basename when it names one.
    pub collector: Option<Collector>,
    /// Show a progress bar.
    pub progress: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            batch_size: 1_000,
            include_prefixes: Vec::new(),
            collector: None,
            progress: false,
        }
    }
}

/// Final indexing counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub seen: u64,
    pub inserted: u64,
    pub existing: u64,
    pub conflicts: u64,
    pub skipped: u64,
}

/// Index one root into the catalog.
///
/// Re-runnable: a second run over an unchanged tree reports
/// `inserted = 0, existing = seen - skipped`.
pub fn run_index(catalog: &Catalog, root: &Path, options: &IndexOptions) -> Result<IndexReport> {
    let root = root
        .canonicalize()
        .with_context(|| format!("resolve root {}", root.display()))?;
    let root_str = root
        .to_str()
        .ok_or_else(|| anyhow!("root path is not valid UTF-8: {}", root.display()))?;
    let root_id = catalog.ensure_root(root_str)?;

    let collector_hint = options.collector.or_else(|| {
        root.file_name()
            .and_then(|n| n.to_str())
            .and_then(Collector::from_segment)
    });

    let bar = if options.progress {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Some(bar)
    } else {
        None
    };

    let mut report = IndexReport::default();
    let mut batch: Vec<NewFile> = Vec::with_capacity(options.batch_size);
    let walker = Walker::with_prefixes(&root, &options.include_prefixes);

    for entry in walker {
        report.seen += 1;
        if report.seen % PROGRESS_EVERY == 0 {
            if let Some(bar) = &bar {
                bar.set_message(format!(
                    "indexed {} entries ({} skipped)",
                    report.seen, report.skipped
                ));
                bar.tick();
            }
            info!(seen = report.seen, skipped = report.skipped, "indexing");
        }

        match classify_path(&entry.relative_path, collector_hint) {
            Some(classified) => {
                batch.push(NewFile {
                    root_id,
                    relative_path: entry.relative_path,
                    classified,
                });
                if batch.len() >= options.batch_size {
                    flush_batch(catalog, &mut batch, &mut report)?;
                }
            }
            None => {
                report.skipped += 1;
                if report.skipped <= SKIP_LOG_LIMIT {
                    debug!(path = %entry.relative_path, "skipped unrecognized path");
                }
            }
        }
    }
    flush_batch(catalog, &mut batch, &mut report)?;

    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }
    if report.conflicts > 0 {
        warn!(
            conflicts = report.conflicts,
            "classifier conflicts were recorded, stored rows kept"
        );
    }
    info!(
        seen = report.seen,
        inserted = report.inserted,
        existing = report.existing,
        conflicts = report.conflicts,
        skipped = report.skipped,
        "index complete"
    );
    Ok(report)
}

fn flush_batch(catalog: &Catalog, batch: &mut Vec<NewFile>, report: &mut IndexReport) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let outcome = catalog.insert_files(batch)?;
    report.inserted += outcome.inserted;
    report.existing += outcome.existing;
    report.conflicts += outcome.conflicts;
    batch.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_root(files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        // Root basename carries the collector hint.
        let root = tmp.path().join("RAM");
        for f in files {
            let path = root.join(f);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"1 1 1 1\n").unwrap();
        }
        tmp
    }

    #[test]
    fn test_index_counts_and_idempotence() {
        let tmp = make_root(&[
            "BINANCE/BTCUSDT/2023/05/01",
            "BINANCE/BTCUSDT/2023/05/02",
            "notes/readme.txt",
        ]);
        let root = tmp.path().join("RAM");
        let catalog = Catalog::open_in_memory().unwrap();

        let first = run_index(&catalog, &root, &IndexOptions::default()).unwrap();
        assert_eq!(first.seen, 3);
        assert_eq!(first.inserted, 2);
        assert_eq!(first.skipped, 1);
        assert_eq!(first.existing, 0);

        let second = run_index(&catalog, &root, &IndexOptions::default()).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.existing, second.seen - second.skipped);
    }

    #[test]
    fn test_small_batch_size_still_indexes_everything() {
        let tmp = make_root(&[
            "BINANCE/BTCUSDT/2023/05/01",
            "BINANCE/BTCUSDT/2023/05/02",
            "BINANCE/BTCUSDT/2023/05/03",
        ]);
        let root = tmp.path().join("RAM");
        let catalog = Catalog::open_in_memory().unwrap();
        let options = IndexOptions { batch_size: 1, ..IndexOptions::default() };
        let report = run_index(&catalog, &root, &options).unwrap();
        assert_eq!(report.inserted, 3);
    }

    #[test]
    fn test_collector_hint_from_root_basename() {
        let tmp = make_root(&["BINANCE/BTCUSDT/2023-05-01.txt"]);
        let root = tmp.path().join("RAM");
        let catalog = Catalog::open_in_memory().unwrap();
        run_index(&catalog, &root, &IndexOptions::default()).unwrap();
        let files = catalog
            .files_for_processing(&crate::catalog::files::MarketFilter::default())
            .unwrap();
        assert_eq!(files[0].collector, "RAM");
    }

    #[test]
    fn test_include_prefixes_restrict_indexing() {
        let tmp = make_root(&[
            "BINANCE/BTCUSDT/2023/05/01",
            "KRAKEN/XBT-USD/2023/05/01",
        ]);
        let root = tmp.path().join("RAM");
        let catalog = Catalog::open_in_memory().unwrap();
        let options = IndexOptions {
            include_prefixes: vec!["BINANCE".to_string()],
            ..IndexOptions::default()
        };
        let report = run_index(&catalog, &root, &options).unwrap();
        assert_eq!(report.seen, 1);
        assert_eq!(report.inserted, 1);
    }
}
