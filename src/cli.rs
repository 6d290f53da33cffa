//! CLI argument parsing for tradewind.
//!
//! Defines the Command enum and parse_args() for all commands. Flags
//! override config-file values, which override defaults; the command
//! runners apply the merge.

use anyhow::Result;
use std::path::PathBuf;

pub fn print_usage() {
    eprintln!("tradewind - Deterministic trade-log compaction and gap repair");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  tradewind <command> [arguments]");
    eprintln!("  tradewind --help");
    eprintln!();
    eprintln!("  tradewind index --root <DIR> [--db <FILE>] [--batch <N>] [--include <PATH>]... [--collector <RAM|PI>]");
    eprintln!("  tradewind process [--db <FILE>] [--collector <C>] [--exchange <EX>] [--symbol <SYM>] [--timeframe <TF>]");
    eprintln!("                    [--outdir <DIR>] [--force] [--sparse] [--workers <N>] [--flush-interval <SECS>]");
    eprintln!("  tradewind registry [--db <FILE>]");
    eprintln!("  tradewind fixgaps [--db <FILE>] [--root <DIR>] [--collector <C>] [--exchange <EX>] [--symbol <SYM>]");
    eprintln!("                    [--limit <N>] [--retry-status <S,S>] [--id <N>] [--dry-run]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  index      Walk a collector root and index trade-log files into the catalog");
    eprintln!("  process    Compact indexed files into binary candle artifacts and quality events");
    eprintln!("  registry   List recovery adapters and gap-fix queue status");
    eprintln!("  fixgaps    Recover missing trades for detected gaps from exchange archives");
    eprintln!();
    eprintln!("Global arguments:");
    eprintln!("  --config <FILE>     Config file (default: tradewind.json when present)");
    eprintln!("  --no-config         Ignore any config file");
    eprintln!();
    eprintln!("Index arguments:");
    eprintln!("  --root <DIR>        Collector root to walk (basename RAM or PI hints the collector)");
    eprintln!("  --db <FILE>         Path to catalog database (default: tradewind.db)");
    eprintln!("  --batch <N>         Catalog insert batch size (default: 1000)");
    eprintln!("  --include <PATH>    Walk only this prefix, relative to root (repeatable)");
    eprintln!("  --collector <C>     Collector override: RAM or PI");
    eprintln!();
    eprintln!("Process arguments:");
    eprintln!("  --db <FILE>         Path to catalog database");
    eprintln!("  --collector <C>     Only this collector");
    eprintln!("  --exchange <EX>     Only this exchange");
    eprintln!("  --symbol <SYM>      Only this symbol");
    eprintln!("  --timeframe <TF>    Aggregation period <n><s|m|h|d> (default: 1m)");
    eprintln!("  --outdir <DIR>      Candle output directory (default: candles)");
    eprintln!("  --force             Re-process files already marked processed");
    eprintln!("  --sparse            Write sparse artifacts (populated slots only)");
    eprintln!("  --workers <N>       Process markets concurrently (default: 1)");
    eprintln!("  --flush-interval <SECS>  Periodic flush for long files (default: 10)");
    eprintln!();
    eprintln!("Fixgaps arguments:");
    eprintln!("  --db <FILE>         Path to catalog database");
    eprintln!("  --root <DIR>        Logical store root recoveries merge into (contains the collector trees)");
    eprintln!("  --limit <N>         At most N queue rows");
    eprintln!("  --retry-status <S,S>  Re-open rows with these statuses (e.g. failed:adapter_error)");
    eprintln!("  --id <N>            Only this event id, regardless of status");
    eprintln!("  --dry-run           Extract and fetch but do not merge or update the queue");
}

/// Where the config file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `tradewind.json` in the working directory, when present.
    Default,
    /// Explicit `--config` path; missing file is an error.
    File(PathBuf),
    /// `--no-config`.
    Disabled,
}

#[derive(Debug)]
pub enum Command {
    Index {
        root: Option<PathBuf>,
        db: Option<PathBuf>,
        batch: Option<usize>,
        include: Vec<String>,
        collector: Option<String>,
        config: ConfigSource,
    },
    Process {
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
        config: ConfigSource,
    },
    Registry {
        db: Option<PathBuf>,
        config: ConfigSource,
    },
    Fixgaps {
        db: Option<PathBuf>,
        root: Option<PathBuf>,
        collector: Option<String>,
        exchange: Option<String>,
        symbol: Option<String>,
        limit: Option<u64>,
        retry_status: Vec<String>,
        id: Option<i64>,
        dry_run: bool,
        config: ConfigSource,
    },
}

/// Parse process arguments (argv[1] is the command word).
pub fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        return Err(anyhow::anyhow!("missing command"));
    }
    let command = args[1].as_str();
    let rest = &args[2..];
    match command {
        "index" => parse_index_args(rest),
        "process" => parse_process_args(rest),
        "registry" => parse_registry_args(rest),
        "fixgaps" => parse_fixgaps_args(rest),
        _ => Err(anyhow::anyhow!("unknown command: {}", command)),
    }
}

/// Helper to parse a required string argument.
///
/// Returns the next argument value and increments index by 2, or errors
/// when no value follows the flag.
fn parse_required_arg(args: &[String], i: &mut usize, flag: &str) -> Result<String> {
    if *i + 1 >= args.len() {
        return Err(anyhow::anyhow!("{} requires an argument", flag));
    }
    let value = args[*i + 1].clone();
    *i += 2;
    Ok(value)
}

/// Helper to parse a PathBuf argument.
fn parse_path_arg(args: &[String], i: &mut usize, flag: &str) -> Result<PathBuf> {
    let value = parse_required_arg(args, i, flag)?;
    Ok(PathBuf::from(value))
}

/// Helper to parse an integer argument.
fn parse_int_arg<T: std::str::FromStr>(args: &[String], i: &mut usize, flag: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let value = parse_required_arg(args, i, flag)?;
    value
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", flag, e))
}

/// `--config` / `--no-config`, shared by every command. Returns true when
/// the flag at `i` was consumed.
fn parse_config_flag(args: &[String], i: &mut usize, config: &mut ConfigSource) -> Result<bool> {
    match args[*i].as_str() {
        "--config" => {
            *config = ConfigSource::File(parse_path_arg(args, i, "--config")?);
            Ok(true)
        }
        "--no-config" => {
            *config = ConfigSource::Disabled;
            *i += 1;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn parse_index_args(args: &[String]) -> Result<Command> {
    let mut root: Option<PathBuf> = None;
    let mut db: Option<PathBuf> = None;
    let mut batch: Option<usize> = None;
    let mut include: Vec<String> = Vec::new();
    let mut collector: Option<String> = None;
    let mut config = ConfigSource::Default;

    let mut i = 0;
    while i < args.len() {
        if parse_config_flag(args, &mut i, &mut config)? {
            continue;
        }
        match args[i].as_str() {
            "--root" => root = Some(parse_path_arg(args, &mut i, "--root")?),
            "--db" => db = Some(parse_path_arg(args, &mut i, "--db")?),
            "--batch" => batch = Some(parse_int_arg(args, &mut i, "--batch")?),
            "--include" => include.push(parse_required_arg(args, &mut i, "--include")?),
            "--collector" => collector = Some(parse_required_arg(args, &mut i, "--collector")?),
            _ => return Err(anyhow::anyhow!("Unknown argument: {}", args[i])),
        }
    }

    Ok(Command::Index { root, db, batch, include, collector, config })
}

fn parse_process_args(args: &[String]) -> Result<Command> {
    let mut db: Option<PathBuf> = None;
    let mut collector: Option<String> = None;
    let mut exchange: Option<String> = None;
    let mut symbol: Option<String> = None;
    let mut timeframe: Option<String> = None;
    let mut outdir: Option<PathBuf> = None;
    let mut force = false;
    let mut sparse = false;
    let mut workers: Option<usize> = None;
    let mut flush_interval: Option<u64> = None;
    let mut config = ConfigSource::Default;

    let mut i = 0;
    while i < args.len() {
        if parse_config_flag(args, &mut i, &mut config)? {
            continue;
        }
        match args[i].as_str() {
            "--db" => db = Some(parse_path_arg(args, &mut i, "--db")?),
            "--collector" => collector = Some(parse_required_arg(args, &mut i, "--collector")?),
            "--exchange" => exchange = Some(parse_required_arg(args, &mut i, "--exchange")?),
            "--symbol" => symbol = Some(parse_required_arg(args, &mut i, "--symbol")?),
            "--timeframe" => timeframe = Some(parse_required_arg(args, &mut i, "--timeframe")?),
            "--outdir" => outdir = Some(parse_path_arg(args, &mut i, "--outdir")?),
            "--force" => {
                force = true;
                i += 1;
            }
            "--sparse" => {
                sparse = true;
                i += 1;
            }
            "--workers" => workers = Some(parse_int_arg(args, &mut i, "--workers")?),
            "--flush-interval" => {
                flush_interval = Some(parse_int_arg(args, &mut i, "--flush-interval")?)
            }
            _ => return Err(anyhow::anyhow!("Unknown argument: {}", args[i])),
        }
    }

    Ok(Command::Process {
        db,
        collector,
        exchange,
        symbol,
        timeframe,
        outdir,
        force,
        sparse,
        workers,
        flush_interval,
        config,
    })
}

fn parse_registry_args(args: &[String]) -> Result<Command> {
    let mut db: Option<PathBuf> = None;
    let mut config = ConfigSource::Default;

    let mut i = 0;
    while i < args.len() {
        if parse_config_flag(args, &mut i, &mut config)? {
            continue;
        }
        match args[i].as_str() {
            "--db" => db = Some(parse_path_arg(args, &mut i, "--db")?),
            _ => return Err(anyhow::anyhow!("Unknown argument: {}", args[i])),
        }
    }

    Ok(Command::Registry { db, config })
}

fn parse_fixgaps_args(args: &[String]) -> Result<Command> {
    let mut db: Option<PathBuf> = None;
    let mut root: Option<PathBuf> = None;
    let mut collector: Option<String> = None;
    let mut exchange: Option<String> = None;
    let mut symbol: Option<String> = None;
    let mut limit: Option<u64> = None;
    let mut retry_status: Vec<String> = Vec::new();
    let mut id: Option<i64> = None;
    let mut dry_run = false;
    let mut config = ConfigSource::Default;

    let mut i = 0;
    while i < args.len() {
        if parse_config_flag(args, &mut i, &mut config)? {
            continue;
        }
        match args[i].as_str() {
            "--db" => db = Some(parse_path_arg(args, &mut i, "--db")?),
            "--root" => root = Some(parse_path_arg(args, &mut i, "--root")?),
            "--collector" => collector = Some(parse_required_arg(args, &mut i, "--collector")?),
            "--exchange" => exchange = Some(parse_required_arg(args, &mut i, "--exchange")?),
            "--symbol" => symbol = Some(parse_required_arg(args, &mut i, "--symbol")?),
            "--limit" => limit = Some(parse_int_arg(args, &mut i, "--limit")?),
            "--retry-status" => {
                let list = parse_required_arg(args, &mut i, "--retry-status")?;
                retry_status.extend(
                    list.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty()),
                );
            }
            "--id" => id = Some(parse_int_arg(args, &mut i, "--id")?),
            "--dry-run" => {
                dry_run = true;
                i += 1;
            }
            _ => return Err(anyhow::anyhow!("Unknown argument: {}", args[i])),
        }
    }

    Ok(Command::Fixgaps {
        db,
        root,
        collector,
        exchange,
        symbol,
        limit,
        retry_status,
        id,
        dry_run,
        config,
    })
}
