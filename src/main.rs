//! tradewind CLI - deterministic trade-log compaction and gap repair
//!
//! Usage: tradewind <command> [arguments]

mod cli;
mod common;
mod fixgaps_cmd;
mod index_cmd;
mod process_cmd;
mod registry_cmd;

use std::process::ExitCode;

use cli::{parse_args, print_usage, Command};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    // RUST_LOG overrides; default keeps drivers chatty enough to follow.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.len() >= 2 {
        match args[1].as_str() {
            "--help" | "-h" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            _ => {}
        }
    }
    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    init_logging();

    match parse_args() {
        Ok(Command::Index { root, db, batch, include, collector, config }) => {
            if let Err(e) = index_cmd::run_index_cmd(root, db, batch, include, collector, &config) {
                eprintln!("Error: {}", e);
                return ExitCode::from(1);
            }
            ExitCode::SUCCESS
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
        }) => {
            if let Err(e) = process_cmd::run_process_cmd(
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
                &config,
            ) {
                eprintln!("Error: {}", e);
                return ExitCode::from(1);
            }
            ExitCode::SUCCESS
        }
        Ok(Command::Registry { db, config }) => {
            if let Err(e) = registry_cmd::run_registry_cmd(db, &config) {
                eprintln!("Error: {}", e);
                return ExitCode::from(1);
            }
            ExitCode::SUCCESS
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
        }) => {
            if let Err(e) = fixgaps_cmd::run_fixgaps_cmd(
                db,
                root,
                collector,
                exchange,
                symbol,
                limit,
                retry_status,
                id,
                dry_run,
                &config,
            ) {
                eprintln!("Error: {}", e);
                return ExitCode::from(1);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            ExitCode::from(1)
        }
    }
}
