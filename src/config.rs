//! JSON configuration file.
//!
//! Recognized keys are camelCase; unknown keys are ignored and out-of-range
//! numbers fall back to defaults. Precedence is CLI flags over file values
//! over defaults — the resolution helpers here implement the last two
//! layers, the CLI applies the first.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "tradewind.json";

pub const DEFAULT_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_WORKERS: usize = 1;
pub const DEFAULT_FLUSH_INTERVAL_SECONDS: u64 = 10;
pub const DEFAULT_TIMEFRAME: &str = "1m";
pub const DEFAULT_DB_PATH: &str = "tradewind.db";
pub const DEFAULT_OUT_DIR: &str = "candles";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub root: Option<String>,
    pub db_path: Option<String>,
    pub batch_size: Option<i64>,
    pub include_paths: Vec<String>,
    pub collector: Option<String>,
    pub exchange: Option<String>,
    pub symbol: Option<String>,
    pub out_dir: Option<String>,
    pub force: Option<bool>,
    pub timeframe: Option<String>,
    pub sparse_output: Option<bool>,
    pub workers: Option<i64>,
    pub flush_interval_seconds: Option<i64>,
    pub notional_ceiling: Option<f64>,
}

impl Config {
    /// Load a config file. A missing explicit file is an error; use
    /// [`Config::load_default`] for the optional implicit one.
    pub fn load(path: &Path) -> Result<Config> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&data)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }

    /// Load `tradewind.json` from the working directory when present.
    pub fn load_default() -> Result<Config> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Config::load(path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn batch_size(&self) -> usize {
        match self.batch_size {
            Some(n) if n > 0 => n as usize,
            _ => DEFAULT_BATCH_SIZE,
        }
    }

    pub fn workers(&self) -> usize {
        match self.workers {
            Some(n) if n > 0 => n as usize,
            _ => DEFAULT_WORKERS,
        }
    }

    pub fn flush_interval_seconds(&self) -> u64 {
        match self.flush_interval_seconds {
            Some(n) if n > 0 => n as u64,
            _ => DEFAULT_FLUSH_INTERVAL_SECONDS,
        }
    }

    pub fn notional_ceiling(&self) -> f64 {
        match self.notional_ceiling {
            Some(c) if c.is_finite() && c > 0.0 => c,
            _ => crate::trade::DEFAULT_NOTIONAL_CEILING,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(self.db_path.as_deref().unwrap_or(DEFAULT_DB_PATH))
    }

    pub fn out_dir(&self) -> PathBuf {
        PathBuf::from(self.out_dir.as_deref().unwrap_or(DEFAULT_OUT_DIR))
    }
}
