//! Tradewind: deterministic trade-log compaction.
//!
//! Tradewind walks collector trees of raw exchange trade logs, indexes them
//! into a SQLite catalog, compacts them into fixed-layout binary candle
//! files, and repairs detected trade gaps from exchange public archives.

pub mod adapters;
pub mod candle;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod events;
pub mod fixgaps;
pub mod gap;
pub mod http;
pub mod indexer;
pub mod logical;
pub mod process;
pub mod timeframe;
pub mod trade;
pub mod walk;

pub use adapters::{AdapterRegistry, ExchangeAdapter, RecoverRequest, TimeWindow};
pub use candle::writer::{candle_file_name, read_dense, read_sparse, CANDLE_BYTES};
pub use candle::{Candle, CandleAccumulator};
pub use catalog::events::{GapFixFilter, GapFixRow};
pub use catalog::files::{InsertOutcome, MarketFilter};
pub use catalog::Catalog;
pub use classify::{classify_path, ClassifiedFile, Collector, Era};
pub use config::Config;
pub use events::{EventAccumulator, EventKind, FileEvent};
pub use fixgaps::{run_fixgaps, FixOptions, FixReport};
pub use gap::{GapSnapshot, GapTracker};
pub use http::{Fetcher, HostPolicy, HttpResponse, RateLimitedClient, ReqwestFetcher};
pub use indexer::{run_index, IndexOptions, IndexReport};
pub use process::{run_process, ProcessOptions, ProcessReport};
pub use timeframe::Timeframe;
pub use trade::{parse_line, ParsedLine, RejectReason, Side, Trade};
pub use walk::{WalkEntry, Walker};
