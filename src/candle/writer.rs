//! Binary candle artifacts.
//!
//! Record layout is frozen: 56 bytes little-endian, in order open/high/low/
//! close (i32), buy_vol/sell_vol (i64), buy_count/sell_count (i32), liq_buy/
//! liq_sell (i64). Dense files carry one record per slot in `[min_slot,
//! max_slot]` with all-zero records marking gaps; sparse files prefix each
//! record with its i64 slot and carry only populated slots.
//!
//! Writes go to a temp sibling, fsync, then atomically rename over the
//! target; a candle file is never observable half-written.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{Candle, CandleAccumulator};
use crate::classify::Collector;

/// On-disk record size.
pub const CANDLE_BYTES: usize = 56;

/// Outcome of one artifact write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Records emitted (dense: including zero-fill; sparse: populated only).
    pub records: u64,
    /// Volume fields clamped to i64::MAX/MIN during serialization.
    pub saturated: u64,
}

/// `<collector>_<exchange>_<symbol>_<timeframe>_<startSlotMs>.bin`, with a
/// `.sparse.bin` suffix for sparse artifacts.
pub fn candle_file_name(
    collector: Collector,
    exchange: &str,
    symbol: &str,
    timeframe: &str,
    start_slot: i64,
    sparse: bool,
) -> String {
    let suffix = if sparse { "sparse.bin" } else { "bin" };
    format!("{}_{}_{}_{}_{}.{}", collector, exchange, symbol, timeframe, start_slot, suffix)
}

/// Write a dense artifact covering `[min_slot, max_slot]`.
///
/// Missing slots serialize as all-zero records. Empty accumulators write
/// nothing and return a zero report.
pub fn write_dense(path: &Path, acc: &CandleAccumulator) -> Result<WriteReport> {
    let (min_slot, max_slot) = match (acc.min_slot(), acc.max_slot()) {
        (Some(min), Some(max)) => (min, max),
        _ => return Ok(WriteReport::default()),
    };
    let step = acc.timeframe().ms();
    write_atomic(path, |w| {
        let mut report = WriteReport::default();
        let mut slots = acc.iter().peekable();
        let mut slot = min_slot;
        while slot <= max_slot {
            let candle = match slots.peek() {
                Some((s, c)) if **s == slot => {
                    let c = **c;
                    slots.next();
                    c
                }
                _ => Candle::default(),
            };
            report.saturated += write_record(w, &candle)?;
            report.records += 1;
            slot += step;
        }
        Ok(report)
    })
}

/// Write a sparse artifact: `(slot i64, record)` tuples for populated slots.
pub fn write_sparse(path: &Path, acc: &CandleAccumulator) -> Result<WriteReport> {
    if acc.is_empty() {
        return Ok(WriteReport::default());
    }
    write_atomic(path, |w| {
        let mut report = WriteReport::default();
        for (slot, candle) in acc.iter() {
            w.write_i64::<LittleEndian>(*slot)?;
            report.saturated += write_record(w, candle)?;
            report.records += 1;
        }
        Ok(report)
    })
}

/// Serialize one record. Returns the number of clamped volume fields.
fn write_record<W: Write>(w: &mut W, candle: &Candle) -> io::Result<u64> {
    let mut saturated = 0;
    w.write_i32::<LittleEndian>(candle.open)?;
    w.write_i32::<LittleEndian>(candle.high)?;
    w.write_i32::<LittleEndian>(candle.low)?;
    w.write_i32::<LittleEndian>(candle.close)?;
    w.write_i64::<LittleEndian>(clamp_volume(candle.buy_vol, &mut saturated))?;
    w.write_i64::<LittleEndian>(clamp_volume(candle.sell_vol, &mut saturated))?;
    w.write_i32::<LittleEndian>(candle.buy_count)?;
    w.write_i32::<LittleEndian>(candle.sell_count)?;
    w.write_i64::<LittleEndian>(clamp_volume(candle.liq_buy, &mut saturated))?;
    w.write_i64::<LittleEndian>(clamp_volume(candle.liq_sell, &mut saturated))?;
    Ok(saturated)
}

fn clamp_volume(v: i128, saturated: &mut u64) -> i64 {
    if v > i64::MAX as i128 {
        *saturated += 1;
        i64::MAX
    } else if v < i64::MIN as i128 {
        *saturated += 1;
        i64::MIN
    } else {
        v as i64
    }
}

fn read_record<R: Read>(r: &mut R) -> io::Result<Candle> {
    Ok(Candle {
        open: r.read_i32::<LittleEndian>()?,
        high: r.read_i32::<LittleEndian>()?,
        low: r.read_i32::<LittleEndian>()?,
        close: r.read_i32::<LittleEndian>()?,
        buy_vol: r.read_i64::<LittleEndian>()? as i128,
        sell_vol: r.read_i64::<LittleEndian>()? as i128,
        buy_count: r.read_i32::<LittleEndian>()?,
        sell_count: r.read_i32::<LittleEndian>()?,
        liq_buy: r.read_i64::<LittleEndian>()? as i128,
        liq_sell: r.read_i64::<LittleEndian>()? as i128,
    })
}

/// Read every record of a dense artifact.
pub fn read_dense(path: &Path) -> Result<Vec<Candle>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut out = Vec::new();
    loop {
        match read_record(&mut reader) {
            Ok(candle) => out.push(candle),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("read candle record"),
        }
    }
    Ok(out)
}

/// Read every `(slot, record)` tuple of a sparse artifact.
pub fn read_sparse(path: &Path) -> Result<Vec<(i64, Candle)>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut out = Vec::new();
    loop {
        let slot = match reader.read_i64::<LittleEndian>() {
            Ok(slot) => slot,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("read sparse slot"),
        };
        let candle = read_record(&mut reader).context("read candle record")?;
        out.push((slot, candle));
    }
    Ok(out)
}

/// Write via temp sibling + fsync + rename. The temp file is removed on any
/// failure.
fn write_atomic<F>(path: &Path, write: F) -> Result<WriteReport>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<WriteReport>,
{
    let tmp_path = temp_sibling(path);
    let result = (|| {
        let file = File::create(&tmp_path)
            .with_context(|| format!("create {}", tmp_path.display()))?;
        let mut writer = BufWriter::new(file);
        let report = write(&mut writer)?;
        let file = writer.into_inner().context("flush candle file")?;
        file.sync_all().context("sync candle file")?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("rename into {}", path.display()))?;
        Ok(report)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
