//! Data-quality events and their accumulator.
//!
//! Anomalies detected while streaming a file (parse rejects, gaps) coalesce
//! into events with line ranges: adjacent same-kind anomalies widen one open
//! event instead of producing a row per line.

use crate::trade::RejectReason;

/// Event discriminant. Stored as text in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Gap,
    ParseError,
    AdapterError,
    MissingAdapter,
    PartsShort,
    NonFinite,
    NotionalTooLarge,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Gap => "gap",
            EventKind::ParseError => "parse_error",
            EventKind::AdapterError => "adapter_error",
            EventKind::MissingAdapter => "missing_adapter",
            EventKind::PartsShort => "parts_short",
            EventKind::NonFinite => "non_finite",
            EventKind::NotionalTooLarge => "notional_too_large",
        }
    }

    pub fn from_str(s: &str) -> Option<EventKind> {
        match s {
            "gap" => Some(EventKind::Gap),
            "parse_error" => Some(EventKind::ParseError),
            "adapter_error" => Some(EventKind::AdapterError),
            "missing_adapter" => Some(EventKind::MissingAdapter),
            "parts_short" => Some(EventKind::PartsShort),
            "non_finite" => Some(EventKind::NonFinite),
            "notional_too_large" => Some(EventKind::NotionalTooLarge),
            _ => None,
        }
    }
}

impl From<RejectReason> for EventKind {
    fn from(reason: RejectReason) -> EventKind {
        match reason {
            RejectReason::PartsShort => EventKind::PartsShort,
            RejectReason::NonFinite => EventKind::NonFinite,
            RejectReason::NotionalTooLarge => EventKind::NotionalTooLarge,
        }
    }
}

/// Gap payload carried by gap events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GapMeta {
    pub gap_ms: i64,
    pub gap_miss: i64,
    /// Timestamp of the trade that closed the gap.
    pub gap_end_ts: i64,
}

/// An accumulated event with a contiguous line range.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEvent {
    pub kind: EventKind,
    /// 1-based inclusive line range.
    pub start_line: u64,
    pub end_line: u64,
    /// Timestamp associated with the first anomaly, when known.
    pub ts: Option<i64>,
    pub gap: Option<GapMeta>,
}

/// Coalesces adjacent same-kind anomalies. Holds at most one open event.
#[derive(Debug, Default)]
pub struct EventAccumulator {
    open: Option<FileEvent>,
    closed: Vec<FileEvent>,
}

impl EventAccumulator {
    pub fn new() -> EventAccumulator {
        EventAccumulator::default()
    }

    /// Record an anomaly at `line`.
    ///
    /// Same-kind anomalies extend the open event's line range; for gaps the
    /// largest `gap_ms` wins while `gap_miss`/`gap_end_ts` track the latest
    /// observation. A different kind closes the open event first.
    pub fn record(&mut self, kind: EventKind, line: u64, ts: Option<i64>, gap: Option<GapMeta>) {
        if let Some(open) = &mut self.open {
            if open.kind == kind {
                open.end_line = line;
                if let (Some(existing), Some(new)) = (&mut open.gap, gap) {
                    existing.gap_ms = existing.gap_ms.max(new.gap_ms);
                    existing.gap_miss = new.gap_miss;
                    existing.gap_end_ts = new.gap_end_ts;
                }
                return;
            }
        }
        self.close_open();
        self.open = Some(FileEvent {
            kind,
            start_line: line,
            end_line: line,
            ts,
            gap,
        });
    }

    /// Flush the open event and drain everything accumulated so far.
    pub fn finish(&mut self) -> Vec<FileEvent> {
        self.close_open();
        std::mem::take(&mut self.closed)
    }

    fn close_open(&mut self) {
        if let Some(event) = self.open.take() {
            self.closed.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacent_same_kind_coalesce() {
        let mut acc = EventAccumulator::new();
        acc.record(EventKind::PartsShort, 3, None, None);
        acc.record(EventKind::PartsShort, 4, None, None);
        acc.record(EventKind::PartsShort, 5, None, None);
        let events = acc.finish();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_line, 3);
        assert_eq!(events[0].end_line, 5);
    }

    #[test]
    fn test_kind_change_closes_event() {
        let mut acc = EventAccumulator::new();
        acc.record(EventKind::PartsShort, 1, None, None);
        acc.record(EventKind::NonFinite, 2, None, None);
        acc.record(EventKind::PartsShort, 3, None, None);
        let events = acc.finish();
        assert_eq!(events.len(), 3);
        // No two adjacent entries share a kind.
        for pair in events.windows(2) {
            assert_ne!(pair[0].kind, pair[1].kind);
        }
    }

    #[test]
    fn test_gap_keeps_max_gap_ms_and_latest_end() {
        let mut acc = EventAccumulator::new();
        acc.record(
            EventKind::Gap,
            10,
            Some(1_000),
            Some(GapMeta { gap_ms: 5_000, gap_miss: 4, gap_end_ts: 6_000 }),
        );
        acc.record(
            EventKind::Gap,
            11,
            Some(6_000),
            Some(GapMeta { gap_ms: 2_000, gap_miss: 1, gap_end_ts: 8_000 }),
        );
        let events = acc.finish();
        assert_eq!(events.len(), 1);
        let gap = events[0].gap.unwrap();
        assert_eq!(gap.gap_ms, 5_000, "max gap_ms wins");
        assert_eq!(gap.gap_miss, 1, "latest gap_miss wins");
        assert_eq!(gap.gap_end_ts, 8_000, "latest end ts wins");
        assert_eq!(events[0].ts, Some(1_000), "first anomaly ts is kept");
    }

    #[test]
    fn test_finish_is_drain() {
        let mut acc = EventAccumulator::new();
        acc.record(EventKind::Gap, 1, None, None);
        assert_eq!(acc.finish().len(), 1);
        assert_eq!(acc.finish().len(), 0);
    }

    #[test]
    fn test_kind_strings_roundtrip() {
        for kind in [
            EventKind::Gap,
            EventKind::ParseError,
            EventKind::AdapterError,
            EventKind::MissingAdapter,
            EventKind::PartsShort,
            EventKind::NonFinite,
            EventKind::NotionalTooLarge,
        ] {
            assert_eq!(EventKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_str("bogus"), None);
    }
}
