//! Raw OHLC rows, datasets, and resampled candle frames.

use std::sync::Arc;

use chrono::DateTime;

use crate::domain::error::EvotraderError;

/// Minutes in one day; raw rows are one-minute bars.
pub const MINUTES_PER_DAY: usize = 1440;

/// One fine-grained OHLC row as supplied by the data port.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OhlcvRow {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub close_time: i64,
}

impl OhlcvRow {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// A named price series.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub symbol: String,
    pub rows: Vec<OhlcvRow>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, rows: Vec<OhlcvRow>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fail fast on a dataset with no rows.
    pub fn ensure_not_empty(&self) -> Result<(), EvotraderError> {
        if self.rows.is_empty() {
            return Err(EvotraderError::EmptyDataset {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// A candle at the strategy's operating timeframe.
///
/// Only frames with `is_closed` drive strategy logic; intra-candle frames
/// carry the running high/low of the candle being built.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub symbol: Arc<str>,
    pub start_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub is_closed: bool,
}

impl Frame {
    /// Reject frames whose prices cannot be traded on.
    pub fn validate(&self) -> Result<(), EvotraderError> {
        let prices = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        for (field, value) in prices {
            if !value.is_finite() || value <= 0.0 {
                return Err(EvotraderError::MalformedFrame {
                    start_time: self.start_time,
                    reason: format!("{field} price {value} is not a positive number"),
                });
            }
        }
        Ok(())
    }
}

const TIMEFRAME_FLAGS: [(&str, usize); 12] = [
    ("1m", 1),
    ("3m", 3),
    ("5m", 5),
    ("15m", 15),
    ("30m", 30),
    ("1h", 60),
    ("2h", 120),
    ("4h", 240),
    ("6h", 360),
    ("8h", 480),
    ("12h", 720),
    ("1d", 1440),
];

/// Parse a timeframe given either as plain minutes (`"15"`) or as a flag (`"15m"`, `"4h"`).
pub fn parse_timeframe(input: &str) -> Option<usize> {
    let trimmed = input.trim();
    if let Ok(minutes) = trimmed.parse::<usize>() {
        return (minutes > 0).then_some(minutes);
    }
    TIMEFRAME_FLAGS
        .iter()
        .find(|(flag, _)| flag.eq_ignore_ascii_case(trimmed))
        .map(|&(_, minutes)| minutes)
}

/// Flag for a timeframe in minutes, falling back to `"<n>m"`.
pub fn timeframe_flag(minutes: usize) -> String {
    TIMEFRAME_FLAGS
        .iter()
        .find(|&&(_, m)| m == minutes)
        .map(|(flag, _)| flag.to_string())
        .unwrap_or_else(|| format!("{minutes}m"))
}

/// Render a millisecond epoch timestamp as RFC 3339.
pub fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
