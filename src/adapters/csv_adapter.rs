//! Delimited OHLC file adapter.
//!
//! Rows follow the exchange kline layout: open time, open, high, low, close,
//! volume, close time, ... Only columns 0 to 4 and 6 are read. A leading header
//! row is skipped when its first field is not numeric.

use std::fs::File;
use std::path::Path;

use crate::domain::error::EvotraderError;
use crate::domain::frame::{Dataset, OhlcvRow};
use crate::ports::data_port::DataPort;

const OPEN_TIME: usize = 0;
const OPEN: usize = 1;
const HIGH: usize = 2;
const LOW: usize = 3;
const CLOSE: usize = 4;
const CLOSE_TIME: usize = 6;

pub struct CsvAdapter {
    delimiter: u8,
}

impl Default for CsvAdapter {
    fn default() -> Self {
        Self::new(b',')
    }
}

impl CsvAdapter {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

fn field<'r>(
    record: &'r csv::StringRecord,
    index: usize,
    column: &str,
    line: u64,
) -> Result<&'r str, EvotraderError> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| EvotraderError::Data {
            reason: format!("line {line}: missing {column} column"),
        })
}

fn price(record: &csv::StringRecord, index: usize, column: &str, line: u64) -> Result<f64, EvotraderError> {
    let raw = field(record, index, column, line)?;
    raw.parse().map_err(|e| EvotraderError::Data {
        reason: format!("line {line}: invalid {column} value '{raw}': {e}"),
    })
}

/// Millisecond timestamp; accepts float notation such as `1.6409952e12`.
fn timestamp(record: &csv::StringRecord, index: usize, column: &str, line: u64) -> Result<i64, EvotraderError> {
    let raw = field(record, index, column, line)?;
    raw.parse::<i64>()
        .ok()
        .or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v as i64)
        })
        .ok_or_else(|| EvotraderError::Data {
            reason: format!("line {line}: invalid {column} value '{raw}'"),
        })
}

impl DataPort for CsvAdapter {
    fn load_series(&self, path: &Path, name: &str) -> Result<Dataset, EvotraderError> {
        let file = File::open(path).map_err(|e| EvotraderError::Data {
            reason: format!("failed to open {}: {}", path.display(), e),
        })?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(file);

        let mut rows = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| EvotraderError::Data {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let line = i as u64 + 1;

            let is_header = i == 0
                && record
                    .get(OPEN_TIME)
                    .is_some_and(|v| v.trim().parse::<f64>().is_err());
            if is_header {
                continue;
            }

            rows.push(OhlcvRow {
                open_time: timestamp(&record, OPEN_TIME, "open time", line)?,
                open: price(&record, OPEN, "open", line)?,
                high: price(&record, HIGH, "high", line)?,
                low: price(&record, LOW, "low", line)?,
                close: price(&record, CLOSE, "close", line)?,
                close_time: timestamp(&record, CLOSE_TIME, "close time", line)?,
            });
        }

        let dataset = Dataset::new(name, name, rows);
        dataset.ensure_not_empty()?;
        Ok(dataset)
    }
}
