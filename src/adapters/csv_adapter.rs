//! CSV bar file adapter.
//!
//! Expects a header row with `timestamp,open,high,low,close,volume` (extra
//! columns are ignored). Timestamps may be epoch milliseconds, RFC 3339, or
//! `%Y-%m-%d %H:%M:%S` in UTC. Prices must be finite and positive and
//! volume finite and non-negative. Rows are returned sorted ascending with
//! duplicate timestamps dropped.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::bar::Bar;
use crate::domain::error::TraderError;
use crate::ports::data_port::DataPort;

const NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "time", alias = "open_time", alias = "date")]
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_bars(&self) -> Result<Vec<Bar>, TraderError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| csv_error(&self.path, e))?;

        let mut bars = Vec::new();
        for (row, result) in reader.deserialize::<CsvRow>().enumerate() {
            let raw = result.map_err(|e| csv_error(&self.path, e))?;
            let timestamp = parse_timestamp(&raw.timestamp).ok_or_else(|| TraderError::DataFormat {
                reason: format!(
                    "{}: row {}: unrecognized timestamp '{}'",
                    self.path.display(),
                    row + 1,
                    raw.timestamp
                ),
            })?;
            let bar = Bar {
                timestamp,
                open: raw.open,
                high: raw.high,
                low: raw.low,
                close: raw.close,
                volume: raw.volume,
            };
            if let Some(field) = bar.invalid_field() {
                return Err(TraderError::DataFormat {
                    reason: format!("{}: row {}: invalid {}", self.path.display(), row + 1, field),
                });
            }
            bars.push(bar);
        }

        let total = bars.len();
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        if bars.len() != total {
            warn!(
                path = %self.path.display(),
                dropped = total - bars.len(),
                "dropped bars with duplicate timestamps"
            );
        }
        debug!(path = %self.path.display(), bars = bars.len(), "loaded CSV bars");
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, TraderError> {
        let bars = self.load_bars()?;
        if bars.is_empty() {
            return Err(TraderError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }
}

fn csv_error(path: &Path, e: csv::Error) -> TraderError {
    if e.is_io_error() {
        if let csv::ErrorKind::Io(io) = e.into_kind() {
            return TraderError::Io(io);
        }
        return TraderError::DataFormat {
            reason: format!("{}: read failed", path.display()),
        };
    }
    TraderError::DataFormat {
        reason: format!("{}: {}", path.display(), e),
    }
}

/// Parse epoch milliseconds, RFC 3339, or `%Y-%m-%d %H:%M:%S` (UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Utc.timestamp_millis_opt(ms).single();
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
