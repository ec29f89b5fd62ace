//! CSV ingest for candle datasets.
//!
//! Expected layout, one row per `(symbol, timestamp)`:
//!
//! ```text
//! symbol,timestamp,open,high,low,close,volume,is_traded[,indicator...]
//! ```
//!
//! Timestamps are RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC), or integer epoch
//! milliseconds. Empty cells are kept as missing values so the kernel's
//! validation reports them precisely. Key columns (`symbol`, `timestamp`) are
//! checked here; the candle columns are checked by `validate_dataset`.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use tradesim_core::{RawCandle, RawDataset};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("row {row}: invalid timestamp '{value}'")]
    Timestamp { row: usize, value: String },

    #[error("row {row}: column '{column}' is not a number: '{value}'")]
    Number {
        row: usize,
        column: String,
        value: String,
    },

    #[error("row {row}: is_traded must be a boolean, got '{value}'")]
    Flag { row: usize, value: String },
}

/// Read a dataset from a CSV file.
pub fn load_csv(path: &Path, symbols: &[String]) -> Result<RawDataset, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = read_csv(file, symbols)?;
    debug!(path = %path.display(), rows = raw.len(), "loaded dataset");
    Ok(raw)
}

/// Read a dataset from any CSV source.
pub fn read_csv<R: Read>(reader: R, symbols: &[String]) -> Result<RawDataset, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let position = |name: &str| headers.iter().position(|h| h == name);
    let symbol_col = position("symbol").ok_or_else(|| LoadError::MissingColumn("symbol".into()))?;
    let ts_col =
        position("timestamp").ok_or_else(|| LoadError::MissingColumn("timestamp".into()))?;

    let data_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != symbol_col && i != ts_col)
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut rows = Vec::new();
    for (n, record) in rdr.records().enumerate() {
        let record = record?;
        // 1-based, counting the header line.
        let row = n + 2;
        let cell = |i: usize| record.get(i).unwrap_or("");

        let timestamp = parse_timestamp(cell(ts_col)).ok_or_else(|| LoadError::Timestamp {
            row,
            value: cell(ts_col).to_string(),
        })?;

        let mut candle = RawCandle {
            symbol: cell(symbol_col).to_string(),
            timestamp,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
            is_traded: None,
            extra: BTreeMap::new(),
        };

        for (i, column) in &data_columns {
            let value = cell(*i);
            if column == "is_traded" {
                candle.is_traded = parse_flag(value).map_err(|_| LoadError::Flag {
                    row,
                    value: value.to_string(),
                })?;
                continue;
            }
            let number = parse_number(value).map_err(|_| LoadError::Number {
                row,
                column: column.clone(),
                value: value.to_string(),
            })?;
            match column.as_str() {
                "open" => candle.open = number,
                "high" => candle.high = number,
                "low" => candle.low = number,
                "close" => candle.close = number,
                "volume" => candle.volume = number,
                other => {
                    candle.extra.insert(other.to_string(), number);
                }
            }
        }
        rows.push(candle);
    }

    Ok(RawDataset {
        columns: data_columns.into_iter().map(|(_, c)| c).collect(),
        symbols: symbols.to_vec(),
        rows,
    })
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Empty → missing; anything else must parse.
fn parse_number(value: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    if value.is_empty() {
        return Ok(None);
    }
    value.parse::<f64>().map(Some)
}

fn parse_flag(value: &str) -> Result<Option<bool>, ()> {
    match value.to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "true" | "1" | "yes" => Ok(Some(true)),
        "false" | "0" | "no" => Ok(Some(false)),
        _ => Err(()),
    }
}
