//! One-shot dataset validation.
//!
//! Checks, in order:
//! 1. the dataset is non-empty and the interval is positive
//! 2. every required column is declared in the header
//! 3. every `(symbol, timestamp)` key is unique
//! 4. no required or declared extra value is missing (None or NaN)
//! 5. prices are strictly positive
//! 6. every timestamp sits on the `start + k·interval` lattice
//! 7. every lattice point carries every tracked symbol
//!
//! The first violation found is reported.

use super::dataset::{fingerprint, lattice_offset, Dataset, RawDataset};
use crate::domain::{Candle, MarketSlice, REQUIRED_COLUMNS};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

/// A specific reason a dataset was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataValidationError {
    #[error("dataset is empty")]
    Empty,

    #[error("interval must be positive, got {0}")]
    InvalidInterval(TimeDelta),

    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("duplicate row for ({symbol}, {timestamp})")]
    DuplicateKey {
        symbol: String,
        timestamp: DateTime<Utc>,
    },

    #[error("missing value in column '{column}' for ({symbol}, {timestamp})")]
    MissingValue {
        symbol: String,
        timestamp: DateTime<Utc>,
        column: String,
    },

    #[error("non-positive {column} price {value} for ({symbol}, {timestamp})")]
    NonPositivePrice {
        symbol: String,
        timestamp: DateTime<Utc>,
        column: String,
        value: f64,
    },

    #[error("timestamp {timestamp} is not on the {interval} lattice starting at {start}")]
    OffGrid {
        timestamp: DateTime<Utc>,
        start: DateTime<Utc>,
        interval: TimeDelta,
    },

    #[error("no rows at all for timestamp {0}")]
    MissingTimestamp(DateTime<Utc>),

    #[error("symbol {symbol} missing at timestamp {timestamp}")]
    MissingSymbol {
        symbol: String,
        timestamp: DateTime<Utc>,
    },
}

/// Validate `raw` against the dataset contract and index it on the lattice.
pub fn validate_dataset(
    raw: RawDataset,
    interval: TimeDelta,
) -> Result<Dataset, DataValidationError> {
    if raw.rows.is_empty() {
        return Err(DataValidationError::Empty);
    }
    if interval <= TimeDelta::zero() || interval.num_milliseconds() == 0 {
        return Err(DataValidationError::InvalidInterval(interval));
    }

    for required in REQUIRED_COLUMNS {
        if !raw.columns.iter().any(|c| c == required) {
            return Err(DataValidationError::MissingColumn(required.to_string()));
        }
    }
    let extra_columns: Vec<String> = raw.extra_columns().into_iter().map(String::from).collect();

    let tracked: BTreeSet<String> = if raw.symbols.is_empty() {
        raw.rows.iter().map(|r| r.symbol.clone()).collect()
    } else {
        raw.symbols.iter().cloned().collect()
    };

    let mut seen: BTreeSet<(String, DateTime<Utc>)> = BTreeSet::new();
    let mut by_time: BTreeMap<DateTime<Utc>, BTreeMap<String, Candle>> = BTreeMap::new();
    let mut dropped = 0usize;

    for row in raw.rows {
        if !seen.insert((row.symbol.clone(), row.timestamp)) {
            return Err(DataValidationError::DuplicateKey {
                symbol: row.symbol,
                timestamp: row.timestamp,
            });
        }

        let candle = to_candle(&row, &extra_columns)?;

        // Undeclared symbols are allowed in the source but not replayed.
        if !tracked.contains(&row.symbol) {
            dropped += 1;
            continue;
        }
        by_time
            .entry(row.timestamp)
            .or_default()
            .insert(row.symbol, candle);
    }

    if dropped > 0 {
        debug!(dropped, "ignored rows for undeclared symbols");
    }

    let (Some(&start), Some(&end)) = (by_time.keys().next(), by_time.keys().next_back()) else {
        return Err(DataValidationError::Empty);
    };

    for &timestamp in by_time.keys() {
        if lattice_offset(start, timestamp, interval).is_none() {
            return Err(DataValidationError::OffGrid {
                timestamp,
                start,
                interval,
            });
        }
    }

    let mut slices = Vec::with_capacity(by_time.len());
    let mut timestamp = start;
    while timestamp <= end {
        let candles = by_time
            .remove(&timestamp)
            .ok_or(DataValidationError::MissingTimestamp(timestamp))?;
        if let Some(symbol) = tracked.iter().find(|s| !candles.contains_key(*s)) {
            return Err(DataValidationError::MissingSymbol {
                symbol: symbol.clone(),
                timestamp,
            });
        }
        slices.push(MarketSlice { timestamp, candles });
        timestamp += interval;
    }

    let hash = fingerprint(&slices);
    Ok(Dataset {
        interval,
        symbols: tracked.into_iter().collect(),
        extra_columns,
        slices,
        hash,
    })
}

fn to_candle(
    row: &crate::domain::RawCandle,
    extra_columns: &[String],
) -> Result<Candle, DataValidationError> {
    let missing = |column: &str| DataValidationError::MissingValue {
        symbol: row.symbol.clone(),
        timestamp: row.timestamp,
        column: column.to_string(),
    };
    let value = |column: &str| row.numeric(column).ok_or_else(|| missing(column));

    let open = value("open")?;
    let high = value("high")?;
    let low = value("low")?;
    let close = value("close")?;
    let volume = value("volume")?;
    let is_traded = row.is_traded.ok_or_else(|| missing("is_traded"))?;

    for (column, price) in [("open", open), ("high", high), ("low", low), ("close", close)] {
        if price <= 0.0 {
            return Err(DataValidationError::NonPositivePrice {
                symbol: row.symbol.clone(),
                timestamp: row.timestamp,
                column: column.to_string(),
                value: price,
            });
        }
    }

    let mut extra = BTreeMap::new();
    for column in extra_columns {
        extra.insert(column.clone(), value(column)?);
    }

    Ok(Candle {
        open,
        high,
        low,
        close,
        volume,
        is_traded,
        extra,
    })
}
