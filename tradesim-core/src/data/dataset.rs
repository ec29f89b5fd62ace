//! Raw and validated dataset representations.
//!
//! A `RawDataset` is whatever the data-source collaborator hands over: a column
//! header, an optional declared symbol set, and loosely typed rows. A `Dataset`
//! is the validated, lattice-indexed form the market replays: one
//! `MarketSlice` per grid point, every tracked symbol present in each.

use crate::domain::{DatasetHash, MarketSlice, RawCandle, REQUIRED_COLUMNS};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeSet;

/// Unvalidated rows plus the header they came with.
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    /// Column names present in the source, excluding `symbol` and `timestamp`.
    pub columns: Vec<String>,
    /// Symbols that must be present at every timestamp. Empty means "every
    /// symbol that appears in `rows`".
    pub symbols: Vec<String>,
    pub rows: Vec<RawCandle>,
}

impl RawDataset {
    /// Build from in-memory rows. The header is the required columns plus any
    /// extra column seen on any row.
    pub fn from_rows(rows: Vec<RawCandle>) -> Self {
        let extras: BTreeSet<&String> = rows.iter().flat_map(|r| r.extra.keys()).collect();
        let mut columns: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(extras.into_iter().cloned());
        Self {
            columns,
            symbols: Vec::new(),
            rows,
        }
    }

    /// Declare the symbol set that must be represented at every timestamp.
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Extra (indicator) columns declared in the header.
    pub fn extra_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.as_str())
            .filter(|c| !REQUIRED_COLUMNS.contains(c))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Validated replay data on a fixed interval lattice.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub(crate) interval: TimeDelta,
    pub(crate) symbols: Vec<String>,
    pub(crate) extra_columns: Vec<String>,
    pub(crate) slices: Vec<MarketSlice>,
    pub(crate) hash: DatasetHash,
}

impl Dataset {
    pub fn interval(&self) -> TimeDelta {
        self.interval
    }

    /// Tracked symbols, sorted.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn tracks(&self, symbol: &str) -> bool {
        self.symbols.binary_search_by(|s| s.as_str().cmp(symbol)).is_ok()
    }

    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    /// First timestamp (`since`).
    pub fn start(&self) -> DateTime<Utc> {
        self.slices[0].timestamp
    }

    /// Last timestamp (`until`).
    pub fn end(&self) -> DateTime<Utc> {
        self.slices[self.slices.len() - 1].timestamp
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Always false for a validated dataset; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn slices(&self) -> &[MarketSlice] {
        &self.slices
    }

    pub fn slice_at(&self, index: usize) -> Option<&MarketSlice> {
        self.slices.get(index)
    }

    /// Grid index of `timestamp`, or `None` if it is off the lattice or
    /// outside `[start, end]`.
    pub fn index_of(&self, timestamp: DateTime<Utc>) -> Option<usize> {
        lattice_offset(self.start(), timestamp, self.interval).filter(|&i| i < self.slices.len())
    }

    pub fn hash(&self) -> &DatasetHash {
        &self.hash
    }
}

/// Number of whole intervals from `origin` to `timestamp`, or `None` when
/// `timestamp` precedes `origin` or does not sit on the lattice.
pub(crate) fn lattice_offset(
    origin: DateTime<Utc>,
    timestamp: DateTime<Utc>,
    interval: TimeDelta,
) -> Option<usize> {
    let step = interval.num_milliseconds();
    let delta = (timestamp - origin).num_milliseconds();
    if step <= 0 || delta < 0 || delta % step != 0 {
        return None;
    }
    usize::try_from(delta / step).ok()
}

/// BLAKE3 content hash over the canonical slice order.
pub(crate) fn fingerprint(slices: &[MarketSlice]) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    for slice in slices {
        hasher.update(&slice.timestamp.timestamp_millis().to_le_bytes());
        for (symbol, c) in &slice.candles {
            hasher.update(symbol.as_bytes());
            for v in [c.open, c.high, c.low, c.close, c.volume] {
                hasher.update(&v.to_le_bytes());
            }
            hasher.update(&[u8::from(c.is_traded)]);
            for (name, v) in &c.extra {
                hasher.update(name.as_bytes());
                hasher.update(&v.to_le_bytes());
            }
        }
    }
    DatasetHash(hasher.finalize().to_hex().to_string())
}
