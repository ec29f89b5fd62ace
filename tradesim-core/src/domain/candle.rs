//! Candles and the per-timestamp market slice broadcast to trades.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Required dataset columns besides the `(symbol, timestamp)` key.
pub const REQUIRED_COLUMNS: [&str; 6] = ["open", "high", "low", "close", "volume", "is_traded"];

/// One row as delivered by the data-source collaborator, before validation.
///
/// Every value is optional so that missing cells survive ingestion and are
/// reported by validation instead of being silently defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub is_traded: Option<bool>,
    /// Indicator columns appended upstream; passed through untouched.
    #[serde(default)]
    pub extra: BTreeMap<String, Option<f64>>,
}

impl RawCandle {
    /// A complete, traded row.
    pub fn new(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
            is_traded: Some(true),
            extra: BTreeMap::new(),
        }
    }

    /// Mark this row as exchange downtime.
    pub fn gap(mut self) -> Self {
        self.is_traded = Some(false);
        self
    }

    pub fn with_extra(mut self, column: impl Into<String>, value: f64) -> Self {
        self.extra.insert(column.into(), Some(value));
        self
    }

    /// Value of a numeric column by name, `None` when absent or NaN.
    pub fn numeric(&self, column: &str) -> Option<f64> {
        let value = match column {
            "open" => self.open,
            "high" => self.high,
            "low" => self.low,
            "close" => self.close,
            "volume" => self.volume,
            other => self.extra.get(other).copied().flatten(),
        };
        value.filter(|v| !v.is_nan())
    }
}

/// A validated OHLCV candle for one symbol at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// `false` marks exchange downtime; such candles never move a trade.
    pub is_traded: bool,
    #[serde(default)]
    pub extra: BTreeMap<String, f64>,
}

impl Candle {
    /// Look up a column by name, including pass-through indicator columns.
    pub fn field(&self, column: &str) -> Option<f64> {
        match column {
            "open" => Some(self.open),
            "high" => Some(self.high),
            "low" => Some(self.low),
            "close" => Some(self.close),
            "volume" => Some(self.volume),
            "is_traded" => Some(if self.is_traded { 1.0 } else { 0.0 }),
            other => self.extra.get(other).copied(),
        }
    }
}

/// Every tracked symbol's candle at a single timestamp.
///
/// Slices are immutable once the dataset is prepared; all live trades see the
/// same slice within one broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSlice {
    pub timestamp: DateTime<Utc>,
    pub candles: BTreeMap<String, Candle>,
}

impl MarketSlice {
    pub fn get(&self, symbol: &str) -> Option<&Candle> {
        self.candles.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.candles.keys().map(|s| s.as_str())
    }

    /// Whether `symbol` traded at this timestamp. Unknown symbols are not traded.
    pub fn is_traded(&self, symbol: &str) -> bool {
        self.candles.get(symbol).is_some_and(|c| c.is_traded)
    }

    /// Flatten one symbol's candle into a feature row: OHLCV, is_traded, then
    /// extra columns in name order.
    pub fn features(&self, symbol: &str) -> Option<Vec<f64>> {
        let c = self.candles.get(symbol)?;
        let mut row = vec![
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume,
            if c.is_traded { 1.0 } else { 0.0 },
        ];
        row.extend(c.extra.values().copied());
        Some(row)
    }
}
