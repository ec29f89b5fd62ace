//! Broker — owns the trade book for one simulation run.
//!
//! Trades are appended in `open_trade` order and never re-ordered. Every
//! aggregate is a pure fold over that sequence, so reading statistics never
//! mutates anything.

use crate::domain::{TradeId, TradeStatus};
use crate::engine::market::{Market, SubscriberBook};
use crate::engine::trade::{Trade, TradeRequest};
use crate::error::{SimError, SimResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Costs and reward shaping applied to every trade the broker opens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Fraction of notional charged on entry and on exit.
    pub commission_rate: f64,
    /// Per-interval decay for the discounted P&L variants; `None` disables it.
    pub time_discount_factor: Option<f64>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            commission_rate: 0.0,
            time_discount_factor: None,
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> SimResult<()> {
        if !(self.commission_rate.is_finite() && self.commission_rate >= 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "commission_rate must be a non-negative number, got {}",
                self.commission_rate
            )));
        }
        if let Some(f) = self.time_discount_factor {
            if !(f > 0.0 && f <= 1.0) {
                return Err(SimError::InvalidConfig(format!(
                    "time_discount_factor must be in (0, 1], got {f}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Broker {
    config: BrokerConfig,
    trades: Vec<Trade>,
    index: HashMap<TradeId, usize>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            trades: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Create a trade anchored at the market's current timestamp, register it
    /// and append it to the book.
    ///
    /// The trade receives the current slice during registration, so an
    /// immediate order is already filled (or rejected) when this returns.
    pub fn open_trade(&mut self, market: &mut Market, request: TradeRequest) -> SimResult<&Trade> {
        if self.index.contains_key(&request.id) {
            return Err(SimError::DuplicateId(request.id));
        }
        if !market.tracks_symbol(&request.symbol)? {
            return Err(SimError::UnknownSymbol(request.symbol));
        }
        // Not in the book, so any subscription under this id is left over
        // from a trade discarded by `reset`.
        market.unregister(&request.id);

        let mut trade = Trade::new(request, market.timestamp()?, market.interval(), &self.config)?;
        market.register(&mut trade)?;

        let position = self.trades.len();
        self.index.insert(trade.id().clone(), position);
        self.trades.push(trade);
        Ok(&self.trades[position])
    }

    /// All trades in opening order.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn trade(&self, id: &TradeId) -> Option<&Trade> {
        self.index.get(id).and_then(|&i| self.trades.get(i))
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Discard the whole trade book. The market is reset separately.
    pub fn reset(&mut self) {
        self.trades.clear();
        self.index.clear();
    }

    fn with_status(&self, status: TradeStatus) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(move |t| t.status() == status)
    }

    /// Sum of realized P&L over closed trades.
    pub fn realized_profit(&self) -> f64 {
        self.with_status(TradeStatus::Closed)
            .map(Trade::realized_pnl)
            .sum()
    }

    /// Sum of unrealized P&L over open trades.
    pub fn unrealized_profit(&self) -> f64 {
        self.with_status(TradeStatus::Filled)
            .map(Trade::unrealized_pnl)
            .sum()
    }

    pub fn closed_trades_count(&self) -> usize {
        self.with_status(TradeStatus::Closed).count()
    }

    pub fn open_trades_count(&self) -> usize {
        self.with_status(TradeStatus::Filled).count()
    }

    pub fn pending_trades_count(&self) -> usize {
        self.with_status(TradeStatus::Created).count()
    }

    pub fn rejected_trades_count(&self) -> usize {
        self.with_status(TradeStatus::Rejected).count()
    }

    pub fn winning_trades_count(&self) -> usize {
        self.trades.iter().filter(|t| t.is_winner()).count()
    }

    pub fn losing_trades_count(&self) -> usize {
        self.trades.iter().filter(|t| t.is_loser()).count()
    }

    /// `winning / closed`, or `None` before anything has closed.
    pub fn win_rate(&self) -> Option<f64> {
        let closed = self.closed_trades_count();
        if closed == 0 {
            return None;
        }
        Some(self.winning_trades_count() as f64 / closed as f64)
    }

    /// Sum of `realized_pnl_pct` over closed trades.
    pub fn additive_reward_pct(&self) -> f64 {
        self.with_status(TradeStatus::Closed)
            .map(Trade::realized_pnl_pct)
            .sum()
    }

    pub fn discounted_additive_reward_pct(&self) -> f64 {
        self.with_status(TradeStatus::Closed)
            .map(Trade::discounted_realized_pnl_pct)
            .sum()
    }

    /// Commission paid across every trade, open ones included.
    pub fn total_commission(&self) -> f64 {
        self.trades.iter().map(Trade::paid_commission).sum()
    }

    pub fn info(&self, timestamp: DateTime<Utc>) -> BrokerInfo {
        BrokerInfo {
            timestamp,
            trades: self.trades.len(),
            realized_profit: self.realized_profit(),
            unrealized_profit: self.unrealized_profit(),
            total_commission: self.total_commission(),
            closed_trades: self.closed_trades_count(),
            open_trades: self.open_trades_count(),
            pending_trades: self.pending_trades_count(),
            rejected_trades: self.rejected_trades_count(),
            winning_trades: self.winning_trades_count(),
            losing_trades: self.losing_trades_count(),
            win_rate: self.win_rate(),
            additive_reward_pct: self.additive_reward_pct(),
            discounted_additive_reward_pct: self.discounted_additive_reward_pct(),
        }
    }
}

impl SubscriberBook for Broker {
    type Item = Trade;

    fn lookup(&self, id: &TradeId) -> Option<&Trade> {
        self.trade(id)
    }

    fn lookup_mut(&mut self, id: &TradeId) -> Option<&mut Trade> {
        let position = *self.index.get(id)?;
        self.trades.get_mut(position)
    }
}

/// Portfolio snapshot at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerInfo {
    pub timestamp: DateTime<Utc>,
    pub trades: usize,
    pub realized_profit: f64,
    pub unrealized_profit: f64,
    pub total_commission: f64,
    pub closed_trades: usize,
    pub open_trades: usize,
    pub pending_trades: usize,
    pub rejected_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: Option<f64>,
    pub additive_reward_pct: f64,
    pub discounted_additive_reward_pct: f64,
}

impl BrokerInfo {
    pub fn to_map(&self) -> BTreeMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RawDataset;
    use crate::domain::{Direction, RawCandle};
    use chrono::{TimeDelta, TimeZone};

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap()
    }

    fn market(closes: &[f64]) -> Market {
        let rows = closes
            .iter()
            .enumerate()
            .map(|(i, &p)| RawCandle::new("BTC", t(i as u32), p, p, p, p, 1.0))
            .collect();
        let mut m = Market::new(TimeDelta::minutes(1));
        m.prepare(RawDataset::from_rows(rows)).unwrap();
        m
    }

    #[test]
    fn config_validation() {
        assert!(BrokerConfig::default().validate().is_ok());
        let bad = BrokerConfig {
            commission_rate: -0.1,
            ..BrokerConfig::default()
        };
        assert!(matches!(bad.validate(), Err(SimError::InvalidConfig(_))));
        let bad = BrokerConfig {
            time_discount_factor: Some(1.5),
            ..BrokerConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn config_from_partial_json() {
        let cfg: BrokerConfig = serde_json::from_str(r#"{"commission_rate":0.001}"#).unwrap();
        assert_eq!(cfg.commission_rate, 0.001);
        assert_eq!(cfg.time_discount_factor, None);
    }

    #[test]
    fn open_trade_fills_immediately() {
        let mut m = market(&[100.0, 101.0]);
        let mut b = Broker::default();
        let trade = b
            .open_trade(&mut m, TradeRequest::new("a", "BTC", Direction::Long, 1.0))
            .unwrap();
        assert_eq!(trade.status(), TradeStatus::Filled);
        assert_eq!(trade.fill_price(), Some(100.0));
        assert_eq!(m.subscribers(), [TradeId::from("a")]);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut m = market(&[100.0, 101.0]);
        let mut b = Broker::default();
        b.open_trade(&mut m, TradeRequest::new("a", "BTC", Direction::Long, 1.0))
            .unwrap();
        let err = b
            .open_trade(&mut m, TradeRequest::new("a", "BTC", Direction::Short, 1.0))
            .unwrap_err();
        assert_eq!(err, SimError::DuplicateId(TradeId::from("a")));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let mut m = market(&[100.0]);
        let mut b = Broker::default();
        let err = b
            .open_trade(&mut m, TradeRequest::new("a", "ETH", Direction::Long, 1.0))
            .unwrap_err();
        assert_eq!(err, SimError::UnknownSymbol("ETH".into()));
        assert!(b.is_empty());
    }

    #[test]
    fn empty_book_has_no_win_rate() {
        let mut b = Broker::default();
        b.reset();
        assert_eq!(b.closed_trades_count(), 0);
        assert_eq!(b.win_rate(), None);
        assert_eq!(b.info(t(0)).to_map()["win_rate"], serde_json::Value::Null);
    }

    #[test]
    fn unrealized_tracks_open_trades() {
        let mut m = market(&[100.0, 104.0, 103.0]);
        let mut b = Broker::default();
        b.open_trade(&mut m, TradeRequest::new("l", "BTC", Direction::Long, 2.0))
            .unwrap();
        b.open_trade(&mut m, TradeRequest::new("s", "BTC", Direction::Short, 1.0))
            .unwrap();
        m.next(&mut b).unwrap();
        // 2·4 − 1·4
        assert!((b.unrealized_profit() - 4.0).abs() < 1e-9);
        assert_eq!(b.open_trades_count(), 2);
        assert_eq!(b.realized_profit(), 0.0);
    }

    #[test]
    fn reset_allows_reusing_ids() {
        let mut m = market(&[100.0, 101.0]);
        let mut b = Broker::default();
        b.open_trade(&mut m, TradeRequest::new("a", "BTC", Direction::Long, 1.0))
            .unwrap();
        b.reset();
        m.reset(crate::engine::clock::ResetMode::Start, 0).unwrap();
        assert!(b
            .open_trade(&mut m, TradeRequest::new("a", "BTC", Direction::Long, 1.0))
            .is_ok());
    }
}
