//! Trade — one market order and the position it opens.
//!
//! A trade consumes market slices and walks the lifecycle
//! `Created → {Filled, Rejected}`, `Filled → Closed`:
//!
//! - **Created**: fills at the close of the tick equal to its execution
//!   timestamp; a later tick means the entry was skipped and the trade is
//!   rejected.
//! - **Filled**: marks to market on every later tick, then tests stop-loss
//!   against the candle's adverse extreme and take-profit against its
//!   favourable extreme. Stop-loss wins when both hit in one candle.
//! - **Closed / Rejected**: terminal; every further call is a no-op.
//!
//! Gap candles (`is_traded == false`) are ignored entirely. All P&L is signed
//! by `Direction::sign()` so LONG and SHORT share one formula, and percentage
//! fields are relative to entry notional `quantity·fill_price`.

use crate::domain::{Candle, Direction, MarketSlice, TradeId, TradeStatus};
use crate::engine::broker::BrokerConfig;
use crate::engine::market::Subscriber;
use crate::error::{SimError, SimResult};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// When the order should execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderTiming {
    /// At the tick the trade is opened on.
    Now,
    /// At a specific future grid timestamp.
    At(DateTime<Utc>),
}

/// Why a filled trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

/// What a single slice did to a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Gap candle, stale tick, or already terminal.
    Ignored,
    /// Still waiting for the execution tick.
    Pending,
    Filled,
    Rejected,
    /// Open position re-marked, no exit.
    Marked,
    Closed(ExitReason),
}

impl TickOutcome {
    pub fn is_terminal(self) -> bool {
        matches!(self, TickOutcome::Rejected | TickOutcome::Closed(_))
    }
}

/// Parameters for opening a trade through the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub id: TradeId,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: f64,
    pub leverage: f64,
    /// Fractional stop distance, e.g. 0.02 for 2%.
    pub stop_loss_pct: Option<f64>,
    /// Take-profit distance as a multiple of the stop distance.
    pub risk_reward: Option<f64>,
    pub timing: OrderTiming,
}

impl TradeRequest {
    pub fn new(
        id: impl Into<TradeId>,
        symbol: impl Into<String>,
        direction: Direction,
        quantity: f64,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            direction,
            quantity,
            leverage: 1.0,
            stop_loss_pct: None,
            risk_reward: None,
            timing: OrderTiming::Now,
        }
    }

    pub fn leverage(mut self, leverage: f64) -> Self {
        self.leverage = leverage;
        self
    }

    pub fn stop_loss(mut self, pct: f64) -> Self {
        self.stop_loss_pct = Some(pct);
        self
    }

    pub fn risk_reward(mut self, ratio: f64) -> Self {
        self.risk_reward = Some(ratio);
        self
    }

    pub fn execute_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timing = OrderTiming::At(timestamp);
        self
    }
}

/// A trade and its running metrics.
///
/// Parameters are fixed at construction; exit thresholds are fixed at fill.
/// State only changes through [`Trade::on_market_data`].
#[derive(Debug, Clone)]
pub struct Trade {
    id: TradeId,
    symbol: String,
    direction: Direction,
    quantity: f64,
    leverage: f64,
    stop_loss_pct: Option<f64>,
    risk_reward: Option<f64>,
    commission_rate: f64,
    time_discount_factor: Option<f64>,
    creation_timestamp: DateTime<Utc>,
    execution_timestamp: DateTime<Utc>,
    interval: TimeDelta,

    status: TradeStatus,

    fill_price: Option<f64>,
    stop_loss_price: Option<f64>,
    take_profit_price: Option<f64>,

    close_price: Option<f64>,
    close_timestamp: Option<DateTime<Utc>>,
    exit_reason: Option<ExitReason>,

    /// Timestamp of the last slice that changed state.
    last_tick: Option<DateTime<Utc>>,

    time_in_trade: usize,
    paid_commission: f64,
    unrealized_pnl: f64,
    realized_pnl: f64,
    unrealized_pnl_pct: f64,
    realized_pnl_pct: f64,
    discounted_unrealized_pnl_pct: f64,
    discounted_realized_pnl_pct: f64,
}

impl Trade {
    /// Build a trade anchored at `creation_timestamp` on a market stepping by
    /// `interval`.
    pub fn new(
        request: TradeRequest,
        creation_timestamp: DateTime<Utc>,
        interval: TimeDelta,
        config: &BrokerConfig,
    ) -> SimResult<Self> {
        config.validate()?;
        let invalid = |reason: &str| SimError::InvalidTrade {
            id: request.id.clone(),
            reason: reason.to_string(),
        };

        if request.symbol.is_empty() {
            return Err(invalid("symbol is empty"));
        }
        if !(request.quantity.is_finite() && request.quantity > 0.0) {
            return Err(invalid("quantity must be positive"));
        }
        if !(request.leverage.is_finite() && request.leverage > 0.0) {
            return Err(invalid("leverage must be positive"));
        }
        if let Some(pct) = request.stop_loss_pct {
            if !(pct > 0.0 && pct < 1.0) {
                return Err(invalid("stop_loss_pct must be in (0, 1)"));
            }
        }
        if let Some(rr) = request.risk_reward {
            if !(rr.is_finite() && rr > 0.0) {
                return Err(invalid("risk_reward must be positive"));
            }
        }
        if interval.num_milliseconds() <= 0 {
            return Err(invalid("interval must be positive"));
        }
        let execution_timestamp = match request.timing {
            OrderTiming::Now => creation_timestamp,
            OrderTiming::At(ts) if ts < creation_timestamp => {
                return Err(invalid("execution timestamp precedes creation"));
            }
            OrderTiming::At(ts) => ts,
        };

        Ok(Self {
            id: request.id,
            symbol: request.symbol,
            direction: request.direction,
            quantity: request.quantity,
            leverage: request.leverage,
            stop_loss_pct: request.stop_loss_pct,
            risk_reward: request.risk_reward,
            commission_rate: config.commission_rate,
            time_discount_factor: config.time_discount_factor,
            creation_timestamp,
            execution_timestamp,
            interval,
            status: TradeStatus::Created,
            fill_price: None,
            stop_loss_price: None,
            take_profit_price: None,
            close_price: None,
            close_timestamp: None,
            exit_reason: None,
            last_tick: None,
            time_in_trade: 0,
            paid_commission: 0.0,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            unrealized_pnl_pct: 0.0,
            realized_pnl_pct: 0.0,
            discounted_unrealized_pnl_pct: 0.0,
            discounted_realized_pnl_pct: 0.0,
        })
    }

    /// Evaluate one market slice.
    pub fn on_market_data(&mut self, slice: &MarketSlice) -> SimResult<TickOutcome> {
        if self.status.is_terminal() {
            return Ok(TickOutcome::Ignored);
        }
        let Some(candle) = slice.get(&self.symbol) else {
            return Ok(TickOutcome::Ignored);
        };
        if !candle.is_traded {
            return Ok(TickOutcome::Ignored);
        }
        let now = slice.timestamp;
        if self.last_tick.is_some_and(|last| now <= last) {
            return Ok(TickOutcome::Ignored);
        }

        match self.status {
            TradeStatus::Created => {
                if now == self.execution_timestamp {
                    self.fill(now, candle.close)?;
                    Ok(TickOutcome::Filled)
                } else if now > self.execution_timestamp {
                    self.reject(now)?;
                    Ok(TickOutcome::Rejected)
                } else {
                    Ok(TickOutcome::Pending)
                }
            }
            TradeStatus::Filled => self.evaluate_open(now, candle),
            TradeStatus::Rejected | TradeStatus::Closed => Ok(TickOutcome::Ignored),
        }
    }

    fn transition(&mut self, to: TradeStatus) -> SimResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(SimError::InvalidStateTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    fn fill(&mut self, now: DateTime<Utc>, price: f64) -> SimResult<()> {
        self.transition(TradeStatus::Filled)?;
        let sign = self.direction.sign();

        self.fill_price = Some(price);
        self.stop_loss_price = self.stop_loss_pct.map(|sl| price * (1.0 - sign * sl));
        self.take_profit_price = match (self.stop_loss_pct, self.risk_reward) {
            (Some(sl), Some(rr)) => Some(price * (1.0 + sign * rr * sl)),
            _ => None,
        };

        // Entry commission is realized immediately, even while the position is open.
        let commission = price * self.quantity * self.commission_rate;
        self.paid_commission += commission;
        self.realized_pnl = -self.paid_commission;
        self.last_tick = Some(now);

        debug!(
            trade_id = %self.id,
            symbol = %self.symbol,
            direction = %self.direction,
            price,
            commission,
            "trade filled"
        );
        Ok(())
    }

    fn reject(&mut self, now: DateTime<Utc>) -> SimResult<()> {
        self.transition(TradeStatus::Rejected)?;
        self.last_tick = Some(now);
        warn!(
            trade_id = %self.id,
            symbol = %self.symbol,
            execution = %self.execution_timestamp,
            seen = %now,
            "entry tick skipped, trade rejected"
        );
        Ok(())
    }

    fn evaluate_open(&mut self, now: DateTime<Utc>, candle: &Candle) -> SimResult<TickOutcome> {
        self.mark(now, candle.close);

        if self.stop_loss_hit(candle) {
            if let Some(price) = self.stop_loss_price {
                self.close(now, price, ExitReason::StopLoss)?;
                return Ok(TickOutcome::Closed(ExitReason::StopLoss));
            }
        }
        if self.take_profit_hit(candle) {
            if let Some(price) = self.take_profit_price {
                self.close(now, price, ExitReason::TakeProfit)?;
                return Ok(TickOutcome::Closed(ExitReason::TakeProfit));
            }
        }
        Ok(TickOutcome::Marked)
    }

    fn mark(&mut self, now: DateTime<Utc>, price: f64) {
        let Some(fill) = self.fill_price else {
            return;
        };
        self.time_in_trade = self.periods_since_execution(now);
        self.unrealized_pnl = self.direction.sign() * self.quantity * (price - fill);
        self.unrealized_pnl_pct = self.unrealized_pnl / (self.quantity * fill);
        self.discounted_unrealized_pnl_pct = self.unrealized_pnl_pct * self.discount();
        self.last_tick = Some(now);
    }

    fn stop_loss_hit(&self, candle: &Candle) -> bool {
        match (self.stop_loss_price, self.direction) {
            (Some(stop), Direction::Long) => candle.low <= stop,
            (Some(stop), Direction::Short) => candle.high >= stop,
            (None, _) => false,
        }
    }

    fn take_profit_hit(&self, candle: &Candle) -> bool {
        match (self.take_profit_price, self.direction) {
            (Some(target), Direction::Long) => candle.high >= target,
            (Some(target), Direction::Short) => candle.low <= target,
            (None, _) => false,
        }
    }

    fn close(&mut self, now: DateTime<Utc>, price: f64, reason: ExitReason) -> SimResult<()> {
        let Some(fill) = self.fill_price else {
            return Err(SimError::InvalidStateTransition {
                id: self.id.clone(),
                from: self.status,
                to: TradeStatus::Closed,
            });
        };
        self.transition(TradeStatus::Closed)?;

        self.paid_commission += price * self.quantity * self.commission_rate;
        self.close_price = Some(price);
        self.close_timestamp = Some(now);
        self.exit_reason = Some(reason);

        let gross = self.direction.sign() * self.quantity * (price - fill);
        self.realized_pnl = gross - self.paid_commission;
        self.realized_pnl_pct = self.realized_pnl / (self.quantity * fill);
        self.discounted_realized_pnl_pct = self.realized_pnl_pct * self.discount();

        self.unrealized_pnl = 0.0;
        self.unrealized_pnl_pct = 0.0;
        self.discounted_unrealized_pnl_pct = 0.0;

        debug!(
            trade_id = %self.id,
            symbol = %self.symbol,
            ?reason,
            price,
            pnl = self.realized_pnl,
            periods = self.time_in_trade,
            "trade closed"
        );
        Ok(())
    }

    fn periods_since_execution(&self, now: DateTime<Utc>) -> usize {
        let step = self.interval.num_milliseconds();
        let elapsed = (now - self.execution_timestamp).num_milliseconds();
        if step <= 0 || elapsed <= 0 {
            return 0;
        }
        usize::try_from(elapsed / step).unwrap_or(0)
    }

    fn discount(&self) -> f64 {
        let exponent = i32::try_from(self.time_in_trade).unwrap_or(i32::MAX);
        self.time_discount_factor.map_or(1.0, |f| f.powi(exponent))
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn id(&self) -> &TradeId {
        &self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn leverage(&self) -> f64 {
        self.leverage
    }

    pub fn stop_loss_pct(&self) -> Option<f64> {
        self.stop_loss_pct
    }

    pub fn risk_reward(&self) -> Option<f64> {
        self.risk_reward
    }

    pub fn commission_rate(&self) -> f64 {
        self.commission_rate
    }

    pub fn time_discount_factor(&self) -> Option<f64> {
        self.time_discount_factor
    }

    pub fn creation_timestamp(&self) -> DateTime<Utc> {
        self.creation_timestamp
    }

    pub fn execution_timestamp(&self) -> DateTime<Utc> {
        self.execution_timestamp
    }

    pub fn status(&self) -> TradeStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn fill_price(&self) -> Option<f64> {
        self.fill_price
    }

    pub fn stop_loss_price(&self) -> Option<f64> {
        self.stop_loss_price
    }

    pub fn take_profit_price(&self) -> Option<f64> {
        self.take_profit_price
    }

    pub fn close_price(&self) -> Option<f64> {
        self.close_price
    }

    pub fn close_timestamp(&self) -> Option<DateTime<Utc>> {
        self.close_timestamp
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit_reason
    }

    /// Whole intervals between execution and the last processed tick.
    pub fn time_in_trade(&self) -> usize {
        self.time_in_trade
    }

    pub fn paid_commission(&self) -> f64 {
        self.paid_commission
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.unrealized_pnl
    }

    /// Entry commission while open, final net P&L once closed.
    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn unrealized_pnl_pct(&self) -> f64 {
        self.unrealized_pnl_pct
    }

    pub fn realized_pnl_pct(&self) -> f64 {
        self.realized_pnl_pct
    }

    pub fn discounted_unrealized_pnl_pct(&self) -> f64 {
        self.discounted_unrealized_pnl_pct
    }

    pub fn discounted_realized_pnl_pct(&self) -> f64 {
        self.discounted_realized_pnl_pct
    }

    /// Entry notional `quantity·fill_price`.
    pub fn notional(&self) -> Option<f64> {
        self.fill_price.map(|p| p * self.quantity)
    }

    /// Capital committed at the trade's leverage.
    pub fn margin(&self) -> Option<f64> {
        self.notional().map(|n| n / self.leverage)
    }

    /// Realized P&L over margin once closed, unrealized over margin while open.
    pub fn return_on_margin(&self) -> Option<f64> {
        let margin = self.margin()?;
        match self.status {
            TradeStatus::Closed => Some(self.realized_pnl / margin),
            TradeStatus::Filled => Some(self.unrealized_pnl / margin),
            _ => None,
        }
    }

    pub fn is_winner(&self) -> bool {
        self.status == TradeStatus::Closed && self.realized_pnl > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.status == TradeStatus::Closed && self.realized_pnl < 0.0
    }

    /// Snapshot for reporting.
    pub fn info(&self) -> TradeInfo {
        TradeInfo {
            id: self.id.clone(),
            symbol: self.symbol.clone(),
            direction: self.direction,
            status: self.status,
            quantity: self.quantity,
            leverage: self.leverage,
            stop_loss_pct: self.stop_loss_pct,
            risk_reward: self.risk_reward,
            creation_timestamp: self.creation_timestamp,
            execution_timestamp: self.execution_timestamp,
            fill_price: self.fill_price,
            stop_loss_price: self.stop_loss_price,
            take_profit_price: self.take_profit_price,
            close_price: self.close_price,
            close_timestamp: self.close_timestamp,
            exit_reason: self.exit_reason,
            time_in_trade: self.time_in_trade,
            paid_commission: self.paid_commission,
            unrealized_pnl: self.unrealized_pnl,
            realized_pnl: self.realized_pnl,
            unrealized_pnl_pct: self.unrealized_pnl_pct,
            realized_pnl_pct: self.realized_pnl_pct,
            discounted_realized_pnl_pct: self.discounted_realized_pnl_pct,
            margin: self.margin(),
        }
    }
}

impl Subscriber for Trade {
    fn subscriber_id(&self) -> &TradeId {
        &self.id
    }

    fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn on_market_data(&mut self, slice: &MarketSlice) -> SimResult<TickOutcome> {
        Trade::on_market_data(self, slice)
    }
}

/// Serializable snapshot of a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeInfo {
    pub id: TradeId,
    pub symbol: String,
    pub direction: Direction,
    pub status: TradeStatus,
    pub quantity: f64,
    pub leverage: f64,
    pub stop_loss_pct: Option<f64>,
    pub risk_reward: Option<f64>,
    pub creation_timestamp: DateTime<Utc>,
    pub execution_timestamp: DateTime<Utc>,
    pub fill_price: Option<f64>,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub close_price: Option<f64>,
    pub close_timestamp: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub time_in_trade: usize,
    pub paid_commission: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl_pct: f64,
    pub realized_pnl_pct: f64,
    pub discounted_realized_pnl_pct: f64,
    pub margin: Option<f64>,
}

impl TradeInfo {
    /// Plain key → value view for reporting.
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
    use chrono::TimeZone;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap()
    }

    fn slice(minute: u32, open: f64, high: f64, low: f64, close: f64) -> MarketSlice {
        let mut candles = BTreeMap::new();
        candles.insert(
            "BTC".to_string(),
            Candle {
                open,
                high,
                low,
                close,
                volume: 1.0,
                is_traded: true,
                extra: BTreeMap::new(),
            },
        );
        MarketSlice {
            timestamp: t(minute),
            candles,
        }
    }

    fn flat(minute: u32, price: f64) -> MarketSlice {
        slice(minute, price, price, price, price)
    }

    fn gap(minute: u32, price: f64) -> MarketSlice {
        let mut s = flat(minute, price);
        if let Some(c) = s.candles.get_mut("BTC") {
            c.is_traded = false;
        }
        s
    }

    fn trade(request: TradeRequest, config: BrokerConfig) -> Trade {
        Trade::new(request, t(0), TimeDelta::minutes(1), &config).unwrap()
    }

    fn long() -> TradeRequest {
        TradeRequest::new("t1", "BTC", Direction::Long, 1.0)
    }

    #[test]
    fn fills_at_close_on_execution_tick() {
        let mut tr = trade(long().stop_loss(0.02).risk_reward(2.0), BrokerConfig::default());
        let outcome = tr.on_market_data(&slice(0, 99.0, 101.0, 98.5, 100.0)).unwrap();
        assert_eq!(outcome, TickOutcome::Filled);
        assert_eq!(tr.status(), TradeStatus::Filled);
        assert_eq!(tr.fill_price(), Some(100.0));
        assert!((tr.stop_loss_price().unwrap() - 98.0).abs() < 1e-9);
        assert!((tr.take_profit_price().unwrap() - 104.0).abs() < 1e-9);
    }

    #[test]
    fn short_thresholds_mirror_long() {
        let req = TradeRequest::new("s", "BTC", Direction::Short, 1.0)
            .stop_loss(0.02)
            .risk_reward(1.5);
        let mut tr = trade(req, BrokerConfig::default());
        tr.on_market_data(&flat(0, 100.0)).unwrap();
        assert!((tr.stop_loss_price().unwrap() - 102.0).abs() < 1e-9);
        assert!((tr.take_profit_price().unwrap() - 97.0).abs() < 1e-9);
    }

    #[test]
    fn no_take_profit_without_risk_reward() {
        let mut tr = trade(long().stop_loss(0.02), BrokerConfig::default());
        tr.on_market_data(&flat(0, 100.0)).unwrap();
        assert!(tr.stop_loss_price().is_some());
        assert!(tr.take_profit_price().is_none());
    }

    #[test]
    fn skipped_entry_tick_rejects_without_commission() {
        let config = BrokerConfig {
            commission_rate: 0.01,
            ..BrokerConfig::default()
        };
        let mut tr = trade(long(), config);
        let outcome = tr.on_market_data(&flat(1, 100.0)).unwrap();
        assert_eq!(outcome, TickOutcome::Rejected);
        assert_eq!(tr.paid_commission(), 0.0);
        assert_eq!(tr.realized_pnl(), 0.0);
    }

    #[test]
    fn gap_candle_is_ignored() {
        let mut tr = trade(long(), BrokerConfig::default());
        assert_eq!(tr.on_market_data(&gap(0, 100.0)).unwrap(), TickOutcome::Ignored);
        assert_eq!(tr.status(), TradeStatus::Created);
        // The gap swallowed the entry tick, so the next traded tick rejects.
        assert_eq!(tr.on_market_data(&flat(1, 100.0)).unwrap(), TickOutcome::Rejected);
    }

    #[test]
    fn future_execution_waits() {
        let mut tr = trade(long().execute_at(t(2)), BrokerConfig::default());
        assert_eq!(tr.on_market_data(&flat(0, 100.0)).unwrap(), TickOutcome::Pending);
        assert_eq!(tr.on_market_data(&flat(1, 100.0)).unwrap(), TickOutcome::Pending);
        assert_eq!(tr.on_market_data(&flat(2, 105.0)).unwrap(), TickOutcome::Filled);
        assert_eq!(tr.fill_price(), Some(105.0));
    }

    #[test]
    fn execution_before_creation_is_invalid() {
        let config = BrokerConfig::default();
        let err = Trade::new(
            long().execute_at(t(0)),
            t(1),
            TimeDelta::minutes(1),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, SimError::InvalidTrade { .. }));
    }

    #[test]
    fn rejects_bad_parameters() {
        let config = BrokerConfig::default();
        let make = |req: TradeRequest| Trade::new(req, t(0), TimeDelta::minutes(1), &config);
        assert!(make(TradeRequest::new("a", "BTC", Direction::Long, 0.0)).is_err());
        assert!(make(long().leverage(0.0)).is_err());
        assert!(make(long().stop_loss(1.5)).is_err());
        assert!(make(long().stop_loss(0.02).risk_reward(-1.0)).is_err());
        assert!(make(TradeRequest::new("a", "", Direction::Long, 1.0)).is_err());
    }

    #[test]
    fn stop_uses_low_not_close() {
        let mut tr = trade(long().stop_loss(0.02), BrokerConfig::default());
        tr.on_market_data(&flat(0, 100.0)).unwrap();
        let outcome = tr.on_market_data(&slice(1, 100.0, 100.5, 97.0, 99.0)).unwrap();
        assert_eq!(outcome, TickOutcome::Closed(ExitReason::StopLoss));
        assert!((tr.close_price().unwrap() - 98.0).abs() < 1e-9);
        assert!((tr.realized_pnl() + 2.0).abs() < 1e-9);
    }

    #[test]
    fn stop_wins_when_both_thresholds_hit() {
        let mut tr = trade(long().stop_loss(0.02).risk_reward(1.0), BrokerConfig::default());
        tr.on_market_data(&flat(0, 100.0)).unwrap();
        let outcome = tr.on_market_data(&slice(1, 100.0, 103.0, 97.0, 100.0)).unwrap();
        assert_eq!(outcome, TickOutcome::Closed(ExitReason::StopLoss));
        assert_eq!(tr.exit_reason(), Some(ExitReason::StopLoss));
    }

    #[test]
    fn short_take_profit_uses_low() {
        let req = TradeRequest::new("s", "BTC", Direction::Short, 2.0)
            .stop_loss(0.05)
            .risk_reward(1.0);
        let mut tr = trade(req, BrokerConfig::default());
        tr.on_market_data(&flat(0, 100.0)).unwrap();
        let outcome = tr.on_market_data(&slice(1, 99.0, 99.5, 94.0, 96.0)).unwrap();
        assert_eq!(outcome, TickOutcome::Closed(ExitReason::TakeProfit));
        // 2 · (100 − 95)
        assert!((tr.realized_pnl() - 10.0).abs() < 1e-9);
        assert!((tr.realized_pnl_pct() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn commission_on_both_legs() {
        let config = BrokerConfig {
            commission_rate: 0.01,
            ..BrokerConfig::default()
        };
        let mut tr = trade(long().stop_loss(0.05).risk_reward(2.0), config);
        tr.on_market_data(&flat(0, 100.0)).unwrap();
        assert!((tr.realized_pnl() + 1.0).abs() < 1e-9);
        tr.on_market_data(&slice(1, 100.0, 110.0, 100.0, 109.0)).unwrap();
        assert_eq!(tr.status(), TradeStatus::Closed);
        assert!((tr.paid_commission() - 2.1).abs() < 1e-9);
        assert!((tr.realized_pnl() - 7.9).abs() < 1e-9);
        assert!((tr.realized_pnl_pct() - 0.079).abs() < 1e-9);
    }

    #[test]
    fn marks_to_market_while_open() {
        let mut tr = trade(long(), BrokerConfig::default());
        tr.on_market_data(&flat(0, 100.0)).unwrap();
        assert_eq!(tr.on_market_data(&flat(1, 103.0)).unwrap(), TickOutcome::Marked);
        assert!((tr.unrealized_pnl() - 3.0).abs() < 1e-9);
        assert!((tr.unrealized_pnl_pct() - 0.03).abs() < 1e-9);
        assert_eq!(tr.time_in_trade(), 1);
    }

    #[test]
    fn discount_scales_by_periods_in_trade() {
        let config = BrokerConfig {
            commission_rate: 0.0,
            time_discount_factor: Some(0.5),
        };
        let mut tr = trade(long().stop_loss(0.1).risk_reward(1.0), config);
        tr.on_market_data(&flat(0, 100.0)).unwrap();
        tr.on_market_data(&flat(1, 100.0)).unwrap();
        tr.on_market_data(&slice(2, 100.0, 111.0, 100.0, 110.0)).unwrap();
        assert_eq!(tr.time_in_trade(), 2);
        assert!((tr.realized_pnl_pct() - 0.1).abs() < 1e-9);
        assert!((tr.discounted_realized_pnl_pct() - 0.025).abs() < 1e-9);
    }

    #[test]
    fn gaps_while_open_still_count_as_time_in_trade() {
        let mut tr = trade(long(), BrokerConfig::default());
        tr.on_market_data(&flat(0, 100.0)).unwrap();
        assert_eq!(tr.on_market_data(&gap(1, 100.0)).unwrap(), TickOutcome::Ignored);
        assert_eq!(tr.on_market_data(&gap(2, 100.0)).unwrap(), TickOutcome::Ignored);
        assert_eq!(tr.time_in_trade(), 0);
        assert_eq!(tr.on_market_data(&flat(3, 101.0)).unwrap(), TickOutcome::Marked);
        // Calendar intervals since execution, not traded ticks.
        assert_eq!(tr.time_in_trade(), 3);
        assert!((tr.unrealized_pnl() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn terminal_trade_ignores_everything() {
        let mut tr = trade(long().stop_loss(0.02), BrokerConfig::default());
        tr.on_market_data(&flat(0, 100.0)).unwrap();
        tr.on_market_data(&slice(1, 100.0, 100.0, 90.0, 95.0)).unwrap();
        let before = tr.info();
        assert_eq!(tr.on_market_data(&flat(2, 50.0)).unwrap(), TickOutcome::Ignored);
        assert_eq!(tr.info(), before);
    }

    #[test]
    fn stale_tick_is_ignored() {
        let mut tr = trade(long(), BrokerConfig::default());
        tr.on_market_data(&flat(0, 100.0)).unwrap();
        assert_eq!(tr.on_market_data(&flat(0, 80.0)).unwrap(), TickOutcome::Ignored);
        assert_eq!(tr.unrealized_pnl(), 0.0);
    }

    #[test]
    fn margin_reflects_leverage() {
        let mut tr = trade(long().leverage(10.0), BrokerConfig::default());
        tr.on_market_data(&flat(0, 100.0)).unwrap();
        tr.on_market_data(&flat(1, 101.0)).unwrap();
        assert_eq!(tr.margin(), Some(10.0));
        assert!((tr.return_on_margin().unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn info_map_has_plain_keys() {
        let tr = trade(long(), BrokerConfig::default());
        let map = tr.info().to_map();
        assert_eq!(map["status"], serde_json::json!("Created"));
        assert_eq!(map["symbol"], serde_json::json!("BTC"));
        assert!(map["fill_price"].is_null());
    }
}
