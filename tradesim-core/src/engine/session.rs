//! Session — a market and its broker driven as one unit.
//!
//! Drivers that only need "open trades, step, read reward" use this instead of
//! threading the broker through every `Market::next` call themselves.

use crate::engine::broker::{Broker, BrokerInfo};
use crate::engine::clock::ResetMode;
use crate::engine::market::{Market, MarketWindow};
use crate::engine::trade::{Trade, TradeRequest};
use crate::error::SimResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one `Session::next` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub timestamp: DateTime<Utc>,
    /// Change in the broker's additive reward since the previous step.
    pub reward: f64,
    pub discounted_reward: f64,
    /// No further `next` is possible.
    pub done: bool,
}

#[derive(Debug, Clone)]
pub struct Session {
    market: Market,
    broker: Broker,
    reward_baseline: f64,
    discounted_baseline: f64,
}

impl Session {
    /// `market` should already be prepared.
    pub fn new(market: Market, broker: Broker) -> Self {
        let reward_baseline = broker.additive_reward_pct();
        let discounted_baseline = broker.discounted_additive_reward_pct();
        Self {
            market,
            broker,
            reward_baseline,
            discounted_baseline,
        }
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn into_parts(self) -> (Market, Broker) {
        (self.market, self.broker)
    }

    pub fn timestamp(&self) -> SimResult<DateTime<Utc>> {
        self.market.timestamp()
    }

    pub fn open_trade(&mut self, request: TradeRequest) -> SimResult<&Trade> {
        self.broker.open_trade(&mut self.market, request)
    }

    pub fn next(&mut self) -> SimResult<Step> {
        let timestamp = self.market.next(&mut self.broker)?.timestamp;
        let (reward, discounted_reward) = self.step_reward();
        Ok(Step {
            timestamp,
            reward,
            discounted_reward,
            done: self.market.has_reached_end()?,
        })
    }

    /// Reward accrued since the last call, as `(plain, discounted)`.
    pub fn step_reward(&mut self) -> (f64, f64) {
        let total = self.broker.additive_reward_pct();
        let discounted = self.broker.discounted_additive_reward_pct();
        let delta = (total - self.reward_baseline, discounted - self.discounted_baseline);
        self.reward_baseline = total;
        self.discounted_baseline = discounted;
        delta
    }

    /// Reset time and discard every trade.
    pub fn reset(&mut self, mode: ResetMode, rollback_periods: usize) -> SimResult<DateTime<Utc>> {
        let now = self.market.reset(mode, rollback_periods)?;
        self.broker.reset();
        self.reward_baseline = 0.0;
        self.discounted_baseline = 0.0;
        Ok(now)
    }

    pub fn has_reached_end(&self) -> SimResult<bool> {
        self.market.has_reached_end()
    }

    pub fn window(&self, lookback_periods: usize) -> SimResult<MarketWindow<'_>> {
        self.market.current_window(lookback_periods)
    }

    pub fn info(&self) -> SimResult<BrokerInfo> {
        Ok(self.broker.info(self.market.timestamp()?))
    }
}
