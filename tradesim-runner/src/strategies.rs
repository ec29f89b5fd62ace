//! Scripted reference strategies.

use tradesim_core::{Direction, TradeRequest};

use crate::config::StrategyConfig;
use crate::episode::{Observation, Strategy};

/// Keeps exactly one bracketed position in the market, alternating long and
/// short.
///
/// Whenever the book has nothing open or pending, a market order is placed on
/// the configured symbol (or the first tracked symbol) with the configured
/// stop-loss and risk/reward.
#[derive(Debug, Clone)]
pub struct AlternatingBracket {
    params: StrategyConfig,
    next_direction: Direction,
    placed: u64,
}

impl AlternatingBracket {
    pub fn new(params: StrategyConfig) -> Self {
        Self {
            params,
            next_direction: Direction::Long,
            placed: 0,
        }
    }

    /// Number of requests issued since the last reset.
    pub fn placed(&self) -> u64 {
        self.placed
    }

    fn symbol(&self, observation: &Observation<'_>) -> Option<String> {
        if let Some(symbol) = &self.params.symbol {
            return Some(symbol.clone());
        }
        observation
            .window
            .slices()
            .last()
            .and_then(|slice| slice.symbols().next())
            .map(str::to_string)
    }
}

impl Strategy for AlternatingBracket {
    fn name(&self) -> &str {
        "alternating_bracket"
    }

    fn on_step(&mut self, observation: &Observation<'_>) -> Vec<TradeRequest> {
        let broker = observation.broker;
        if broker.open_trades_count() + broker.pending_trades_count() > 0 {
            return Vec::new();
        }
        let Some(symbol) = self.symbol(observation) else {
            return Vec::new();
        };

        let direction = self.next_direction;
        self.next_direction = direction.opposite();
        let id = format!("{}-{}", self.name(), self.placed);
        self.placed += 1;

        vec![TradeRequest::new(id, symbol, direction, self.params.quantity)
            .leverage(self.params.leverage)
            .stop_loss(self.params.stop_loss_pct)
            .risk_reward(self.params.risk_reward)]
    }

    fn reset(&mut self) {
        self.next_direction = Direction::Long;
        self.placed = 0;
    }
}
