//! Episode loop: reset, observe, act, step, until the data or the step budget
//! runs out.
//!
//! Each step the strategy sees a lookback window ending at "now" plus the
//! broker's state, returns zero or more trade requests, and the session then
//! advances one interval. The per-step reward is the change in the broker's
//! additive reward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tradesim_core::{
    Broker, BrokerInfo, MarketWindow, ResetMode, Session, SimError, SimResult, TradeInfo,
    TradeRequest,
};

/// What a strategy sees before each step.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub step: usize,
    pub timestamp: DateTime<Utc>,
    /// Slices `[now − lookback·interval, now]`.
    pub window: MarketWindow<'a>,
    pub broker: &'a Broker,
}

/// Decision-maker driven by `run_episode`.
pub trait Strategy {
    fn name(&self) -> &str;

    fn on_step(&mut self, observation: &Observation<'_>) -> Vec<TradeRequest>;

    /// Called once before each episode.
    fn reset(&mut self) {}
}

/// Per-episode driver settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSettings {
    pub episode: u64,
    pub mode: ResetMode,
    /// Lookback reserved at reset and shown to the strategy.
    pub rollback_periods: usize,
    pub max_steps: Option<usize>,
}

impl EpisodeSettings {
    pub fn new(episode: u64) -> Self {
        Self {
            episode,
            mode: ResetMode::Start,
            rollback_periods: 0,
            max_steps: None,
        }
    }
}

/// Outcome of one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub episode: u64,
    pub strategy: String,
    pub mode: ResetMode,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub steps: usize,
    pub total_reward: f64,
    pub discounted_reward: f64,
    /// Requests the broker refused (duplicate id, bad parameters, unknown symbol).
    pub refused_requests: usize,
    pub summary: BrokerInfo,
    pub trades: Vec<TradeInfo>,
}

/// Run one episode on `session`, which is reset first.
pub fn run_episode<S: Strategy + ?Sized>(
    session: &mut Session,
    strategy: &mut S,
    settings: &EpisodeSettings,
) -> SimResult<EpisodeReport> {
    let start = session.reset(settings.mode, settings.rollback_periods)?;
    strategy.reset();

    let mut steps = 0usize;
    let mut total_reward = 0.0;
    let mut discounted_reward = 0.0;
    let mut refused_requests = 0usize;

    while !session.has_reached_end()? && settings.max_steps.map_or(true, |max| steps < max) {
        let requests = {
            let observation = Observation {
                step: steps,
                timestamp: session.timestamp()?,
                window: session.window(settings.rollback_periods)?,
                broker: session.broker(),
            };
            strategy.on_step(&observation)
        };

        for request in requests {
            match session.open_trade(request) {
                Ok(_) => {}
                Err(
                    e @ (SimError::DuplicateId(_)
                    | SimError::InvalidTrade { .. }
                    | SimError::UnknownSymbol(_)),
                ) => {
                    warn!(episode = settings.episode, error = %e, "trade request refused");
                    refused_requests += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let step = session.next()?;
        total_reward += step.reward;
        discounted_reward += step.discounted_reward;
        steps += 1;
    }

    let end = session.timestamp()?;
    let summary = session.info()?;
    let trades: Vec<TradeInfo> = session.broker().trades().iter().map(|t| t.info()).collect();

    info!(
        episode = settings.episode,
        strategy = strategy.name(),
        steps,
        trades = trades.len(),
        reward = total_reward,
        "episode finished"
    );

    Ok(EpisodeReport {
        episode: settings.episode,
        strategy: strategy.name().to_string(),
        mode: settings.mode,
        start,
        end,
        steps,
        total_reward,
        discounted_reward,
        refused_requests,
        summary,
        trades,
    })
}
