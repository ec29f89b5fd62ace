//! Seed sweeps — many episodes over one dataset, run in parallel.
//!
//! Each worker clones the prepared market into its own `Session`, so the
//! kernel stays single-threaded and episodes never share state. Episode `i`
//! always gets the same reset mode for a given master seed and dataset,
//! regardless of scheduling.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use tradesim_core::{Broker, DatasetHash, EpisodeSeeds, Market, Session};

use crate::config::RunConfig;
use crate::data_loader::load_csv;
use crate::episode::{run_episode, EpisodeReport, EpisodeSettings};
use crate::strategies::AlternatingBracket;

/// Load the configured CSV and prepare a market on it.
pub fn prepare_market(config: &RunConfig) -> Result<Market> {
    let interval = config.interval()?;
    let path = &config.dataset.path;
    let raw = load_csv(path, &config.dataset.symbols)
        .with_context(|| format!("failed to load dataset {}", path.display()))?;
    let mut market = Market::new(interval);
    market
        .prepare(raw)
        .with_context(|| format!("dataset {} failed validation", path.display()))?;
    Ok(market)
}

/// Run `config.episodes.episodes` episodes of the bracket strategy on clones
/// of `market`.
pub fn run_sweep(market: &Market, config: &RunConfig) -> Result<SweepResults> {
    let dataset_hash = market.dataset()?.hash().clone();
    let seeds = EpisodeSeeds::new(config.episodes.master_seed);
    let episodes = &config.episodes;

    let reports = (0..episodes.episodes)
        .into_par_iter()
        .map(|episode| {
            let settings = EpisodeSettings {
                episode,
                mode: seeds.reset_mode(&dataset_hash, episode, episodes.random_start),
                rollback_periods: episodes.rollback_periods,
                max_steps: episodes.max_steps,
            };
            let mut session = Session::new(market.clone(), Broker::new(config.broker));
            let mut strategy = AlternatingBracket::new(config.strategy.clone());
            run_episode(&mut session, &mut strategy, &settings)
                .with_context(|| format!("episode {episode} failed"))
        })
        .collect::<Result<Vec<_>>>()?;

    let results = SweepResults {
        dataset_hash,
        master_seed: seeds.master_seed(),
        reports,
    };
    info!(
        episodes = results.len(),
        mean_reward = results.mean_reward().unwrap_or(0.0),
        "sweep finished"
    );
    Ok(results)
}

/// Load, prepare and sweep in one call.
pub fn run_config(config: &RunConfig) -> Result<SweepResults> {
    let market = prepare_market(config)?;
    run_sweep(&market, config)
}

/// Episode reports from one sweep, in episode order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResults {
    pub dataset_hash: DatasetHash,
    pub master_seed: u64,
    pub reports: Vec<EpisodeReport>,
}

impl SweepResults {
    pub fn all(&self) -> &[EpisodeReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn get(&self, episode: u64) -> Option<&EpisodeReport> {
        self.reports.iter().find(|r| r.episode == episode)
    }

    /// Mean total reward per episode; `None` for an empty sweep.
    pub fn mean_reward(&self) -> Option<f64> {
        if self.reports.is_empty() {
            return None;
        }
        let sum: f64 = self.reports.iter().map(|r| r.total_reward).sum();
        Some(sum / self.reports.len() as f64)
    }

    /// Episodes sorted by total reward (descending).
    pub fn sorted_by_reward(&self) -> Vec<&EpisodeReport> {
        let mut sorted: Vec<_> = self.reports.iter().collect();
        sorted.sort_by(|a, b| b.total_reward.total_cmp(&a.total_reward));
        sorted
    }

    pub fn best(&self) -> Option<&EpisodeReport> {
        self.sorted_by_reward().into_iter().next()
    }

    pub fn total_trades(&self) -> usize {
        self.reports.iter().map(|r| r.trades.len()).sum()
    }
}
