//! TradeSim Runner — episode orchestration on top of the simulation kernel.
//!
//! This crate builds on `tradesim-core` to provide:
//! - TOML run configuration with humantime intervals
//! - CSV dataset ingest
//! - A strategy trait and the per-episode driver loop
//! - A scripted bracket strategy for reference runs
//! - Parallel, seed-deterministic episode sweeps
//! - CSV/JSON export of trade ledgers and reports
//! - Tracing subscriber setup

pub mod config;
pub mod data_loader;
pub mod episode;
pub mod export;
pub mod strategies;
pub mod sweep;
pub mod telemetry;

pub use config::{
    parse_interval, ConfigError, DatasetConfig, EpisodeConfig, RunConfig, StrategyConfig,
};
pub use data_loader::{load_csv, read_csv, LoadError};
pub use episode::{run_episode, EpisodeReport, EpisodeSettings, Observation, Strategy};
pub use export::{report_json, save_artifacts, trades_csv};
pub use strategies::AlternatingBracket;
pub use sweep::{prepare_market, run_config, run_sweep, SweepResults};
pub use telemetry::init_tracing;

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<EpisodeSettings>();
        assert_sync::<EpisodeSettings>();
    }

    #[test]
    fn reports_are_send_sync() {
        assert_send::<EpisodeReport>();
        assert_sync::<EpisodeReport>();
        assert_send::<SweepResults>();
        assert_sync::<SweepResults>();
    }

    #[test]
    fn strategy_is_send() {
        assert_send::<AlternatingBracket>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
        assert_send::<LoadError>();
        assert_sync::<LoadError>();
    }
}
