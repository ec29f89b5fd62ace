//! TradeSim Core — discrete-time market replay and trade state machine.
//!
//! This crate contains the simulation kernel:
//! - Domain types (candles, market slices, trade ids, directions, statuses)
//! - Dataset validation onto a fixed interval lattice
//! - Clock and market replay with filter-then-deliver broadcast
//! - Trade lifecycle with fills, stop-loss/take-profit exits and commission
//! - Broker trade book and portfolio aggregates
//! - Deterministic per-episode seeding

pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod rng;

pub use data::{validate_dataset, DataValidationError, Dataset, RawDataset};
pub use domain::{Candle, DatasetHash, Direction, MarketSlice, RawCandle, TradeId, TradeStatus};
pub use engine::{
    Broker, BrokerConfig, BrokerInfo, Clock, ClockObserver, ExitReason, Market, MarketWindow,
    OrderTiming, OutOfRangeError, ResetMode, Session, Step, Subscriber, SubscriberBook,
    TickOutcome, Trade, TradeInfo, TradeRequest,
};
pub use error::{SimError, SimResult};
pub use rng::EpisodeSeeds;
