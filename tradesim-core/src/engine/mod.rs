//! Simulation engine: clock, market replay, trades and the broker that owns
//! them.

pub mod broker;
pub mod clock;
pub mod market;
pub mod session;
pub mod trade;

pub use broker::{Broker, BrokerConfig, BrokerInfo};
pub use clock::{Clock, ClockObserver, OutOfRangeError, ResetMode};
pub use market::{Market, MarketWindow, Subscriber, SubscriberBook};
pub use session::{Session, Step};
pub use trade::{ExitReason, OrderTiming, TickOutcome, Trade, TradeInfo, TradeRequest};
