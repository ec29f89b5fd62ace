//! Domain types shared by the simulation kernel.

pub mod candle;
pub mod ids;
pub mod side;

pub use candle::{Candle, MarketSlice, RawCandle, REQUIRED_COLUMNS};
pub use ids::{DatasetHash, TradeId};
pub use side::{Direction, TradeStatus};
