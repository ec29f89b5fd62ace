//! Error taxonomy for the simulation kernel.
//!
//! Gap candles, rejected trades and simultaneous stop/take-profit hits are
//! expected state-machine outcomes and never surface here.

use crate::data::DataValidationError;
use crate::domain::{TradeId, TradeStatus};
use crate::engine::clock::OutOfRangeError;
use thiserror::Error;

/// Errors from the market, trade and broker operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("dataset validation failed: {0}")]
    DataValidation(#[from] DataValidationError),

    #[error("out of range: {0}")]
    OutOfRange(#[from] OutOfRangeError),

    #[error("market used before prepare()")]
    NotPrepared,

    #[error("market already prepared; a dataset is validated exactly once")]
    AlreadyPrepared,

    #[error("invalid transition for trade {id}: {from} → {to}")]
    InvalidStateTransition {
        id: TradeId,
        from: TradeStatus,
        to: TradeStatus,
    },

    #[error("trade id {0} already exists")]
    DuplicateId(TradeId),

    #[error("invalid parameters for trade {id}: {reason}")]
    InvalidTrade { id: TradeId, reason: String },

    #[error("symbol {0} is not tracked by the market")]
    UnknownSymbol(String),

    #[error("invalid broker configuration: {0}")]
    InvalidConfig(String),
}

pub type SimResult<T> = Result<T, SimError>;
