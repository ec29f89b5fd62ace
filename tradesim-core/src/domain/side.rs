//! Trade direction and lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position direction. The sign drives every P&L formula so LONG and SHORT
/// share one code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for LONG, -1 for SHORT.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Trade lifecycle states.
///
/// ```text
/// Created ──► Filled ──► Closed
///    │
///    └──────► Rejected
/// ```
///
/// `Rejected` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeStatus {
    /// Waiting for the execution tick.
    Created,
    /// Position is open at `fill_price`.
    Filled,
    /// Execution tick was skipped; never filled.
    Rejected,
    /// Exited at stop-loss or take-profit.
    Closed,
}

impl TradeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TradeStatus::Rejected | TradeStatus::Closed)
    }

    /// Whether `self → next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: TradeStatus) -> bool {
        matches!(
            (self, next),
            (TradeStatus::Created, TradeStatus::Filled)
                | (TradeStatus::Created, TradeStatus::Rejected)
                | (TradeStatus::Filled, TradeStatus::Closed)
        )
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeStatus::Created => "CREATED",
            TradeStatus::Filled => "FILLED",
            TradeStatus::Rejected => "REJECTED",
            TradeStatus::Closed => "CLOSED",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_signs() {
        assert_eq!(Direction::Long.sign(), 1.0);
        assert_eq!(Direction::Short.sign(), -1.0);
        assert_eq!(Direction::Long.opposite(), Direction::Short);
    }

    #[test]
    fn only_lifecycle_edges_are_allowed() {
        use TradeStatus::*;
        let all = [Created, Filled, Rejected, Closed];
        let mut allowed = Vec::new();
        for from in all {
            for to in all {
                if from.can_transition_to(to) {
                    allowed.push((from, to));
                }
            }
        }
        assert_eq!(
            allowed,
            vec![(Created, Filled), (Created, Rejected), (Filled, Closed)]
        );
    }

    #[test]
    fn terminal_states() {
        assert!(TradeStatus::Closed.is_terminal());
        assert!(TradeStatus::Rejected.is_terminal());
        assert!(!TradeStatus::Created.is_terminal());
        assert!(!TradeStatus::Filled.is_terminal());
    }
}
