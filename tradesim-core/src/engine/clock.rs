//! Discrete time source on a fixed interval lattice.
//!
//! The clock owns `{start, end, current, interval}` and guarantees
//! `start ≤ current ≤ end` with `current = start + k·interval`. Advancing past
//! `end` is an error, never a silent clamp.

use crate::data::dataset::lattice_offset;
use chrono::{DateTime, TimeDelta, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Time-range violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OutOfRangeError {
    #[error("cannot advance past end {end}: next tick would be {next}")]
    PastEnd {
        next: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("window start {window_start} precedes data start {since}")]
    WindowBeforeStart {
        window_start: DateTime<Utc>,
        since: DateTime<Utc>,
    },

    #[error("timestamp {timestamp} is after data end {until}")]
    WindowAfterEnd {
        timestamp: DateTime<Utc>,
        until: DateTime<Utc>,
    },

    #[error("timestamp {0} is not on the clock lattice")]
    OffGrid(DateTime<Utc>),

    #[error("rollback of {rollback} periods exceeds the {available} available")]
    RollbackTooLarge { rollback: usize, available: usize },

    #[error("invalid clock range: start {start}, end {end}, interval {interval}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: TimeDelta,
    },
}

/// Where `reset` places the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetMode {
    /// `start + rollback·interval`.
    Start,
    /// Uniform grid point in `[start + rollback·interval, end]`, drawn from a
    /// seeded RNG so episodes are reproducible.
    Random { seed: u64 },
}

/// Receives the current timestamp on registration and on every tick.
pub trait ClockObserver {
    fn on_tick(&mut self, now: DateTime<Utc>);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clock {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    current: DateTime<Utc>,
    interval: TimeDelta,
}

impl Clock {
    /// Create a clock positioned at `start`. `end` must lie on the lattice.
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: TimeDelta,
    ) -> Result<Self, OutOfRangeError> {
        if interval.num_milliseconds() <= 0
            || end < start
            || lattice_offset(start, end, interval).is_none()
        {
            return Err(OutOfRangeError::InvalidRange {
                start,
                end,
                interval,
            });
        }
        Ok(Self {
            start,
            end,
            current: start,
            interval,
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn current(&self) -> DateTime<Utc> {
        self.current
    }

    pub fn interval(&self) -> TimeDelta {
        self.interval
    }

    /// Number of intervals between `start` and `end`.
    pub fn steps(&self) -> usize {
        self.offset_of(self.end).unwrap_or(0)
    }

    /// Lattice index of the current timestamp.
    pub fn position(&self) -> usize {
        self.offset_of(self.current).unwrap_or(0)
    }

    /// Lattice index of `timestamp`, if it lies on the grid within range.
    pub fn offset_of(&self, timestamp: DateTime<Utc>) -> Option<usize> {
        if timestamp > self.end {
            return None;
        }
        lattice_offset(self.start, timestamp, self.interval)
    }

    /// Grid point `start + k·interval`, or `None` past `end`.
    pub fn timestamp_at(&self, k: usize) -> Option<DateTime<Utc>> {
        let span = i32::try_from(k)
            .ok()
            .and_then(|n| self.interval.checked_mul(n))?;
        self.start
            .checked_add_signed(span)
            .filter(|ts| *ts <= self.end)
    }

    /// Move one interval forward.
    pub fn advance(&mut self) -> Result<DateTime<Utc>, OutOfRangeError> {
        let next = self.current + self.interval;
        if next > self.end {
            return Err(OutOfRangeError::PastEnd {
                next,
                end: self.end,
            });
        }
        self.current = next;
        Ok(next)
    }

    /// Reposition the clock; `rollback_periods` reserves a lookback window
    /// before the first observable tick.
    pub fn reset(
        &mut self,
        mode: ResetMode,
        rollback_periods: usize,
    ) -> Result<DateTime<Utc>, OutOfRangeError> {
        let available = self.steps();
        if rollback_periods > available {
            return Err(OutOfRangeError::RollbackTooLarge {
                rollback: rollback_periods,
                available,
            });
        }
        let k = match mode {
            ResetMode::Start => rollback_periods,
            ResetMode::Random { seed } => {
                let mut rng = StdRng::seed_from_u64(seed);
                rng.gen_range(rollback_periods..=available)
            }
        };
        self.current = self
            .timestamp_at(k)
            .ok_or(OutOfRangeError::RollbackTooLarge {
                rollback: rollback_periods,
                available,
            })?;
        Ok(self.current)
    }

    pub fn has_reached_end(&self) -> bool {
        self.current >= self.end
    }

    /// Push the current timestamp to a newly attached observer.
    pub fn register<O: ClockObserver + ?Sized>(&self, observer: &mut O) {
        observer.on_tick(self.current);
    }

    /// Push the current timestamp to every observer, in order.
    pub fn notify_all(&self, observers: &mut [&mut dyn ClockObserver]) {
        for observer in observers.iter_mut() {
            observer.on_tick(self.current);
        }
    }
}
