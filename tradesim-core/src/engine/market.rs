//! Market — replays a validated dataset and broadcasts each slice to live
//! subscribers.
//!
//! The market owns the dataset and its clock. Subscribers are held by id only;
//! the objects themselves live in a [`SubscriberBook`] (the broker) that is
//! passed in explicitly on every broadcast. Each broadcast prunes terminal
//! subscribers first, delivers the same immutable slice to a snapshot of the
//! remaining ids in registration order, and then drops whoever finished.

use crate::data::{validate_dataset, Dataset, RawDataset};
use crate::domain::{MarketSlice, TradeId};
use crate::engine::clock::{Clock, ClockObserver, OutOfRangeError, ResetMode};
use crate::engine::trade::TickOutcome;
use crate::error::{SimError, SimResult};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, trace};

/// Anything that evaluates market slices and eventually finishes.
pub trait Subscriber {
    fn subscriber_id(&self) -> &TradeId;
    fn is_terminal(&self) -> bool;
    fn on_market_data(&mut self, slice: &MarketSlice) -> SimResult<TickOutcome>;
}

/// Owner of the subscriber objects the market refers to by id.
pub trait SubscriberBook {
    type Item: Subscriber;

    fn lookup(&self, id: &TradeId) -> Option<&Self::Item>;
    fn lookup_mut(&mut self, id: &TradeId) -> Option<&mut Self::Item>;
}

/// Contiguous run of slices `[timestamp − lookback·interval, timestamp]`.
#[derive(Debug, Clone, Copy)]
pub struct MarketWindow<'a> {
    slices: &'a [MarketSlice],
    interval: TimeDelta,
}

impl<'a> MarketWindow<'a> {
    pub fn slices(&self) -> &'a [MarketSlice] {
        self.slices
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn interval(&self) -> TimeDelta {
        self.interval
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.slices.first().map(|s| s.timestamp)
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.slices.last().map(|s| s.timestamp)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a MarketSlice> {
        self.slices.iter()
    }

    /// Close prices of `symbol`, oldest first.
    pub fn closes(&self, symbol: &str) -> Vec<f64> {
        self.slices
            .iter()
            .filter_map(|s| s.get(symbol).map(|c| c.close))
            .collect()
    }

    /// Feature rows of `symbol`, oldest first.
    pub fn features(&self, symbol: &str) -> Vec<Vec<f64>> {
        self.slices
            .iter()
            .filter_map(|s| s.features(symbol))
            .collect()
    }
}

/// Historical market replay on a fixed interval.
#[derive(Debug, Clone)]
pub struct Market {
    interval: TimeDelta,
    declared_symbols: Vec<String>,
    dataset: Option<Dataset>,
    clock: Option<Clock>,
    cursor: usize,
    subscribers: Vec<TradeId>,
}

impl Market {
    pub fn new(interval: TimeDelta) -> Self {
        Self {
            interval,
            declared_symbols: Vec::new(),
            dataset: None,
            clock: None,
            cursor: 0,
            subscribers: Vec::new(),
        }
    }

    /// Symbols that must be present at every timestamp. Overrides any set
    /// declared on the raw dataset.
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared_symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Validate `raw` and position the clock at its first timestamp.
    /// A market is prepared exactly once.
    pub fn prepare(&mut self, raw: RawDataset) -> SimResult<()> {
        if self.dataset.is_some() {
            return Err(SimError::AlreadyPrepared);
        }
        let raw = if self.declared_symbols.is_empty() {
            raw
        } else {
            raw.with_symbols(self.declared_symbols.clone())
        };
        let dataset = validate_dataset(raw, self.interval)?;
        let clock = Clock::new(dataset.start(), dataset.end(), self.interval)?;

        info!(
            symbols = dataset.symbols().len(),
            slices = dataset.len(),
            start = %dataset.start(),
            end = %dataset.end(),
            hash = %dataset.hash(),
            "market prepared"
        );

        self.dataset = Some(dataset);
        self.clock = Some(clock);
        self.cursor = 0;
        self.subscribers.clear();
        Ok(())
    }

    pub fn is_prepared(&self) -> bool {
        self.dataset.is_some()
    }

    pub fn interval(&self) -> TimeDelta {
        self.interval
    }

    pub fn dataset(&self) -> SimResult<&Dataset> {
        self.dataset.as_ref().ok_or(SimError::NotPrepared)
    }

    pub fn clock(&self) -> SimResult<&Clock> {
        self.clock.as_ref().ok_or(SimError::NotPrepared)
    }

    pub fn timestamp(&self) -> SimResult<DateTime<Utc>> {
        Ok(self.clock()?.current())
    }

    /// The slice at the current timestamp.
    pub fn slice(&self) -> SimResult<&MarketSlice> {
        self.dataset()?
            .slice_at(self.cursor)
            .ok_or(SimError::NotPrepared)
    }

    pub fn tracks_symbol(&self, symbol: &str) -> SimResult<bool> {
        Ok(self.dataset()?.tracks(symbol))
    }

    pub fn has_reached_end(&self) -> SimResult<bool> {
        Ok(self.clock()?.has_reached_end())
    }

    /// Advance one interval and broadcast the new slice to every live
    /// subscriber in `book`.
    pub fn next<B: SubscriberBook>(&mut self, book: &mut B) -> SimResult<&MarketSlice> {
        let clock = self.clock.as_mut().ok_or(SimError::NotPrepared)?;
        clock.advance()?;
        self.sync_to_clock()?;
        self.broadcast(book)?;
        self.slice()
    }

    /// Reposition time and drop every subscriber. The dataset is kept.
    pub fn reset(&mut self, mode: ResetMode, rollback_periods: usize) -> SimResult<DateTime<Utc>> {
        let clock = self.clock.as_mut().ok_or(SimError::NotPrepared)?;
        let now = clock.reset(mode, rollback_periods)?;
        self.sync_to_clock()?;
        self.subscribers.clear();
        info!(?mode, rollback_periods, now = %now, "market reset");
        Ok(now)
    }

    fn sync_to_clock(&mut self) -> SimResult<()> {
        let now = self.timestamp()?;
        self.on_tick(now);
        Ok(())
    }

    /// Attach a subscriber and immediately evaluate it against the current
    /// slice. A subscriber that is terminal after that first tick is not kept.
    pub fn register<S: Subscriber + ?Sized>(&mut self, subscriber: &mut S) -> SimResult<TickOutcome> {
        let id = subscriber.subscriber_id().clone();
        if self.subscribers.contains(&id) {
            return Err(SimError::DuplicateId(id));
        }
        let slice = self
            .dataset
            .as_ref()
            .and_then(|d| d.slice_at(self.cursor))
            .ok_or(SimError::NotPrepared)?;

        let outcome = subscriber.on_market_data(slice)?;
        if !subscriber.is_terminal() {
            self.subscribers.push(id);
        }
        Ok(outcome)
    }

    /// Detach `id`. Returns whether it was subscribed.
    pub fn unregister(&mut self, id: &TradeId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s != id);
        self.subscribers.len() != before
    }

    /// Live subscriber ids in registration order.
    pub fn subscribers(&self) -> &[TradeId] {
        &self.subscribers
    }

    /// Deliver the current slice to every live subscriber. Returns how many
    /// were notified.
    pub fn broadcast<B: SubscriberBook>(&mut self, book: &mut B) -> SimResult<usize> {
        let slice = self
            .dataset
            .as_ref()
            .and_then(|d| d.slice_at(self.cursor))
            .ok_or(SimError::NotPrepared)?;

        self.subscribers
            .retain(|id| book.lookup(id).is_some_and(|s| !s.is_terminal()));
        let live = self.subscribers.clone();
        trace!(ts = %slice.timestamp, live = live.len(), "broadcast");

        let mut finished = Vec::new();
        for id in &live {
            let Some(subscriber) = book.lookup_mut(id) else {
                finished.push(id.clone());
                continue;
            };
            let outcome = subscriber.on_market_data(slice)?;
            if outcome.is_terminal() || subscriber.is_terminal() {
                finished.push(id.clone());
            }
        }
        if !finished.is_empty() {
            self.subscribers.retain(|id| !finished.contains(id));
        }
        Ok(live.len())
    }

    /// Slices in `[timestamp − lookback·interval, timestamp]`.
    pub fn get_window(
        &self,
        timestamp: DateTime<Utc>,
        lookback_periods: usize,
    ) -> SimResult<MarketWindow<'_>> {
        let dataset = self.dataset()?;
        if timestamp > dataset.end() {
            return Err(OutOfRangeError::WindowAfterEnd {
                timestamp,
                until: dataset.end(),
            }
            .into());
        }
        let before_start = || OutOfRangeError::WindowBeforeStart {
            window_start: window_start(timestamp, self.interval, lookback_periods),
            since: dataset.start(),
        };
        if timestamp < dataset.start() {
            return Err(before_start().into());
        }
        let index = dataset
            .index_of(timestamp)
            .ok_or(OutOfRangeError::OffGrid(timestamp))?;
        if lookback_periods > index {
            return Err(before_start().into());
        }
        Ok(MarketWindow {
            slices: &dataset.slices()[index - lookback_periods..=index],
            interval: self.interval,
        })
    }

    /// Window ending at the current timestamp.
    pub fn current_window(&self, lookback_periods: usize) -> SimResult<MarketWindow<'_>> {
        self.get_window(self.timestamp()?, lookback_periods)
    }
}

impl ClockObserver for Market {
    fn on_tick(&mut self, now: DateTime<Utc>) {
        if let Some(index) = self.dataset.as_ref().and_then(|d| d.index_of(now)) {
            self.cursor = index;
        }
    }
}

fn window_start(timestamp: DateTime<Utc>, interval: TimeDelta, lookback: usize) -> DateTime<Utc> {
    i32::try_from(lookback)
        .ok()
        .and_then(|n| interval.checked_mul(n))
        .and_then(|span| timestamp.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
