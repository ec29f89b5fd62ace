//! Criterion benchmarks for TradeSim hot paths.
//!
//! Benchmarks:
//! 1. Dataset validation (raw rows → lattice-indexed slices)
//! 2. Full replay with a growing trade book
//! 3. Lookback window extraction

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tradesim_core::{
    validate_dataset, Broker, BrokerConfig, Direction, Market, RawCandle, RawDataset,
    TradeRequest,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()
}

fn make_raw(n: usize, symbols: &[&str]) -> RawDataset {
    let interval = TimeDelta::minutes(1);
    let mut rows = Vec::with_capacity(n * symbols.len());
    for (s, symbol) in symbols.iter().enumerate() {
        for i in 0..n {
            let close = 100.0 + s as f64 + (i as f64 * 0.1).sin() * 10.0;
            rows.push(
                RawCandle::new(
                    *symbol,
                    start() + interval * i as i32,
                    close - 0.3,
                    close + 1.5,
                    close - 1.5,
                    close,
                    1_000.0,
                )
                .with_extra("rsi_14", 50.0),
            );
        }
    }
    RawDataset::from_rows(rows)
}

fn prepared(n: usize) -> Market {
    let mut m = Market::new(TimeDelta::minutes(1));
    m.prepare(make_raw(n, &["BTC", "ETH"])).unwrap();
    m
}

// ── 1. Validation ────────────────────────────────────────────────────

fn bench_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_dataset");
    for n in [1_000usize, 10_000] {
        let raw = make_raw(n, &["BTC", "ETH", "SOL"]);
        group.bench_with_input(BenchmarkId::from_parameter(n), &raw, |b, raw| {
            b.iter(|| validate_dataset(black_box(raw.clone()), TimeDelta::minutes(1)))
        });
    }
    group.finish();
}

// ── 2. Replay ────────────────────────────────────────────────────────

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    for every in [50usize, 5] {
        group.bench_with_input(
            BenchmarkId::new("open_every", every),
            &every,
            |b, &every| {
                b.iter_batched(
                    || prepared(5_000),
                    |mut market| {
                        let mut broker = Broker::new(BrokerConfig {
                            commission_rate: 0.0005,
                            time_discount_factor: Some(0.999),
                        });
                        let mut step = 0u64;
                        loop {
                            if step as usize % every == 0 {
                                let direction = if step % 2 == 0 {
                                    Direction::Long
                                } else {
                                    Direction::Short
                                };
                                let req = TradeRequest::new(step, "BTC", direction, 1.0)
                                    .stop_loss(0.02)
                                    .risk_reward(1.5);
                                let _ = broker.open_trade(&mut market, req);
                            }
                            if market.next(&mut broker).is_err() {
                                break;
                            }
                            step += 1;
                        }
                        black_box(broker.realized_profit())
                    },
                    criterion::BatchSize::LargeInput,
                )
            },
        );
    }
    group.finish();
}

// ── 3. Windows ───────────────────────────────────────────────────────

fn bench_window(c: &mut Criterion) {
    let market = prepared(5_000);
    let at = start() + TimeDelta::minutes(4_000);
    c.bench_function("get_window_256", |b| {
        b.iter(|| {
            let window = market.get_window(black_box(at), 256).unwrap();
            black_box(window.features("BTC").len())
        })
    });
}

criterion_group!(benches, bench_validation, bench_replay, bench_window);
criterion_main!(benches);
