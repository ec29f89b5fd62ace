//! End-to-end runner tests: CSV on disk → TOML config → sweep → artifacts.

use std::fmt::Write as _;
use std::path::Path;

use tradesim_core::{DataValidationError, SimError, TradeStatus};
use tradesim_runner::export::load_artifacts;
use tradesim_runner::{run_config, save_artifacts, RunConfig};

/// Two symbols, one-minute bars, a slow sine with a ±1.5 range per bar.
fn write_candles(path: &Path, bars: usize, with_volume: bool) {
    let mut csv = String::new();
    if with_volume {
        csv.push_str("symbol,timestamp,open,high,low,close,volume,is_traded,rsi_14\n");
    } else {
        csv.push_str("symbol,timestamp,open,high,low,close,is_traded,rsi_14\n");
    }
    let t0 = 1_704_067_200_000i64; // 2024-01-01T00:00:00Z
    for i in 0..bars {
        for (s, symbol) in ["BTC", "ETH"].iter().enumerate() {
            let close = 100.0 + s as f64 * 10.0 + (i as f64 * 0.15).sin() * 6.0;
            let ts = t0 + i as i64 * 60_000;
            let volume = if with_volume { "1000," } else { "" };
            writeln!(
                csv,
                "{symbol},{ts},{:.4},{:.4},{:.4},{:.4},{volume}true,{:.2}",
                close - 0.2,
                close + 1.5,
                close - 1.5,
                close,
                50.0 + (i % 10) as f64,
            )
            .unwrap();
        }
    }
    std::fs::write(path, csv).unwrap();
}

fn config_for(data: &Path, episodes: u64, random_start: bool) -> RunConfig {
    RunConfig::from_toml(&format!(
        r#"
        [dataset]
        path = "{}"
        interval = "1m"
        symbols = ["BTC", "ETH"]

        [broker]
        commission_rate = 0.0005
        time_discount_factor = 0.99

        [episodes]
        episodes = {episodes}
        master_seed = 2024
        rollback_periods = 8
        random_start = {random_start}
        max_steps = 60

        [strategy]
        symbol = "ETH"
        stop_loss_pct = 0.01
        risk_reward = 1.5
        "#,
        data.display()
    ))
    .unwrap()
}

#[test]
fn sweep_from_disk_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("candles.csv");
    write_candles(&data, 300, true);
    let config = config_for(&data, 8, true);

    let first = run_config(&config).unwrap();
    let second = run_config(&config).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 8);
    assert_eq!(first.master_seed, 2024);

    for report in first.all() {
        assert!(report.steps <= 60);
        assert_eq!(report.refused_requests, 0);
        assert!(report.trades.iter().all(|t| t.symbol == "ETH"));
        // At most one trade is ever live.
        let live = report
            .trades
            .iter()
            .filter(|t| matches!(t.status, TradeStatus::Created | TradeStatus::Filled))
            .count();
        assert!(live <= 1);
    }
    assert!(first.total_trades() > 0);
}

#[test]
fn changing_the_master_seed_moves_random_starts() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("candles.csv");
    write_candles(&data, 400, true);

    let a = run_config(&config_for(&data, 4, true)).unwrap();
    let mut other = config_for(&data, 4, true);
    other.episodes.master_seed = 7;
    let b = run_config(&other).unwrap();

    let starts = |r: &tradesim_runner::SweepResults| {
        r.all().iter().map(|e| e.start).collect::<Vec<_>>()
    };
    assert_ne!(starts(&a), starts(&b));
}

#[test]
fn missing_volume_column_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("no_volume.csv");
    write_candles(&data, 20, false);

    let err = run_config(&config_for(&data, 1, false)).unwrap_err();
    let validation = err.chain().find_map(|e| match e.downcast_ref::<SimError>() {
        Some(SimError::DataValidation(v)) => Some(v.clone()),
        _ => None,
    });
    assert_eq!(
        validation,
        Some(DataValidationError::MissingColumn("volume".into()))
    );
}

#[test]
fn missing_dataset_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = run_config(&config_for(&dir.path().join("absent.csv"), 1, false)).unwrap_err();
    assert!(format!("{err:#}").contains("absent.csv"));
}

#[test]
fn artifacts_are_written_and_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("candles.csv");
    write_candles(&data, 120, true);
    let results = run_config(&config_for(&data, 3, false)).unwrap();

    let out = dir.path().join("out");
    let run_dir = save_artifacts(&results, &out).unwrap();
    assert!(run_dir.join("sweep.json").exists());
    for episode in 0..3 {
        let ledger = run_dir.join(format!("episode_{episode}_trades.csv"));
        let text = std::fs::read_to_string(&ledger).unwrap();
        assert_eq!(
            text.lines().count(),
            results.get(episode).unwrap().trades.len() + 1
        );
    }

    let loaded = load_artifacts(&run_dir).unwrap();
    assert_eq!(loaded.len(), results.len());
    assert_eq!(loaded.dataset_hash, results.dataset_hash);
    for (a, b) in loaded.all().iter().zip(results.all()) {
        assert_eq!(a.episode, b.episode);
        assert_eq!(a.start, b.start);
        assert_eq!(a.trades.len(), b.trades.len());
    }
}
