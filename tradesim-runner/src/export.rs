//! Export — trade ledgers as CSV, episode and sweep reports as JSON.
//!
//! Every persisted JSON artifact carries a `schema_version`; unknown versions
//! are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tradesim_core::TradeInfo;

use crate::episode::EpisodeReport;
use crate::sweep::SweepResults;

/// Version of the JSON artifact layout.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Versioned<T> {
    schema_version: u32,
    #[serde(flatten)]
    body: T,
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export a trade ledger as CSV, one row per trade in booking order.
///
/// Columns: id, symbol, direction, status, quantity, leverage, stop_loss_pct,
/// risk_reward, creation_ts, execution_ts, fill_price, stop_loss_price,
/// take_profit_price, close_ts, close_price, exit_reason, time_in_trade,
/// commission, realized_pnl, realized_pnl_pct, discounted_realized_pnl_pct,
/// unrealized_pnl
pub fn trades_csv(trades: &[TradeInfo]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "id",
        "symbol",
        "direction",
        "status",
        "quantity",
        "leverage",
        "stop_loss_pct",
        "risk_reward",
        "creation_ts",
        "execution_ts",
        "fill_price",
        "stop_loss_price",
        "take_profit_price",
        "close_ts",
        "close_price",
        "exit_reason",
        "time_in_trade",
        "commission",
        "realized_pnl",
        "realized_pnl_pct",
        "discounted_realized_pnl_pct",
        "unrealized_pnl",
    ])?;

    for t in trades {
        wtr.write_record([
            t.id.as_str(),
            &t.symbol,
            &t.direction.to_string(),
            &t.status.to_string(),
            &format!("{:.6}", t.quantity),
            &format!("{:.2}", t.leverage),
            &opt(t.stop_loss_pct, 6),
            &opt(t.risk_reward, 4),
            &t.creation_timestamp.to_rfc3339(),
            &t.execution_timestamp.to_rfc3339(),
            &opt(t.fill_price, 6),
            &opt(t.stop_loss_price, 6),
            &opt(t.take_profit_price, 6),
            &t.close_timestamp.map(|ts| ts.to_rfc3339()).unwrap_or_default(),
            &opt(t.close_price, 6),
            &t.exit_reason.map(|r| format!("{r:?}")).unwrap_or_default(),
            &t.time_in_trade.to_string(),
            &format!("{:.6}", t.paid_commission),
            &format!("{:.6}", t.realized_pnl),
            &format!("{:.8}", t.realized_pnl_pct),
            &format!("{:.8}", t.discounted_realized_pnl_pct),
            &format!("{:.6}", t.unrealized_pnl),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{v:.precision$}"))
        .unwrap_or_default()
}

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize an episode report to pretty JSON.
pub fn report_json(report: &EpisodeReport) -> Result<String> {
    to_versioned_json(report).context("failed to serialize EpisodeReport to JSON")
}

/// Deserialize an episode report, rejecting unknown schema versions.
pub fn import_report_json(json: &str) -> Result<EpisodeReport> {
    from_versioned_json(json).context("failed to deserialize EpisodeReport from JSON")
}

/// Serialize sweep results to pretty JSON.
pub fn sweep_json(results: &SweepResults) -> Result<String> {
    to_versioned_json(results).context("failed to serialize SweepResults to JSON")
}

pub fn import_sweep_json(json: &str) -> Result<SweepResults> {
    from_versioned_json(json).context("failed to deserialize SweepResults from JSON")
}

fn to_versioned_json<T: Serialize>(body: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(&Versioned {
        schema_version: SCHEMA_VERSION,
        body,
    })?)
}

fn from_versioned_json<T: for<'de> Deserialize<'de>>(json: &str) -> Result<T> {
    let versioned: Versioned<T> = serde_json::from_str(json)?;
    if versioned.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            versioned.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(versioned.body)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save a sweep's artifacts under `output_dir/sweep_{hash prefix}_{seed}/`:
/// - `sweep.json` — every episode report
/// - `episode_{n}_trades.csv` — one trade ledger per episode
///
/// Returns the path to the created directory.
pub fn save_artifacts(results: &SweepResults, output_dir: &Path) -> Result<PathBuf> {
    let hash: String = results.dataset_hash.0.chars().take(12).collect();
    let run_dir = output_dir.join(format!("sweep_{}_{}", hash, results.master_seed));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let json = sweep_json(results)?;
    std::fs::write(run_dir.join("sweep.json"), &json)
        .with_context(|| format!("failed to write sweep.json in {}", run_dir.display()))?;

    for report in results.all() {
        let path = run_dir.join(format!("episode_{}_trades.csv", report.episode));
        std::fs::write(&path, trades_csv(&report.trades)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(run_dir)
}

/// Load sweep results from an artifact directory's `sweep.json`.
pub fn load_artifacts(dir: &Path) -> Result<SweepResults> {
    let path = dir.join("sweep.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_sweep_json(&json)
}
