use crate::engine::Engine;
use crate::types::{RawTimestamp, Symbol, TradeEvent};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct ReplayRow {
	symbol: String,
	price: f64,
	size: f64,
	ts_epoch_secs: i64,
}

/// Synchronous single-threaded replay driver (§5 Replay mode): feeds
/// historical trade events through the same `Engine::on_trade` entrypoint
/// used by live ingest, resetting per-symbol state at each day boundary.
/// The input file MUST already be in global chronological order.
pub struct ReplayDriver;

impl ReplayDriver {
	pub async fn run(engine: Arc<Engine>, path: &str) -> Result<()> {
		let mut reader = csv::Reader::from_path(path).with_context(|| format!("Failed to open replay file: {path}"))?;

		let mut current_day: Option<DateTime<Utc>> = None;
		let mut rows_played = 0u64;

		for result in reader.deserialize::<ReplayRow>() {
			let row = result.context("failed to parse replay row")?;
			let ts = RawTimestamp::Secs(row.ts_epoch_secs);
			let Some(utc_ts) = ts.to_utc() else {
				continue;
			};

			if current_day.is_some_and(|day| day.date_naive() != utc_ts.date_naive()) {
				info!("replay day boundary crossed, resetting per-symbol state");
				engine.reset_all().await;
			}
			current_day = Some(utc_ts);

			engine.on_trade(TradeEvent { symbol: Symbol::new(&row.symbol), price: row.price, size: row.size, ts }).await;
			rows_played += 1;
		}

		info!("replay complete: {rows_played} rows played");
		Ok(())
	}
}
