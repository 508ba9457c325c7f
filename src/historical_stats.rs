use crate::types::{HistoricalStats, Symbol};
use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::warn;

#[derive(serde::Deserialize)]
struct Row {
	symbol: String,
	avg_volume_20d: f64,
	avg_range_20d: f64,
	#[allow(dead_code)]
	last_updated: String,
}

/// Loads historical stats (§6): CSV with columns `symbol, avg_volume_20d,
/// avg_range_20d, last_updated`. Malformed rows are skipped with a warning
/// rather than aborting the whole load (§7 error policy).
pub fn load(path: &str) -> Result<HashMap<Symbol, HistoricalStats>> {
	let mut reader = csv::Reader::from_path(path).with_context(|| format!("Failed to open historical stats file: {path}"))?;

	let mut stats = HashMap::new();
	for result in reader.deserialize::<Row>() {
		match result {
			Ok(row) => {
				stats.insert(
					Symbol::new(&row.symbol),
					HistoricalStats { avg_volume_20d: row.avg_volume_20d, avg_range_20d: row.avg_range_20d },
				);
			},
			Err(e) => warn!(error = %e, "skipping malformed historical stats row"),
		}
	}

	Ok(stats)
}
