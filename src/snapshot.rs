use crate::types::{Bar, Symbol};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use tracing::{error, warn};

/// Persisted bar-map shape (§6): `{minute_ts -> {symbol -> bar}}`, written at
/// session end and used only to seed a restart.
pub type SnapshotData = HashMap<DateTime<Utc>, HashMap<Symbol, Bar>>;

/// Writes the snapshot as JSON, overwriting any previous file at `path`.
pub fn save(path: &str, data: &SnapshotData) -> Result<()> {
	let json = serde_json::to_string(data).context("Failed to serialize snapshot")?;
	fs::write(path, json).with_context(|| format!("Failed to write snapshot file: {path}"))
}

/// Loads a snapshot if present. A corrupted file is renamed with a
/// `.corrupt` suffix and `None` is returned so the caller starts fresh
/// (§7: corrupted snapshot policy).
pub fn load(path: &str) -> Option<SnapshotData> {
	let content = match fs::read_to_string(path) {
		Ok(content) => content,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
		Err(e) => {
			warn!(error = %e, path, "failed to read snapshot file, starting fresh");
			return None;
		},
	};

	match serde_json::from_str::<SnapshotData>(&content) {
		Ok(data) => Some(data),
		Err(e) => {
			warn!(error = %e, path, "snapshot file corrupted, renaming and starting fresh");
			let corrupt_path = format!("{path}.corrupt");
			if let Err(rename_err) = fs::rename(path, &corrupt_path) {
				error!(error = %rename_err, path, "failed to rename corrupted snapshot file");
			}
			None
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use std::path::PathBuf;

	fn temp_path(name: &str) -> PathBuf {
		std::env::temp_dir().join(name)
	}

	#[test]
	fn round_trips_through_json() {
		let path = temp_path("surgewatch_snapshot_roundtrip.json");
		let minute = Utc.with_ymd_and_hms(2024, 6, 10, 9, 30, 0).single().expect("valid datetime");
		let mut by_symbol = HashMap::new();
		by_symbol.insert(Symbol::new("AAPL"), Bar::first(10.0, 100.0));
		let mut data = SnapshotData::new();
		data.insert(minute, by_symbol);

		save(path.to_str().expect("path"), &data).expect("save");
		let loaded = load(path.to_str().expect("path")).expect("load");
		assert_eq!(loaded.len(), 1);
		fs::remove_file(&path).ok();
	}

	#[test]
	fn corrupted_file_is_renamed_and_load_returns_none() {
		let path = temp_path("surgewatch_snapshot_corrupt.json");
		fs::write(&path, "not valid json").expect("write corrupt file");

		let loaded = load(path.to_str().expect("path"));
		assert!(loaded.is_none());
		assert!(PathBuf::from(format!("{}.corrupt", path.to_str().expect("path"))).exists());

		fs::remove_file(format!("{}.corrupt", path.to_str().expect("path"))).ok();
	}

	#[test]
	fn missing_file_returns_none_without_error() {
		let path = temp_path("surgewatch_snapshot_missing_does_not_exist.json");
		assert!(load(path.to_str().expect("path")).is_none());
	}
}
