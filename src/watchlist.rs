use crate::types::Symbol;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;

/// Loads the watchlist (§6): newline/CSV list of symbols, skipping a
/// literal `SYMBOL`/`TICKER` header row if present.
pub fn load(path: &str) -> Result<HashSet<Symbol>> {
	let content = fs::read_to_string(path).with_context(|| format!("Failed to read watchlist file: {path}"))?;

	let mut symbols = HashSet::new();
	for (i, line) in content.lines().enumerate() {
		let field = line.split(',').next().unwrap_or("").trim();
		if field.is_empty() {
			continue;
		}
		if i == 0 && matches!(field.to_uppercase().as_str(), "SYMBOL" | "TICKER") {
			continue;
		}
		symbols.insert(Symbol::new(field));
	}

	Ok(symbols)
}
