use crate::types::{Quote, QuoteEvent};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::types::Symbol;

/// Tracks the latest bid/ask per symbol (C3, §4.3). No history retained.
#[derive(Debug, Default)]
pub struct QuoteBook {
	quotes: HashMap<Symbol, Quote>,
}

impl QuoteBook {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on_quote(&mut self, event: &QuoteEvent, ts: DateTime<Utc>) {
		self.quotes.insert(
			event.symbol.clone(),
			Quote { bid: event.bid, ask: event.ask, bid_size: event.bid_size, ask_size: event.ask_size, ts },
		);
	}

	#[must_use]
	pub fn get(&self, symbol: &Symbol) -> Option<&Quote> {
		self.quotes.get(symbol)
	}

	/// `SpreadRatio`: returns `None` only when no quote and no fallback price
	/// is usable (§4.3); downstream treats `None` as partial credit, not failure.
	#[must_use]
	pub fn spread_ratio(&self, symbol: &Symbol, fallback_price: f64) -> Option<f64> {
		if let Some(quote) = self.quotes.get(symbol) {
			if quote.bid > 0.0 && quote.ask > 0.0 {
				return Some((quote.ask - quote.bid) / ((quote.bid + quote.ask) / 2.0));
			}
		}

		if fallback_price >= 5.0 {
			Some(0.001)
		} else if fallback_price >= 1.0 {
			Some(0.005)
		} else if fallback_price > 0.0 {
			Some(0.01)
		} else {
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::RawTimestamp;
	use chrono::Utc;

	fn quote_event(symbol: &str, bid: f64, ask: f64) -> QuoteEvent {
		QuoteEvent { symbol: Symbol::new(symbol), bid, ask, bid_size: None, ask_size: None, ts: RawTimestamp::Secs(0) }
	}

	#[test]
	fn spread_ratio_uses_live_quote_when_present() {
		let mut book = QuoteBook::new();
		book.on_quote(&quote_event("AAPL", 99.0, 101.0), Utc::now());
		let spread = book.spread_ratio(&Symbol::new("AAPL"), 0.0).expect("spread");
		assert!((spread - 0.02).abs() < 1e-9);
	}

	#[test]
	fn spread_ratio_falls_back_by_price_tier() {
		let book = QuoteBook::new();
		assert!((book.spread_ratio(&Symbol::new("AAPL"), 10.0).expect("spread") - 0.001).abs() < 1e-9);
		assert!((book.spread_ratio(&Symbol::new("AAPL"), 2.0).expect("spread") - 0.005).abs() < 1e-9);
		assert!((book.spread_ratio(&Symbol::new("AAPL"), 0.5).expect("spread") - 0.01).abs() < 1e-9);
	}

	#[test]
	fn spread_ratio_is_none_without_quote_or_price() {
		let book = QuoteBook::new();
		assert!(book.spread_ratio(&Symbol::new("AAPL"), 0.0).is_none());
	}
}
