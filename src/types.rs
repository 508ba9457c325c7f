use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A watchlist ticker, always upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
	pub fn new(raw: &str) -> Self {
		Self(raw.trim().to_uppercase())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Symbol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<&str> for Symbol {
	fn from(raw: &str) -> Self {
		Self::new(raw)
	}
}

impl From<String> for Symbol {
	fn from(raw: String) -> Self {
		Self::new(&raw)
	}
}

/// Eastern-Time trading session label, derived by the clock classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Session {
	Premarket,
	Regular,
	Postmarket,
	Closed,
}

impl fmt::Display for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			Self::Premarket => "PREMARKET",
			Self::Regular => "REGULAR",
			Self::Postmarket => "POSTMARKET",
			Self::Closed => "CLOSED",
		};
		write!(f, "{label}")
	}
}

/// Raw timestamp as received at the ingest boundary, before C1 normalizes it.
#[derive(Debug, Clone, Copy)]
pub enum RawTimestamp {
	Nanos(i64),
	Millis(i64),
	Secs(i64),
	DateTime(DateTime<Utc>),
}

impl RawTimestamp {
	/// Normalizes to a UTC instant. Returns `None` on an out-of-range value.
	#[must_use]
	pub fn to_utc(self) -> Option<DateTime<Utc>> {
		match self {
			Self::DateTime(dt) => Some(dt),
			Self::Secs(s) => DateTime::from_timestamp(s, 0),
			Self::Millis(ms) => DateTime::from_timestamp(ms / 1_000, ((ms % 1_000).unsigned_abs() as u32) * 1_000_000),
			Self::Nanos(ns) => DateTime::from_timestamp(ns / 1_000_000_000, (ns % 1_000_000_000).unsigned_abs() as u32),
		}
	}
}

/// A single trade tick from the ingest layer.
#[derive(Debug, Clone)]
pub struct TradeEvent {
	pub symbol: Symbol,
	pub price: f64,
	pub size: f64,
	pub ts: RawTimestamp,
}

/// A single quote tick from the ingest layer.
#[derive(Debug, Clone)]
pub struct QuoteEvent {
	pub symbol: Symbol,
	pub bid: f64,
	pub ask: f64,
	pub bid_size: Option<f64>,
	pub ask_size: Option<f64>,
	pub ts: RawTimestamp,
}

/// Per-(minute, symbol) OHLCV aggregate. See `bar.rs` for the aggregation rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
	pub open: f64,
	pub high: f64,
	pub low: f64,
	pub close: f64,
	pub volume: f64,
	pub value: f64,
	pub trade_count: u64,
}

impl Bar {
	pub fn first(price: f64, size: f64) -> Self {
		Self { open: price, high: price, low: price, close: price, volume: size, value: price * size, trade_count: 1 }
	}

	pub fn push(&mut self, price: f64, size: f64) {
		self.close = price;
		self.high = self.high.max(price);
		self.low = self.low.min(price);
		self.volume += size;
		self.value += price * size;
		self.trade_count += 1;
	}

	#[must_use]
	pub fn vwap(&self) -> f64 {
		if self.volume > 0.0 {
			self.value / self.volume
		} else {
			self.close
		}
	}

	#[must_use]
	pub fn pct_change(&self) -> f64 {
		if self.open > 0.0 {
			(self.close - self.open) / self.open * 100.0
		} else {
			0.0
		}
	}
}

/// Snapshot of bar-derived values handed to the detector on each trade.
#[derive(Debug, Clone, Copy)]
pub struct BarUpdate {
	pub minute_ts: DateTime<Utc>,
	pub bar: Bar,
	pub pct_change: f64,
	pub vwap: f64,
	pub session: Session,
}

/// Latest quote for a symbol; no history retained (§4.3).
#[derive(Debug, Clone, Copy)]
pub struct Quote {
	pub bid: f64,
	pub ask: f64,
	pub bid_size: Option<f64>,
	pub ask_size: Option<f64>,
	pub ts: DateTime<Utc>,
}

/// Qualitative VWAP direction over a short lookback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VwapBias {
	Bullish,
	Neutral,
	Bearish,
}

/// In-progress Stage-1 setup context, at most one per symbol (§3 Flag).
#[derive(Debug, Clone)]
pub struct Flag {
	pub flag_minute: DateTime<Utc>,
	pub setup_price: f64,
	pub setup_volume: f64,
	pub session: Session,
	pub preliminary_quality: f64,
	pub intraday_high: f64,
	/// Sum of volume over *completed* minutes from `flag_minute` through the
	/// last minute folded in; the in-progress minute's volume is added on top
	/// at evaluation time, not accumulated here.
	pub cum_volume: f64,
	pub cum_trade_count: u64,
	pub folded_through_minute: DateTime<Utc>,
	/// Per-failure-mode counters from the §3 data model; no gate in this
	/// engine consumes them, kept so the struct matches the documented shape.
	pub fail_counters: HashMap<String, u32>,
}

/// The four escalating alert tiers (GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
	Watch,
	Stage1Setup,
	Stage2Confirmed,
	Stage3FastBreak,
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let label = match self {
			Self::Watch => "Watch",
			Self::Stage1Setup => "Stage-1 Setup",
			Self::Stage2Confirmed => "Stage-2 Confirmed Breakout",
			Self::Stage3FastBreak => "Stage-3 Fast-Break",
		};
		write!(f, "{label}")
	}
}

/// Which Stage-2 gate confirmed the breakout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmPath {
	Primary,
	Alt,
}

impl fmt::Display for ConfirmPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Primary => write!(f, "primary"),
			Self::Alt => write!(f, "alt"),
		}
	}
}

/// Structured alert record emitted by the detector (§4.5.4). The sink owns rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
	pub symbol: Symbol,
	pub stage: Stage,
	pub ts: DateTime<Utc>,
	pub session: Session,
	pub price: f64,
	pub pct_change: f64,
	pub rel_vol: f64,
	pub volume: f64,
	pub trade_count: u64,
	pub vwap: f64,
	pub spread_ratio: Option<f64>,
	pub quality_score: f64,
	pub setup_price: Option<f64>,
	pub expansion_pct: Option<f64>,
	pub cumulative_volume_since_flag: Option<f64>,
	pub path: Option<ConfirmPath>,
}

/// Read-only per-symbol stats consumed to adapt thresholds (§4.5.1).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HistoricalStats {
	pub avg_volume_20d: f64,
	pub avg_range_20d: f64,
}
