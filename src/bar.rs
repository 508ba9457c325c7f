use crate::clock::Clock;
use crate::types::{Bar, BarUpdate, Session};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

/// Fixed-length-3 ordered sequence of the previous three *completed* minute
/// volumes (§3 RollingVolume). Shifts exactly once per minute boundary.
#[derive(Debug, Clone, Default)]
pub struct RollingVolume {
	window: VecDeque<f64>,
}

impl RollingVolume {
	const CAPACITY: usize = 3;

	fn push_completed(&mut self, volume: f64) {
		if self.window.len() == Self::CAPACITY {
			self.window.pop_front();
		}
		self.window.push_back(volume);
	}

	#[must_use]
	pub fn average(&self) -> f64 {
		if self.window.is_empty() {
			0.0
		} else {
			self.window.iter().sum::<f64>() / self.window.len() as f64
		}
	}

	#[must_use]
	pub fn is_full(&self) -> bool {
		self.window.len() == Self::CAPACITY
	}

	#[must_use]
	pub fn values(&self) -> Vec<f64> {
		self.window.iter().copied().collect()
	}
}

/// Retained close/VWAP history per symbol, used for `vwap_bias` lookbacks (§4.2).
#[derive(Debug, Clone, Default)]
struct PriceHistory {
	closes: VecDeque<f64>,
	vwaps: VecDeque<f64>,
}

impl PriceHistory {
	const RETENTION: usize = 5;

	fn push(&mut self, close: f64, vwap: f64) {
		if self.closes.len() == Self::RETENTION {
			self.closes.pop_front();
			self.vwaps.pop_front();
		}
		self.closes.push_back(close);
		self.vwaps.push_back(vwap);
	}

	fn recent(&self, n: usize) -> (Vec<f64>, Vec<f64>) {
		let take = n.min(self.closes.len());
		let closes = self.closes.iter().rev().take(take).rev().copied().collect();
		let vwaps = self.vwaps.iter().rev().take(take).rev().copied().collect();
		(closes, vwaps)
	}
}

/// Per-symbol aggregation state: current bar, rolling volume window, and
/// retained close/VWAP history.
#[derive(Debug, Clone, Default)]
pub struct SymbolAggregate {
	current_minute: Option<DateTime<Utc>>,
	current_bar: Option<Bar>,
	last_completed_bar: Option<Bar>,
	rolling_volume: RollingVolume,
	history: PriceHistory,
	/// Raw (pre-truncation) timestamp of the last trade folded in; used to
	/// detect and skip out-of-order ticks (§7).
	last_seen_ts: Option<DateTime<Utc>>,
}

impl SymbolAggregate {
	#[must_use]
	pub fn rolling_volume(&self) -> &RollingVolume {
		&self.rolling_volume
	}

	/// Returns the last `n` closes and VWAPs, oldest first, for `n` up to the
	/// 5-minute retention window.
	#[must_use]
	pub fn recent(&self, n: usize) -> (Vec<f64>, Vec<f64>) {
		self.history.recent(n)
	}

	/// The most recently *completed* minute bar for this symbol, if any.
	#[must_use]
	pub fn last_completed_bar(&self) -> Option<Bar> {
		self.last_completed_bar
	}
}

/// Folds trade events into per-(minute, symbol) bars (C2, §4.2).
pub struct BarAggregator<'a> {
	clock: &'a dyn Clock,
}

impl<'a> BarAggregator<'a> {
	#[must_use]
	pub fn new(clock: &'a dyn Clock) -> Self {
		Self { clock }
	}

	/// `OnTrade`: folds one trade into the symbol's current bar, shifting the
	/// rolling-volume window exactly once when the minute boundary advances.
	/// Returns `None` without mutating `state` when `ts` is older than the
	/// last trade seen for this symbol (§7: out-of-order events are skipped).
	pub fn on_trade(&self, state: &mut SymbolAggregate, price: f64, size: f64, ts: DateTime<Utc>) -> Option<BarUpdate> {
		if state.last_seen_ts.is_some_and(|last| ts < last) {
			debug!(?ts, last_seen = ?state.last_seen_ts, "skipping out-of-order trade");
			return None;
		}
		state.last_seen_ts = Some(ts);

		let (minute_ts, session) = self.clock.classify(ts);

		if state.current_minute != Some(minute_ts) {
			if let (Some(prev_minute), Some(prev_bar)) = (state.current_minute, state.current_bar) {
				if minute_ts > prev_minute {
					state.rolling_volume.push_completed(prev_bar.volume);
					state.history.push(prev_bar.close, prev_bar.vwap());
					state.last_completed_bar = Some(prev_bar);
				}
			}
			state.current_minute = Some(minute_ts);
			state.current_bar = Some(Bar::first(price, size));
		} else if let Some(bar) = state.current_bar.as_mut() {
			bar.push(price, size);
		}

		let bar = state.current_bar.unwrap_or_else(|| Bar::first(price, size));
		Some(BarUpdate { minute_ts, bar, pct_change: bar.pct_change(), vwap: bar.vwap(), session })
	}
}

#[must_use]
pub fn rel_vol(current_minute_volume: f64, rolling: &RollingVolume) -> f64 {
	current_minute_volume / rolling.average().max(1.0)
}
