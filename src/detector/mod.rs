//! The staged detector (C5, §4.5): three configuration-selected profiles
//! sharing C1–C4 and the cooldown/alert plumbing defined here.

pub mod balanced;
pub mod likelihood;
pub mod persistence;
pub mod thresholds;

use crate::config::DetectorConfig;
use crate::types::{Alert, Flag, Session, Stage, Symbol, VwapBias};
use chrono::{DateTime, Utc};

/// Per-symbol state shared across all three detector profiles. Only the
/// fields a given profile touches are non-default for that profile; the
/// others simply stay at rest.
#[derive(Debug, Clone, Default)]
pub struct SymbolState {
	/// Balanced-quality profile: at most one in-progress Stage-1 setup.
	pub flag: Option<Flag>,
	/// Persistence profile: floor-at-zero momentum counter.
	pub momentum_counter: u32,
	/// Persistence profile: last persistence-based stage emitted, for cooldown upgrade tracking.
	pub persistence_last_stage: Option<Stage>,
	/// Likelihood profile: in-flight early-momentum candidate.
	pub likelihood_candidate: Option<likelihood::Candidate>,
	/// Shared 5-minute cooldown tracker (§3 AlertTracker).
	pub last_alert_ts: Option<DateTime<Utc>>,
	/// Highest stage alerted on within the current cooldown window, so Stage-2
	/// can upgrade a Stage-1 alert instead of being suppressed by it.
	pub last_alert_stage: Option<Stage>,
	/// Every Watch-stage candidate that passed the Stage-0 gate, independent
	/// of whether it also cleared the quality/cooldown bar to reach the sink
	/// (§4.5.2 step 3: "append to an in-memory watch list... and optionally
	/// forward to sink"). Retained for backtest/expectation-generation
	/// consumption; capped so a long replay day can't grow it unbounded.
	pub watch_log: Vec<Alert>,
}

/// `watch_log` retention cap per symbol per session.
const WATCH_LOG_CAPACITY: usize = 500;

impl SymbolState {
	/// Resets all per-symbol state, e.g. at session start or replay-day boundary.
	pub fn reset(&mut self) {
		*self = Self::default();
	}
}

/// Everything one bar evaluation needs, assembled by the engine from C1–C3.
pub struct BarContext<'a> {
	pub symbol: &'a Symbol,
	pub minute_ts: DateTime<Utc>,
	pub session: Session,
	pub open: f64,
	pub close: f64,
	pub high: f64,
	pub low: f64,
	pub volume: f64,
	pub pct_change: f64,
	pub vwap: f64,
	pub trade_count: u64,
	pub rel_vol: f64,
	pub rolling_avg_prev3: f64,
	pub previous_minute_volume: Option<f64>,
	pub previous_minute_trade_count: Option<u64>,
	pub recent_closes: Vec<f64>,
	pub recent_vwaps: Vec<f64>,
	pub spread_ratio: Option<f64>,
	pub thresholds: thresholds::EffectiveThresholds,
	pub detector_config: &'a DetectorConfig,
}

/// The `{OnTrade, OnQuote, Reset}` capability from §9 Design Notes, specialized
/// to `OnTrade` here (`OnQuote` only ever updates the quote book, handled by
/// the engine directly; `Reset` is `SymbolState::reset`).
pub trait DetectionProfile: Send + Sync {
	fn on_bar(&self, ctx: &BarContext<'_>, state: &mut SymbolState) -> Vec<Alert>;
}

#[must_use]
pub fn build_profile(name: &str) -> Box<dyn DetectionProfile> {
	match name {
		"persistence" => Box::new(persistence::PersistenceProfile),
		"likelihood" => Box::new(likelihood::LikelihoodProfile),
		_ => Box::new(balanced::BalancedProfile),
	}
}

/// True once `cooldown_minutes` have elapsed since the last alert, or if no
/// alert has ever been emitted for this symbol (§5 Cooldown & cancellation).
#[must_use]
pub fn cooldown_elapsed(state: &SymbolState, now: DateTime<Utc>, cooldown_minutes: i64) -> bool {
	state.last_alert_ts.is_none_or(|last| now.signed_duration_since(last).num_minutes() >= cooldown_minutes)
}

/// Records that an alert was just emitted at `stage`, resetting the cooldown
/// clock (a Stage-2 upgrade of a Stage-1 alert within cooldown also resets it).
pub fn mark_alert(state: &mut SymbolState, now: DateTime<Utc>, stage: Stage) {
	state.last_alert_ts = Some(now);
	state.last_alert_stage = Some(stage);
}

/// Appends a Watch-stage candidate to the backtest-consumable log regardless
/// of whether it also cleared the sink-forward gate, dropping the oldest
/// entry once `WATCH_LOG_CAPACITY` is reached.
pub fn log_watch_candidate(state: &mut SymbolState, candidate: Alert) {
	if state.watch_log.len() >= WATCH_LOG_CAPACITY {
		state.watch_log.remove(0);
	}
	state.watch_log.push(candidate);
}

/// Volume is "declining" when the current minute's volume is below 40% of the
/// previous minute's (used by Watch/Stage-1 gates, §4.5.2). Unknown previous
/// volume never counts as declining.
#[must_use]
pub fn is_volume_declining(current: f64, previous: Option<f64>) -> bool {
	previous.is_some_and(|prev| prev > 0.0 && current < prev * 0.40)
}

/// Qualitative VWAP direction over the last `n` bars (GLOSSARY `VWAP bias`):
/// bullish when every close is above its VWAP, bearish when every close is
/// below, neutral otherwise.
#[must_use]
pub fn vwap_bias(closes: &[f64], vwaps: &[f64]) -> VwapBias {
	if closes.is_empty() || closes.len() != vwaps.len() {
		return VwapBias::Neutral;
	}
	if closes.iter().zip(vwaps).all(|(c, v)| c > v) {
		VwapBias::Bullish
	} else if closes.iter().zip(vwaps).all(|(c, v)| c < v) {
		VwapBias::Bearish
	} else {
		VwapBias::Neutral
	}
}
