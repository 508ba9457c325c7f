use crate::bar::{rel_vol, BarAggregator, SymbolAggregate};
use crate::clock::Clock;
use crate::config::Config;
use crate::detector::thresholds::{apply_range_adjustment, effective_thresholds, LIQUIDITY_GATE};
use crate::detector::{BarContext, DetectionProfile, SymbolState};
use crate::quote::QuoteBook;
use crate::sink::NotificationSink;
use crate::types::{Alert, HistoricalStats, QuoteEvent, Session, Symbol, TradeEvent};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Everything the data lock protects (§5): bar aggregates, rolling volumes,
/// flags, momentum counters, alert tracker, price history.
#[derive(Default)]
struct EngineState {
	aggregates: HashMap<Symbol, SymbolAggregate>,
	detector_states: HashMap<Symbol, SymbolState>,
}

/// The detection engine: owns the two independent locks from §5 and the
/// per-symbol profile/threshold wiring. `on_trade`/`on_quote` are the only
/// entrypoints, used identically by the live ingest worker and the replay
/// driver.
pub struct Engine {
	clock: Box<dyn Clock>,
	profile: Box<dyn DetectionProfile>,
	sink: Box<dyn NotificationSink>,
	config: Config,
	watchlist: HashSet<Symbol>,
	historical: HashMap<Symbol, HistoricalStats>,
	// Data lock (§5.1): bar aggregates, rolling volumes, flags, momentum
	// counters, alert tracker, price history.
	data: RwLock<EngineState>,
	// Quote lock (§5.2): the quote book only, independent of the data lock.
	quotes: RwLock<QuoteBook>,
}

impl Engine {
	#[must_use]
	pub fn new(
		config: Config,
		clock: Box<dyn Clock>,
		sink: Box<dyn NotificationSink>,
		watchlist: HashSet<Symbol>,
		historical: HashMap<Symbol, HistoricalStats>,
	) -> Self {
		let profile = crate::detector::build_profile(&config.detector.profile);
		Self {
			clock,
			profile,
			sink,
			config,
			watchlist,
			historical,
			data: RwLock::new(EngineState::default()),
			quotes: RwLock::new(QuoteBook::new()),
		}
	}

	/// `OnQuote` (§4.3, §5): updates the quote book only, under the quote lock.
	pub async fn on_quote(&self, event: QuoteEvent) {
		if !self.watchlist.is_empty() && !self.watchlist.contains(&event.symbol) {
			return;
		}
		let Some(ts) = event.ts.to_utc() else {
			warn!(symbol = %event.symbol, "quote event has an out-of-range timestamp, skipping");
			return;
		};

		let mut quotes = self.quotes.write().await;
		quotes.on_quote(&event, ts);
	}

	/// `OnTrade` (§4.2–§4.5, §5): folds the trade into the bar, evaluates the
	/// configured detector profile, and fires any resulting alerts to the sink.
	/// Callers must serialize calls for a given symbol (§5 ordering guarantee).
	pub async fn on_trade(&self, event: TradeEvent) {
		if !self.watchlist.is_empty() && !self.watchlist.contains(&event.symbol) {
			return;
		}
		let Some(ts) = event.ts.to_utc() else {
			warn!(symbol = %event.symbol, "trade event has an out-of-range timestamp, skipping");
			return;
		};
		if event.price <= 0.0 || event.size <= 0.0 {
			debug!(symbol = %event.symbol, "skipping malformed trade event");
			return;
		}

		let (minute_ts, session) = self.clock.classify(ts);
		if session == Session::Closed {
			return;
		}

		let historical = self.historical.get(&event.symbol);
		let Some(base_thresholds) = effective_thresholds(&self.config.session, session, historical) else {
			return;
		};
		if base_thresholds.liquidity < LIQUIDITY_GATE {
			return;
		}

		let spread_ratio = {
			let quotes = self.quotes.read().await;
			quotes.spread_ratio(&event.symbol, event.price)
		};

		let alerts = {
			let mut data = self.data.write().await;
			self.evaluate_locked(&mut data, &event.symbol, event.price, event.size, ts, minute_ts, session, base_thresholds, spread_ratio)
		};

		for alert in alerts {
			self.sink.send(&alert).await;
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn evaluate_locked(
		&self,
		data: &mut EngineState,
		symbol: &Symbol,
		price: f64,
		size: f64,
		ts: DateTime<Utc>,
		minute_ts: DateTime<Utc>,
		session: Session,
		base_thresholds: crate::detector::thresholds::EffectiveThresholds,
		spread_ratio: Option<f64>,
	) -> Vec<Alert> {
		let aggregate = data.aggregates.entry(symbol.clone()).or_default();
		let aggregator = BarAggregator::new(self.clock.as_ref());
		let Some(update) = aggregator.on_trade(aggregate, price, size, ts) else {
			return Vec::new();
		};

		let thresholds = apply_range_adjustment(base_thresholds, self.historical.get(symbol), update.bar.open);
		let rolling_avg_prev3 = aggregate.rolling_volume().average();
		let rv = rel_vol(update.bar.volume, aggregate.rolling_volume());
		let (recent_closes, recent_vwaps) = aggregate.recent(3);
		let last_completed = aggregate.last_completed_bar();

		let ctx = BarContext {
			symbol,
			minute_ts,
			session,
			open: update.bar.open,
			close: update.bar.close,
			high: update.bar.high,
			low: update.bar.low,
			volume: update.bar.volume,
			pct_change: update.pct_change,
			vwap: update.vwap,
			trade_count: update.bar.trade_count,
			rel_vol: rv,
			rolling_avg_prev3,
			previous_minute_volume: last_completed.map(|b| b.volume),
			previous_minute_trade_count: last_completed.map(|b| b.trade_count),
			recent_closes,
			recent_vwaps,
			spread_ratio,
			thresholds,
			detector_config: &self.config.detector,
		};

		let state = data.detector_states.entry(symbol.clone()).or_default();
		self.profile.on_bar(&ctx, state)
	}

	/// Returns every Watch-stage candidate logged for `symbol` so far this
	/// session, regardless of whether it also cleared the sink-forward gate
	/// (§4.5.2 step 3). Used by backtesting/expectation-generation tooling,
	/// not by live ingest.
	pub async fn watch_log(&self, symbol: &Symbol) -> Vec<Alert> {
		let data = self.data.read().await;
		data.detector_states.get(symbol).map(|s| s.watch_log.clone()).unwrap_or_default()
	}

	/// Resets all per-symbol state (session boundary / replay-day boundary, §5).
	pub async fn reset_all(&self) {
		let mut data = self.data.write().await;
		data.aggregates.clear();
		data.detector_states.clear();
	}

	/// Builds a snapshot of the most recently completed bar per symbol (§6).
	pub async fn snapshot(&self) -> crate::snapshot::SnapshotData {
		let data = self.data.read().await;
		let mut by_minute: crate::snapshot::SnapshotData = HashMap::new();
		for (symbol, aggregate) in &data.aggregates {
			if let Some(bar) = aggregate.last_completed_bar() {
				by_minute.entry(Utc::now()).or_default().insert(symbol.clone(), bar);
			}
		}
		by_minute
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::EasternClock;
	use crate::config::{
		ClockConfig, DetectorConfig, HistoricalStatsConfig, IngestConfig, SessionConfig, SessionMonitorConfig,
		SessionThresholds, SinkConfig, SnapshotConfig, TelegramConfig, WatchlistConfig,
	};
	use crate::sink::NullSink;
	use crate::types::RawTimestamp;

	fn thresholds() -> SessionThresholds {
		SessionThresholds {
			vol_base: 90_000.0,
			spread_limit: 0.020,
			pct_early: 4.5,
			pct_confirm: 7.8,
			relvol_s1: 2.5,
			relvol_s2: 4.3,
			watch_relvol: 2.0,
			watch_pct: 3.0,
		}
	}

	fn test_config() -> Config {
		Config {
			watchlist: WatchlistConfig { path: "watchlist.csv".to_string() },
			historical_stats: HistoricalStatsConfig::default(),
			clock: ClockConfig { force_fixed_offset: false },
			session: SessionConfig { premarket: thresholds(), regular: thresholds(), postmarket: thresholds() },
			detector: DetectorConfig {
				profile: "balanced".to_string(),
				cooldown_minutes: 5,
				flag_expiry_minutes: 4.0,
				backtest_mode: false,
			},
			ingest: IngestConfig {
				url: "wss://example.invalid/stream".to_string(),
				reconnect_base_delay_secs: 1,
				reconnect_max_delay_secs: 60,
			},
			session_monitor: SessionMonitorConfig::default(),
			sink: SinkConfig {
				disable_notifications: true,
				alert_queue_capacity: 256,
				telegram: TelegramConfig { bot_token: String::new(), chat_id: String::new(), topic_id: None },
			},
			snapshot: SnapshotConfig::default(),
		}
	}

	fn engine() -> Engine {
		Engine::new(test_config(), Box::new(EasternClock), Box::new(NullSink), HashSet::new(), HashMap::new())
	}

	#[tokio::test]
	async fn closed_session_trade_produces_no_state() {
		let engine = engine();
		let symbol = Symbol::new("AAPL");
		// 2024-01-01 05:00 UTC = 00:00 EST, overnight, CLOSED.
		let ts = RawTimestamp::Secs(1_704_085_200);
		engine.on_trade(TradeEvent { symbol: symbol.clone(), price: 10.0, size: 100.0, ts }).await;

		let data = engine.data.read().await;
		assert!(data.aggregates.is_empty());
	}

	#[tokio::test]
	async fn watchlist_filters_unlisted_symbols() {
		let mut watchlist = HashSet::new();
		watchlist.insert(Symbol::new("AAPL"));
		let engine = Engine::new(test_config(), Box::new(EasternClock), Box::new(NullSink), watchlist, HashMap::new());

		// 2024-06-10 14:00 UTC = 10:00 ET, REGULAR session.
		let ts = RawTimestamp::Secs(1_718_028_000);
		engine.on_trade(TradeEvent { symbol: Symbol::new("MSFT"), price: 10.0, size: 100.0, ts }).await;

		let data = engine.data.read().await;
		assert!(data.aggregates.is_empty());
	}

	#[tokio::test]
	async fn trade_within_session_and_watchlist_creates_aggregate() {
		let mut watchlist = HashSet::new();
		watchlist.insert(Symbol::new("AAPL"));
		let engine = Engine::new(test_config(), Box::new(EasternClock), Box::new(NullSink), watchlist, HashMap::new());

		let ts = RawTimestamp::Secs(1_718_028_000);
		engine.on_trade(TradeEvent { symbol: Symbol::new("AAPL"), price: 10.0, size: 100.0, ts }).await;

		let data = engine.data.read().await;
		assert!(data.aggregates.contains_key(&Symbol::new("AAPL")));
	}

	#[tokio::test]
	async fn reset_all_clears_state() {
		let mut watchlist = HashSet::new();
		watchlist.insert(Symbol::new("AAPL"));
		let engine = Engine::new(test_config(), Box::new(EasternClock), Box::new(NullSink), watchlist, HashMap::new());
		let ts = RawTimestamp::Secs(1_718_028_000);
		engine.on_trade(TradeEvent { symbol: Symbol::new("AAPL"), price: 10.0, size: 100.0, ts }).await;

		engine.reset_all().await;

		let data = engine.data.read().await;
		assert!(data.aggregates.is_empty());
	}
}
