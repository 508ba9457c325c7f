use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub watchlist: WatchlistConfig,
	#[serde(default)]
	pub historical_stats: HistoricalStatsConfig,
	pub clock: ClockConfig,
	pub session: SessionConfig,
	pub detector: DetectorConfig,
	pub ingest: IngestConfig,
	#[serde(default)]
	pub session_monitor: SessionMonitorConfig,
	pub sink: SinkConfig,
	#[serde(default)]
	pub snapshot: SnapshotConfig,
}

/// A4 Ingest worker (SPEC_FULL §2): WebSocket transport endpoint and
/// reconnect backoff.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
	pub url: String,
	#[serde(default = "default_reconnect_base_delay_secs")]
	pub reconnect_base_delay_secs: u64,
	#[serde(default = "default_reconnect_max_delay_secs")]
	pub reconnect_max_delay_secs: u64,
}

fn default_reconnect_base_delay_secs() -> u64 {
	1
}

fn default_reconnect_max_delay_secs() -> u64 {
	60
}

/// A5 Session-monitor worker (SPEC_FULL §5): polling cadence for the
/// trading-hours gate and session-end snapshot trigger.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SessionMonitorConfig {
	#[serde(default = "default_session_monitor_poll_secs")]
	pub poll_interval_secs: u64,
}

impl Default for SessionMonitorConfig {
	fn default() -> Self {
		Self { poll_interval_secs: default_session_monitor_poll_secs() }
	}
}

fn default_session_monitor_poll_secs() -> u64 {
	60
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchlistConfig {
	pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoricalStatsConfig {
	pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
	#[serde(default)]
	pub force_fixed_offset: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
	pub premarket: SessionThresholds,
	pub regular: SessionThresholds,
	pub postmarket: SessionThresholds,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SessionThresholds {
	pub vol_base: f64,
	pub spread_limit: f64,
	pub pct_early: f64,
	pub pct_confirm: f64,
	pub relvol_s1: f64,
	pub relvol_s2: f64,
	pub watch_relvol: f64,
	pub watch_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
	/// `"balanced"` (default), `"persistence"`, or `"likelihood"` (§4.5).
	#[serde(default = "default_profile")]
	pub profile: String,
	#[serde(default = "default_cooldown_mins")]
	pub cooldown_minutes: i64,
	#[serde(default = "default_flag_expiry_mins")]
	pub flag_expiry_minutes: f64,
	#[serde(default)]
	pub backtest_mode: bool,
}

fn default_profile() -> String {
	"balanced".to_string()
}

fn default_cooldown_mins() -> i64 {
	5
}

fn default_flag_expiry_mins() -> f64 {
	4.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
	#[serde(default)]
	pub disable_notifications: bool,
	#[serde(default = "default_alert_queue_capacity")]
	pub alert_queue_capacity: usize,
	pub telegram: TelegramConfig,
}

fn default_alert_queue_capacity() -> usize {
	256
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
	pub bot_token: String,
	pub chat_id: String,
	pub topic_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotConfig {
	pub path: Option<String>,
	#[serde(default)]
	pub enabled: bool,
}

impl Config {
	pub fn load(path: &str) -> Result<Self> {
		let content = fs::read_to_string(path).with_context(|| format!("Failed to read config file: {path}"))?;

		let mut config: Self = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
		config.apply_env_overrides();
		config.validate()?;

		Ok(config)
	}

	/// Applies the environment-variable overrides enumerated in §6.
	fn apply_env_overrides(&mut self) {
		if std::env::var("DISABLE_NOTIFICATIONS").is_ok() {
			self.sink.disable_notifications = true;
		}
		if std::env::var("BACKTEST_MODE").is_ok() {
			self.detector.backtest_mode = true;
		}
		if let Ok(path) = std::env::var("TICKER_FILE") {
			self.watchlist.path = path;
		}
	}

	fn validate(&self) -> Result<()> {
		if !self.sink.disable_notifications {
			if self.sink.telegram.bot_token.is_empty() || self.sink.telegram.bot_token == "YOUR_BOT_TOKEN_HERE" {
				anyhow::bail!("Please set a valid Telegram bot token in config.toml");
			}

			if self.sink.telegram.chat_id.is_empty() || self.sink.telegram.chat_id == "YOUR_CHAT_ID_HERE" {
				anyhow::bail!("Please set a valid Telegram chat ID in config.toml");
			}
		}

		for (name, thresholds) in [
			("premarket", &self.session.premarket),
			("regular", &self.session.regular),
			("postmarket", &self.session.postmarket),
		] {
			if thresholds.vol_base <= 0.0 {
				anyhow::bail!("session.{name}.vol_base must be positive");
			}
			if thresholds.pct_confirm <= thresholds.pct_early {
				anyhow::bail!("session.{name}.pct_confirm must be greater than pct_early");
			}
			if thresholds.relvol_s2 <= thresholds.relvol_s1 {
				anyhow::bail!("session.{name}.relvol_s2 must be greater than relvol_s1");
			}
		}

		if !matches!(self.detector.profile.as_str(), "balanced" | "persistence" | "likelihood") {
			anyhow::bail!("detector.profile must be one of balanced, persistence, likelihood");
		}

		if self.detector.cooldown_minutes <= 0 {
			anyhow::bail!("detector.cooldown_minutes must be positive");
		}

		if self.snapshot.enabled && self.snapshot.path.is_none() {
			anyhow::bail!("snapshot.enabled requires snapshot.path");
		}

		if self.ingest.url.is_empty() {
			anyhow::bail!("ingest.url must be set");
		}

		if self.sink.alert_queue_capacity == 0 {
			anyhow::bail!("sink.alert_queue_capacity must be positive");
		}

		Ok(())
	}
}
