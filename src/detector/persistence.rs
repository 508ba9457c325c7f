use super::{cooldown_elapsed, mark_alert, vwap_bias, BarContext, DetectionProfile, SymbolState};
use crate::scoring::{score, ScoreInputs};
use crate::types::{Alert, Stage, VwapBias};

/// Multi-bar persistence fallback (§4.5.2 step 7): replaces Stage-1/Stage-2
/// with a per-symbol counter that increments on qualifying bars and decays
/// (floored at zero) otherwise.
#[derive(Debug, Default)]
pub struct PersistenceProfile;

/// Adaptive minimum persistence count by liquidity tier.
fn min_persistence(liquidity: f64) -> u32 {
	if liquidity < 0.3 {
		3
	} else if liquidity < 0.7 {
		2
	} else {
		1
	}
}

impl DetectionProfile for PersistenceProfile {
	fn on_bar(&self, ctx: &BarContext<'_>, state: &mut SymbolState) -> Vec<Alert> {
		let t = &ctx.thresholds;
		let dynamic_pct_early = if ctx.detector_config.backtest_mode { t.pct_early * 0.65 } else { t.pct_early };

		let meets_bar_criteria = ctx.rel_vol >= 2.0 && ctx.pct_change >= dynamic_pct_early;
		if meets_bar_criteria {
			state.momentum_counter += 1;
		} else {
			state.momentum_counter = state.momentum_counter.saturating_sub(1);
		}

		let required_persistence =
			if ctx.detector_config.backtest_mode { 1 } else { min_persistence(t.liquidity) };
		if state.momentum_counter < required_persistence {
			return Vec::new();
		}

		let bias_2 = vwap_bias_for(ctx, 2);
		let bias_3 = vwap_bias_for(ctx, 3);
		if bias_2 == VwapBias::Bearish && bias_3 == VwapBias::Bearish {
			return Vec::new();
		}

		if ctx.volume < t.vol_thresh {
			return Vec::new();
		}

		let spread_ok = ctx.spread_ratio.is_none_or(|s| s < t.spread_limit);
		if !spread_ok {
			return Vec::new();
		}

		let quality = score(&ScoreInputs {
			rel_vol: ctx.rel_vol,
			pct_change: ctx.pct_change,
			volume: ctx.volume,
			vol_thresh: t.vol_thresh,
			trade_count: ctx.trade_count,
			min_trades: 3,
			spread_ratio: ctx.spread_ratio,
			spread_limit: t.spread_limit,
			price_expansion_pct: 0.0,
			acceleration: false,
			volume_sustained: false,
		});

		let stage = if state.momentum_counter >= 3 && quality >= 65.0 {
			Stage::Stage2Confirmed
		} else if quality >= 50.0 {
			Stage::Stage1Setup
		} else {
			return Vec::new();
		};

		if !cooldown_elapsed(state, ctx.minute_ts, ctx.detector_config.cooldown_minutes) {
			return Vec::new();
		}

		mark_alert(state, ctx.minute_ts, stage);

		vec![Alert {
			symbol: ctx.symbol.clone(),
			stage,
			ts: ctx.minute_ts,
			session: ctx.session,
			price: ctx.close,
			pct_change: ctx.pct_change,
			rel_vol: ctx.rel_vol,
			volume: ctx.volume,
			trade_count: ctx.trade_count,
			vwap: ctx.vwap,
			spread_ratio: ctx.spread_ratio,
			quality_score: quality,
			setup_price: None,
			expansion_pct: None,
			cumulative_volume_since_flag: None,
			path: None,
		}]
	}
}

fn vwap_bias_for(ctx: &BarContext<'_>, lookback: usize) -> VwapBias {
	let take = lookback.min(ctx.recent_closes.len());
	if take == 0 {
		return VwapBias::Neutral;
	}
	let closes = &ctx.recent_closes[ctx.recent_closes.len() - take..];
	let vwaps = &ctx.recent_vwaps[ctx.recent_vwaps.len() - take..];
	vwap_bias(closes, vwaps)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::DetectorConfig;
	use crate::detector::thresholds::EffectiveThresholds;
	use crate::types::{Session, Symbol};
	use chrono::{TimeZone, Utc};

	fn cfg(backtest_mode: bool) -> DetectorConfig {
		DetectorConfig { profile: "persistence".to_string(), cooldown_minutes: 5, flag_expiry_minutes: 4.0, backtest_mode }
	}

	fn thresholds(liquidity: f64) -> EffectiveThresholds {
		EffectiveThresholds {
			vol_thresh: 50_000.0,
			spread_limit: 0.02,
			pct_early: 4.0,
			pct_confirm: 7.8,
			relvol_s1: 2.5,
			relvol_s2: 4.3,
			watch_relvol: 2.0,
			watch_pct: 3.0,
			liquidity,
		}
	}

	fn minute(m: u32) -> chrono::DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 6, 10, 10, m, 0).single().expect("valid datetime")
	}

	fn bar_ctx<'a>(symbol: &'a Symbol, minute_ts: chrono::DateTime<Utc>, thresholds: EffectiveThresholds, detector_config: &'a DetectorConfig) -> BarContext<'a> {
		BarContext {
			symbol,
			minute_ts,
			session: Session::Regular,
			open: 10.0,
			close: 10.5,
			high: 10.5,
			low: 10.0,
			volume: 80_000.0,
			pct_change: 5.0,
			vwap: 10.2,
			trade_count: 120,
			rel_vol: 3.0,
			rolling_avg_prev3: 20_000.0,
			previous_minute_volume: Some(20_000.0),
			previous_minute_trade_count: Some(100),
			recent_closes: vec![10.1, 10.3, 10.5],
			recent_vwaps: vec![10.0, 10.1, 10.2],
			spread_ratio: Some(0.01),
			thresholds,
			detector_config,
		}
	}

	#[test]
	fn counter_requires_adaptive_persistence_before_alerting() {
		let sym = Symbol::new("TEST");
		let config = cfg(false);
		let mut state = SymbolState::default();
		// illiquid tier requires persistence 3.
		let ctx = bar_ctx(&sym, minute(0), thresholds(0.1), &config);

		let first = PersistenceProfile.on_bar(&ctx, &mut state);
		assert!(first.is_empty());
		assert_eq!(state.momentum_counter, 1);
	}

	#[test]
	fn counter_decays_floored_at_zero_on_non_qualifying_bar() {
		let sym = Symbol::new("TEST");
		let config = cfg(false);
		let mut state = SymbolState { momentum_counter: 0, ..Default::default() };
		let mut ctx = bar_ctx(&sym, minute(0), thresholds(0.5), &config);
		ctx.rel_vol = 0.5;
		ctx.pct_change = 0.1;

		PersistenceProfile.on_bar(&ctx, &mut state);
		assert_eq!(state.momentum_counter, 0);
	}

	#[test]
	fn backtest_mode_relaxes_persistence_and_pct_early() {
		let sym = Symbol::new("TEST");
		let config = cfg(true);
		let mut state = SymbolState::default();
		let mut ctx = bar_ctx(&sym, minute(0), thresholds(0.1), &config);
		ctx.pct_change = 3.0; // below base pct_early(4.0) but above 0.65x in backtest mode

		let alerts = PersistenceProfile.on_bar(&ctx, &mut state);
		assert_eq!(state.momentum_counter, 1);
		assert!(!alerts.is_empty());
	}
}
