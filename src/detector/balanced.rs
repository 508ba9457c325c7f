use super::{cooldown_elapsed, is_volume_declining, log_watch_candidate, mark_alert, BarContext, DetectionProfile, SymbolState};
use crate::scoring::{score, ScoreInputs};
use crate::types::{Alert, ConfirmPath, Flag, Stage};

/// The balanced-quality + staged-flag draft (§4.5.2), the primary/default
/// `DetectionProfile`.
#[derive(Debug, Default)]
pub struct BalancedProfile;

impl DetectionProfile for BalancedProfile {
	fn on_bar(&self, ctx: &BarContext<'_>, state: &mut SymbolState) -> Vec<Alert> {
		let mut alerts = Vec::new();

		if let Some(alert) = evaluate_watch(ctx, state) {
			alerts.push(alert);
		}

		if state.flag.is_none() {
			try_open_flag(ctx, state);
		} else if let Some(alert) = evaluate_stage2(ctx, state) {
			alerts.push(alert);
		}

		if let Some(alert) = evaluate_stage3(ctx, state) {
			alerts.push(alert);
		}

		alerts
	}
}

fn base_alert(ctx: &BarContext<'_>, stage: Stage, quality_score: f64) -> Alert {
	Alert {
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
		quality_score,
		setup_price: None,
		expansion_pct: None,
		cumulative_volume_since_flag: None,
		path: None,
	}
}

/// Stage 0 — Watch (§4.5.2 step 3). Observation-only; never opens a flag and
/// never consumes cooldown against higher stages, but still respects the
/// cooldown when forwarding to the sink.
fn evaluate_watch(ctx: &BarContext<'_>, state: &mut SymbolState) -> Option<Alert> {
	let t = &ctx.thresholds;
	let spread_ok = ctx.spread_ratio.is_none_or(|s| s < t.spread_limit * 1.4);

	let passes = ctx.rel_vol >= t.watch_relvol
		&& ctx.pct_change >= t.watch_pct
		&& ctx.trade_count >= 2
		&& spread_ok
		&& !is_volume_declining(ctx.volume, ctx.previous_minute_volume);

	if !passes {
		return None;
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

	let candidate = base_alert(ctx, Stage::Watch, quality);
	log_watch_candidate(state, candidate.clone());

	if quality >= 45.0 && cooldown_elapsed(state, ctx.minute_ts, ctx.detector_config.cooldown_minutes) {
		Some(candidate)
	} else {
		None
	}
}

/// Stage-1 Setup (§4.5.2 step 4).
fn try_open_flag(ctx: &BarContext<'_>, state: &mut SymbolState) {
	let t = &ctx.thresholds;
	let spread_ok = ctx.spread_ratio.is_none_or(|s| s < t.spread_limit);

	let passes = ctx.rel_vol >= t.relvol_s1
		&& ctx.pct_change >= t.pct_early
		&& spread_ok
		&& ctx.trade_count >= 3
		&& !is_volume_declining(ctx.volume, ctx.previous_minute_volume);

	if !passes {
		return;
	}

	let preliminary_quality = score(&ScoreInputs {
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

	if preliminary_quality >= 50.0 {
		state.flag = Some(Flag {
			flag_minute: ctx.minute_ts,
			setup_price: ctx.close,
			setup_volume: ctx.volume,
			session: ctx.session,
			preliminary_quality,
			intraday_high: ctx.high,
			cum_volume: 0.0,
			cum_trade_count: 0,
			folded_through_minute: ctx.minute_ts,
			fail_counters: std::collections::HashMap::new(),
		});
	}
}

struct Stage2Gates {
	expansion_pct: f64,
	cum_volume: f64,
	volume_sustained: bool,
	acceleration: bool,
}

/// Stage-2 Confirmed Breakout (§4.5.2 step 5).
///
/// `cum_volume`/`cum_trade_count` over `[flag_minute..minute_ts]` are folded in
/// exactly once per completed minute boundary (mirroring the rolling-volume
/// shift rule in `bar.rs`), then the in-progress minute's running total is
/// added on top at evaluation time.
fn evaluate_stage2(ctx: &BarContext<'_>, state: &mut SymbolState) -> Option<Alert> {
	let t = ctx.thresholds;

	if let Some(flag) = state.flag.as_mut() {
		if ctx.minute_ts > flag.folded_through_minute {
			flag.cum_volume += ctx.previous_minute_volume.unwrap_or(0.0);
			flag.cum_trade_count += ctx.previous_minute_trade_count.unwrap_or(0);
			flag.folded_through_minute = ctx.minute_ts;
		}
		flag.intraday_high = flag.intraday_high.max(ctx.high);
	}

	let flag = state.flag.clone()?;
	let minutes_since_flag = (ctx.minute_ts - flag.flag_minute).num_seconds() as f64 / 60.0;
	let expansion_pct = (ctx.close - flag.setup_price) / flag.setup_price * 100.0;
	let cum_volume = flag.cum_volume + ctx.volume;
	let cum_trade_count = flag.cum_trade_count + ctx.trade_count;

	// Expiry check first: drop the flag silently once stale beyond half-expansion.
	let expiry_required = if minutes_since_flag < 1.1 { 0.6 } else { (t.pct_confirm - t.pct_early + 1.0).max(0.6) };
	if ctx.detector_config.flag_expiry_minutes > 0.0
		&& minutes_since_flag > ctx.detector_config.flag_expiry_minutes
		&& expansion_pct < expiry_required / 2.0
	{
		state.flag = None;
		return None;
	}

	let gates = Stage2Gates {
		expansion_pct,
		cum_volume,
		volume_sustained: cum_volume >= 1.25 * flag.setup_volume
			|| ctx.volume >= 0.55 * flag.setup_volume
			|| cum_volume >= 0.5 * t.vol_thresh,
		acceleration: ctx.rel_vol >= (t.relvol_s2 - 0.4) || cum_volume / t.vol_thresh >= 0.55,
	};

	let primary_expansion_ok = if minutes_since_flag < 1.1 {
		expansion_pct >= 0.6 || ctx.pct_change >= t.pct_confirm
	} else {
		expansion_pct >= (t.pct_confirm - t.pct_early + 1.0).max(0.6)
	};

	let min_trades_gate = (3_f64 * 1.6).ceil().max(5.0) as u64;
	let trade_gate = cum_trade_count >= min_trades_gate;
	let spread_gate = ctx.spread_ratio.is_none_or(|s| s < t.spread_limit);

	let primary_passes = primary_expansion_ok && gates.volume_sustained && gates.acceleration && trade_gate && spread_gate;

	let alt_passes = !primary_passes
		&& (2.0..=3.0).contains(&minutes_since_flag)
		&& expansion_pct >= 0.4
		&& expansion_pct >= t.pct_early + 1.0
		&& ctx.close >= flag.setup_price * 0.985
		&& ctx.volume >= 0.5 * flag.setup_volume
		&& ctx.previous_minute_volume.is_some_and(|v| v >= 0.5 * flag.setup_volume)
		&& ctx.rel_vol >= t.relvol_s1 + 0.3
		&& spread_gate;

	if !primary_passes && !alt_passes {
		return None;
	}

	let path = if primary_passes { ConfirmPath::Primary } else { ConfirmPath::Alt };

	let quality = score(&ScoreInputs {
		rel_vol: ctx.rel_vol,
		pct_change: ctx.pct_change,
		volume: ctx.volume,
		vol_thresh: t.vol_thresh,
		trade_count: ctx.trade_count,
		min_trades: 3,
		spread_ratio: ctx.spread_ratio,
		spread_limit: t.spread_limit,
		price_expansion_pct: gates.expansion_pct,
		acceleration: gates.acceleration,
		volume_sustained: gates.volume_sustained,
	});

	let quality_gate = if path == ConfirmPath::Primary { 60.0 } else { 58.0 };
	if quality < quality_gate {
		// Flag remains for re-evaluation on a later bar, until expiry.
		return None;
	}

	let mut alert = base_alert(ctx, Stage::Stage2Confirmed, quality);
	alert.setup_price = Some(flag.setup_price);
	alert.expansion_pct = Some(gates.expansion_pct);
	alert.cumulative_volume_since_flag = Some(gates.cum_volume);
	alert.path = Some(path);

	state.flag = None;
	mark_alert(state, ctx.minute_ts, Stage::Stage2Confirmed);

	Some(alert)
}

/// Stage-3 Fast-Break (§4.5.2 step 6): independent of flag state, bypasses
/// the Stage-2 cooldown but still updates the cooldown tracker.
fn evaluate_stage3(ctx: &BarContext<'_>, state: &mut SymbolState) -> Option<Alert> {
	let t = &ctx.thresholds;
	let spread_ok = ctx.spread_ratio.is_none_or(|s| s < t.spread_limit * 1.6);

	let passes =
		ctx.rolling_avg_prev3 > 0.0 && ctx.volume >= 6.0 * ctx.rolling_avg_prev3 && ctx.pct_change >= 9.0 && spread_ok;

	if !passes {
		return None;
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
		acceleration: true,
		volume_sustained: true,
	});

	mark_alert(state, ctx.minute_ts, Stage::Stage3FastBreak);
	Some(base_alert(ctx, Stage::Stage3FastBreak, quality))
}
