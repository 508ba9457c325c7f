use super::{cooldown_elapsed, mark_alert, vwap_bias, BarContext, DetectionProfile, SymbolState};
use crate::scoring::{score, ScoreInputs};
use crate::types::{Alert, Stage, VwapBias};
use chrono::{DateTime, Utc};

/// In-flight early-momentum candidate tracked between bars (§4.5.3).
#[derive(Debug, Clone)]
pub struct Candidate {
	pub opened_at: DateTime<Utc>,
	pub opened_price: f64,
	pub bars_since_open: u32,
	pub stage1_fired: bool,
}

/// Probabilistic "EARLY MOMENTUM" variant: scores each bar with a weighted
/// likelihood instead of the balanced profile's discrete gates (§4.5.3).
#[derive(Debug, Default)]
pub struct LikelihoodProfile;

/// Weighted likelihood in `[0,1]` per the §4.5.3 formula.
fn likelihood(ctx: &BarContext<'_>) -> f64 {
	let t = &ctx.thresholds;
	let rel_vol_component = 0.40 * (ctx.rel_vol / 3.0).min(1.0);
	let pct_component = 0.30 * (ctx.pct_change / t.pct_early.max(0.01)).min(1.0);
	let vwap_component = match vwap_bias(&ctx.recent_closes, &ctx.recent_vwaps) {
		VwapBias::Bullish => 1.0,
		VwapBias::Neutral => 0.5,
		VwapBias::Bearish => 0.0,
	};
	let spread_component = ctx.spread_ratio.map_or(0.5, |s| (1.0 - (s / t.spread_limit).min(1.0)).max(0.0));
	let liquidity_component = t.liquidity;

	rel_vol_component + pct_component + 0.15 * vwap_component + 0.10 * spread_component + 0.05 * liquidity_component
}

impl DetectionProfile for LikelihoodProfile {
	fn on_bar(&self, ctx: &BarContext<'_>, state: &mut SymbolState) -> Vec<Alert> {
		let current_likelihood = likelihood(ctx);

		if let Some(candidate) = state.likelihood_candidate.as_mut() {
			candidate.bars_since_open += 1;
			let elapsed_minutes = (ctx.minute_ts - candidate.opened_at).num_seconds() as f64 / 60.0;
			let follow_through_pct = (ctx.close - candidate.opened_price) / candidate.opened_price * 100.0;

			if follow_through_pct < -1.0 || current_likelihood < 0.4 || elapsed_minutes >= 5.0 {
				state.likelihood_candidate = None;
				return Vec::new();
			}

			if candidate.stage1_fired && candidate.bars_since_open >= 2 && follow_through_pct >= 2.0 {
				let volume_sustained = ctx.volume >= ctx.rolling_avg_prev3 * 1.5;
				let above_vwap = ctx.close > ctx.vwap;

				let quality = score(&ScoreInputs {
					rel_vol: ctx.rel_vol,
					pct_change: ctx.pct_change,
					volume: ctx.volume,
					vol_thresh: ctx.thresholds.vol_thresh,
					trade_count: ctx.trade_count,
					min_trades: 3,
					spread_ratio: ctx.spread_ratio,
					spread_limit: ctx.thresholds.spread_limit,
					price_expansion_pct: follow_through_pct,
					acceleration: false,
					volume_sustained,
				});

				if volume_sustained && above_vwap && quality >= 50.0 {
					if !cooldown_elapsed(state, ctx.minute_ts, ctx.detector_config.cooldown_minutes) {
						return Vec::new();
					}
					mark_alert(state, ctx.minute_ts, Stage::Stage2Confirmed);
					state.likelihood_candidate = None;

					return vec![Alert {
						symbol: ctx.symbol.clone(),
						stage: Stage::Stage2Confirmed,
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
						setup_price: Some(candidate.opened_price),
						expansion_pct: Some(follow_through_pct),
						cumulative_volume_since_flag: None,
						path: None,
					}];
				}
			}
			return Vec::new();
		}

		let rising = current_likelihood > state.momentum_counter as f64 / 100.0;
		if current_likelihood >= 0.75 && rising {
			if !cooldown_elapsed(state, ctx.minute_ts, ctx.detector_config.cooldown_minutes) {
				return Vec::new();
			}

			state.likelihood_candidate =
				Some(Candidate { opened_at: ctx.minute_ts, opened_price: ctx.close, bars_since_open: 0, stage1_fired: true });
			mark_alert(state, ctx.minute_ts, Stage::Stage1Setup);

			return vec![Alert {
				symbol: ctx.symbol.clone(),
				stage: Stage::Stage1Setup,
				ts: ctx.minute_ts,
				session: ctx.session,
				price: ctx.close,
				pct_change: ctx.pct_change,
				rel_vol: ctx.rel_vol,
				volume: ctx.volume,
				trade_count: ctx.trade_count,
				vwap: ctx.vwap,
				spread_ratio: ctx.spread_ratio,
				quality_score: current_likelihood * 100.0,
				setup_price: None,
				expansion_pct: None,
				cumulative_volume_since_flag: None,
				path: None,
			}];
		}

		// remember the last likelihood (scaled to a percentage) so the next bar can detect "rising".
		state.momentum_counter = (current_likelihood * 100.0) as u32;
		Vec::new()
	}
}
