use crate::config::{SessionConfig, SessionThresholds};
use crate::types::{HistoricalStats, Session};

/// Effective, possibly historical-stats-adjusted thresholds for one symbol on
/// one bar (§4.5.1).
#[derive(Debug, Clone, Copy)]
pub struct EffectiveThresholds {
	pub vol_thresh: f64,
	pub spread_limit: f64,
	pub pct_early: f64,
	pub pct_confirm: f64,
	pub relvol_s1: f64,
	pub relvol_s2: f64,
	pub watch_relvol: f64,
	pub watch_pct: f64,
	pub liquidity: f64,
}

fn historical_volume_multiplier(session: Session) -> f64 {
	match session {
		Session::Premarket => 0.015,
		Session::Regular => 0.10,
		Session::Postmarket => 0.02,
		Session::Closed => 0.0,
	}
}

/// Resolves the base table for a session, then applies the historical-stats
/// adjustments and liquidity score described in §4.5.1.
#[must_use]
pub fn effective_thresholds(
	config: &SessionConfig,
	session: Session,
	historical: Option<&HistoricalStats>,
) -> Option<EffectiveThresholds> {
	let base = match session {
		Session::Premarket => config.premarket,
		Session::Regular => config.regular,
		Session::Postmarket => config.postmarket,
		Session::Closed => return None,
	};

	// `pct_early`'s avg_range_20d adjustment needs `open`, not known here; see
	// `apply_range_adjustment`, applied once `open` is available for the bar.
	let (vol_thresh, liquidity) = match historical {
		Some(stats) => {
			let vol_thresh = base.vol_base.max(stats.avg_volume_20d * historical_volume_multiplier(session));
			let liquidity = (stats.avg_volume_20d / 1_000_000.0).min(1.0);
			(vol_thresh, liquidity)
		},
		None => (base.vol_base, 0.5),
	};
	let pct_early = base.pct_early;

	Some(EffectiveThresholds {
		vol_thresh,
		spread_limit: base.spread_limit,
		pct_early,
		pct_confirm: base.pct_confirm,
		relvol_s1: base.relvol_s1,
		relvol_s2: base.relvol_s2,
		watch_relvol: base.watch_relvol,
		watch_pct: base.watch_pct,
		liquidity,
	})
}

/// Applies the `avg_range_20d`/`open` adjustment to `pct_early` once `open` is
/// known for the bar (§4.5.1: `pct_early := max(pct_early, (avg_range/open)*1.2)`).
#[must_use]
pub fn apply_range_adjustment(mut thresholds: EffectiveThresholds, historical: Option<&HistoricalStats>, open: f64) -> EffectiveThresholds {
	if let Some(stats) = historical {
		if stats.avg_range_20d > 0.0 && open > 0.0 {
			thresholds.pct_early = thresholds.pct_early.max((stats.avg_range_20d / open) * 1.2);
		}
	}
	thresholds
}

/// Symbols below this liquidity score are silently skipped (§4.5.1).
pub const LIQUIDITY_GATE: f64 = 0.10;

#[cfg(test)]
mod tests {
	use super::*;

	fn session_config() -> SessionConfig {
		SessionConfig {
			premarket: SessionThresholds {
				vol_base: 30_000.0,
				spread_limit: 0.030,
				pct_early: 3.8,
				pct_confirm: 7.8,
				relvol_s1: 2.4,
				relvol_s2: 4.1,
				watch_relvol: 1.8,
				watch_pct: 2.5,
			},
			regular: SessionThresholds {
				vol_base: 90_000.0,
				spread_limit: 0.020,
				pct_early: 4.5,
				pct_confirm: 7.8,
				relvol_s1: 2.5,
				relvol_s2: 4.3,
				watch_relvol: 2.0,
				watch_pct: 3.0,
			},
			postmarket: SessionThresholds {
				vol_base: 24_000.0,
				spread_limit: 0.038,
				pct_early: 3.8,
				pct_confirm: 7.0,
				relvol_s1: 2.3,
				relvol_s2: 4.0,
				watch_relvol: 1.7,
				watch_pct: 2.5,
			},
		}
	}

	#[test]
	fn no_historical_stats_defaults_to_base_and_liquidity_half() {
		let t = effective_thresholds(&session_config(), Session::Regular, None).expect("thresholds");
		assert!((t.vol_thresh - 90_000.0).abs() < 1e-9);
		assert!((t.liquidity - 0.5).abs() < 1e-9);
	}

	#[test]
	fn historical_stats_raise_volume_threshold() {
		let stats = HistoricalStats { avg_volume_20d: 2_000_000.0, avg_range_20d: 0.0 };
		let t = effective_thresholds(&session_config(), Session::Regular, Some(&stats)).expect("thresholds");
		assert!((t.vol_thresh - 200_000.0).abs() < 1e-6);
		assert!((t.liquidity - 1.0).abs() < 1e-9);
	}

	#[test]
	fn closed_session_has_no_thresholds() {
		assert!(effective_thresholds(&session_config(), Session::Closed, None).is_none());
	}

	#[test]
	fn range_adjustment_raises_pct_early_when_larger() {
		let stats = HistoricalStats { avg_volume_20d: 0.0, avg_range_20d: 1.0 };
		let base = effective_thresholds(&session_config(), Session::Regular, None).expect("thresholds");
		let adjusted = apply_range_adjustment(base, Some(&stats), 10.0);
		// (1.0/10.0)*1.2 = 0.12, below base pct_early of 4.5, so unchanged.
		assert!((adjusted.pct_early - 4.5).abs() < 1e-9);

		let adjusted_big = apply_range_adjustment(base, Some(&stats), 1.0);
		// (1.0/1.0)*1.2 = 1.2, still below 4.5.
		assert!((adjusted_big.pct_early - 4.5).abs() < 1e-9);
	}

	#[test]
	fn liquidity_gate_constant_matches_spec() {
		assert!((LIQUIDITY_GATE - 0.10).abs() < 1e-9);
	}
}
