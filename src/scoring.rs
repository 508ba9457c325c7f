/// Inputs to the quality scorer (C4, §4.4). Pure function, no side effects.
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs {
	pub rel_vol: f64,
	pub pct_change: f64,
	pub volume: f64,
	pub vol_thresh: f64,
	pub trade_count: u64,
	pub min_trades: u64,
	pub spread_ratio: Option<f64>,
	pub spread_limit: f64,
	pub price_expansion_pct: f64,
	pub acceleration: bool,
	pub volume_sustained: bool,
}

/// Weighted-sum quality score in `[0,100]`, rounded to one decimal (§4.4).
#[must_use]
pub fn score(inputs: &ScoreInputs) -> f64 {
	let relvol_component = (inputs.rel_vol.min(8.0) / 8.0) * 28.0;

	let pct_component = (inputs.pct_change.abs().min(14.0) / 14.0) * 18.0;

	let volume_component = if inputs.vol_thresh > 0.0 {
		((inputs.volume / inputs.vol_thresh).min(2.0) / 2.0) * 14.0
	} else {
		0.0
	};

	let min_trades_floor = inputs.min_trades.max(1) as f64;
	let density_component = ((inputs.trade_count as f64 / min_trades_floor).min(3.0) / 3.0) * 12.0;

	let spread_component = inputs.spread_ratio.map_or(5.0, |spread| {
		(((inputs.spread_limit - spread) / inputs.spread_limit).max(0.0)) * 10.0
	});

	let mut expansion_sum = if inputs.price_expansion_pct >= 0.6 { (inputs.price_expansion_pct / 6.0).min(0.6) } else { 0.0 };
	if inputs.acceleration {
		expansion_sum += 0.3;
	}
	if inputs.volume_sustained {
		expansion_sum += 0.3;
	}
	let expansion_component = expansion_sum.min(1.0) * 18.0;

	let mut total =
		relvol_component + pct_component + volume_component + density_component + spread_component + expansion_component;

	if inputs.pct_change >= 11.0 && !inputs.volume_sustained {
		total -= (inputs.pct_change - 11.0).min(6.0) / 6.0 * 6.0;
	}

	if inputs.trade_count > 0 {
		let avg_trade_size = inputs.volume / inputs.trade_count as f64;
		if avg_trade_size < 120.0 {
			total -= 4.0;
		} else if avg_trade_size < 200.0 {
			total -= 2.0;
		}
	}

	(total.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
	use super::*;

	fn baseline() -> ScoreInputs {
		ScoreInputs {
			rel_vol: 3.0,
			pct_change: 5.0,
			volume: 100_000.0,
			vol_thresh: 90_000.0,
			trade_count: 150,
			min_trades: 3,
			spread_ratio: Some(0.01),
			spread_limit: 0.02,
			price_expansion_pct: 0.0,
			acceleration: false,
			volume_sustained: false,
		}
	}

	#[test]
	fn score_is_within_range() {
		let s = score(&baseline());
		assert!((0.0..=100.0).contains(&s));
	}

	#[test]
	fn unknown_spread_gives_partial_credit() {
		let mut inputs = baseline();
		inputs.spread_ratio = None;
		let s = score(&inputs);
		assert!(s > 0.0);
	}

	#[test]
	fn parabolic_penalty_lowers_score_when_not_sustained() {
		let mut sustained = baseline();
		sustained.pct_change = 14.0;
		sustained.volume_sustained = true;

		let mut unsustained = sustained;
		unsustained.volume_sustained = false;

		let sustained_score = score(&sustained);
		let unsustained_score = score(&unsustained);
		let expected_penalty = (14.0_f64 - 11.0).min(6.0) / 6.0 * 6.0;

		assert!((sustained_score - unsustained_score - expected_penalty).abs() < 1e-9);
	}

	#[test]
	fn retail_churn_penalty_applies_below_size_tiers() {
		let mut churny = baseline();
		churny.volume = 100.0;
		churny.trade_count = 10; // avg trade size 10 < 120
		let mut mid_tier = baseline();
		mid_tier.volume = 150.0 * 150.0;
		mid_tier.trade_count = 150; // avg 150, in [120,200) tier
		let mut high_tier = baseline();
		high_tier.volume = 300.0 * 150.0;
		high_tier.trade_count = 150; // avg 300, no penalty
		assert!(score(&churny) <= score(&mid_tier));
		assert!(score(&mid_tier) <= score(&high_tier));
	}
}
