use std::cmp::Ordering;

use uuid::Uuid;

use crate::fallback::FallbackTier;

/// Everything gathered about one candidate person before collapsing to a
/// single ranked score.
#[derive(Debug, Clone, Default)]
pub struct PersonSignals {
	pub parent_sims: Vec<f32>,
	pub child_sims: Vec<f32>,
	pub should_hits: u32,
	/// Raw lexical relevance, already normalized to a small bounded range.
	pub lexical_bonus: f32,
	pub has_dated_parent: bool,
	pub location_matched: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreContext<'a> {
	pub weights: &'a roster_config::Ranking,
	pub tier: FallbackTier,
	pub wants_time_window: bool,
	pub wants_location: bool,
}

/// Collapse one person's evidence into the blended score. Floor is zero.
pub fn blend_score(signals: &PersonSignals, ctx: ScoreContext<'_>) -> f32 {
	let weights = ctx.weights;
	let best_parent = max_sim(&signals.parent_sims);
	let best_child = max_sim(&signals.child_sims);
	let depth = top_sims_avg(signals, 3);

	let mut score = weights.parent_weight * best_parent
		+ weights.child_weight * best_child
		+ weights.depth_weight * depth;

	score += signals.lexical_bonus.min(weights.lexical_bonus_cap);
	score += (signals.should_hits as f32 * weights.should_hit_boost).min(weights.should_hit_cap);

	if ctx.wants_time_window && ctx.tier.time_window_relaxed() && !signals.has_dated_parent {
		score -= weights.missing_date_penalty;
	}
	if ctx.wants_location && ctx.tier.location_relaxed() && !signals.location_matched {
		score -= weights.location_mismatch_penalty;
	}

	score.max(0.0)
}

fn max_sim(sims: &[f32]) -> f32 {
	sims.iter().copied().fold(0.0_f32, f32::max)
}

/// Mean of the top `n` similarities across parent and child matches.
fn top_sims_avg(signals: &PersonSignals, n: usize) -> f32 {
	let mut all: Vec<f32> =
		signals.parent_sims.iter().chain(signals.child_sims.iter()).copied().collect();

	if all.is_empty() {
		return 0.0;
	}

	all.sort_by(|a, b| cmp_f32_desc(*a, *b));
	all.truncate(n);

	all.iter().sum::<f32>() / all.len() as f32
}

/// Secondary sort key applied as a stable re-sort over the whole ranking.
#[derive(Debug, Clone, Copy)]
pub struct RankKey {
	pub score: f32,
	/// Person has an explicitly stated preferred minimum salary.
	pub salary_stated: bool,
	/// At least one matched record fully overlaps the query date window with
	/// both bounds known.
	pub full_date_overlap: bool,
	pub person_id: Uuid,
}

/// Total deterministic order: score desc, then the tie-break keys that the
/// query activates, then person id.
pub fn compare_ranked(
	lhs: &RankKey,
	rhs: &RankKey,
	wants_salary: bool,
	wants_time_window: bool,
) -> Ordering {
	cmp_f32_desc(lhs.score, rhs.score)
		.then_with(|| {
			if wants_salary {
				rhs.salary_stated.cmp(&lhs.salary_stated)
			} else {
				Ordering::Equal
			}
		})
		.then_with(|| {
			if wants_time_window {
				rhs.full_date_overlap.cmp(&lhs.full_date_overlap)
			} else {
				Ordering::Equal
			}
		})
		.then_with(|| lhs.person_id.cmp(&rhs.person_id))
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

/// Map a blended score onto the 0-100 display scale.
pub fn similarity_percent(score: f32) -> u8 {
	(score.clamp(0.0, 1.0) * 100.0).round() as u8
}
