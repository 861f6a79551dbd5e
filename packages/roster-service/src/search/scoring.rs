use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::search::retrieval::{ChildHit, TierCandidates};
use roster_domain::{
	constraints::{DateWindow, QueryConstraints},
	fallback::FallbackTier,
	scoring::{self, PersonSignals, RankKey, ScoreContext},
	text,
};
use roster_storage::models::{ExperienceRecord, PersonProfile};

pub(crate) const MAX_DISPLAY_RECORDS: usize = 3;

#[derive(Debug)]
pub(crate) struct RankedPerson {
	pub person_id: Uuid,
	pub score: f32,
	pub matched_parent_ids: Vec<Uuid>,
	pub matched_children: Vec<ChildHit>,
	pub display_record_ids: Vec<Uuid>,
	pub salary_stated: bool,
	pub full_date_overlap: bool,
}

pub(crate) struct CollapseArgs<'a> {
	pub candidates: &'a TierCandidates,
	pub records: &'a HashMap<Uuid, ExperienceRecord>,
	pub persons: &'a HashMap<Uuid, PersonProfile>,
	pub lexical: &'a HashMap<Uuid, f32>,
	pub constraints: &'a QueryConstraints,
	pub tier: FallbackTier,
	pub ranking: &'a roster_config::Ranking,
}

/// Merge per-record evidence into one ranked score per person and sort by
/// the blended score plus the deterministic tie-break keys.
pub(crate) fn collapse_and_rank(args: CollapseArgs<'_>) -> Vec<RankedPerson> {
	let mut parent_hits: HashMap<Uuid, Vec<(Uuid, f32)>> = HashMap::new();
	for hit in &args.candidates.parents {
		parent_hits.entry(hit.person_id).or_default().push((hit.record_id, hit.similarity));
	}

	let mut child_hits: HashMap<Uuid, Vec<ChildHit>> = HashMap::new();
	for hit in &args.candidates.child_evidence {
		child_hits.entry(hit.person_id).or_default().push(hit.clone());
	}
	// A person surfaced by the best-per-person aggregate stays included even
	// when the evidence query missed them.
	for hit in &args.candidates.child_best {
		let entry = child_hits.entry(hit.person_id).or_default();

		if !entry.iter().any(|existing| existing.subrecord_id == hit.subrecord_id) {
			entry.push(hit.clone());
		}
	}

	let person_ids: HashSet<Uuid> =
		parent_hits.keys().chain(child_hits.keys()).copied().collect();
	let mut ranked = Vec::with_capacity(person_ids.len());

	for person_id in person_ids {
		let Some(person) = args.persons.get(&person_id) else {
			continue;
		};
		let mut parents = parent_hits.remove(&person_id).unwrap_or_default();

		parents.sort_by(|a, b| scoring::cmp_f32_desc(a.1, b.1));

		let mut children = child_hits.remove(&person_id).unwrap_or_default();

		children.sort_by(|a, b| scoring::cmp_f32_desc(a.similarity, b.similarity));

		let matched_parents: Vec<&ExperienceRecord> =
			parents.iter().filter_map(|(record_id, _)| args.records.get(record_id)).collect();
		let signals = PersonSignals {
			parent_sims: parents.iter().map(|(_, similarity)| *similarity).collect(),
			child_sims: children.iter().map(|hit| hit.similarity).collect(),
			should_hits: count_person_should_hits(&matched_parents, args.constraints),
			lexical_bonus: args.lexical.get(&person_id).copied().unwrap_or(0.0),
			has_dated_parent: matched_parents.iter().any(|record| record.has_any_date()),
			location_matched: location_matches(&matched_parents, args.constraints),
		};
		let score = scoring::blend_score(
			&signals,
			ScoreContext {
				weights: args.ranking,
				tier: args.tier,
				wants_time_window: args.constraints.wants_time_window(),
				wants_location: args.constraints.wants_location(),
			},
		);
		let matched_parent_ids: Vec<Uuid> =
			parents.iter().map(|(record_id, _)| *record_id).collect();
		let display_record_ids = select_display_records(&matched_parent_ids, &children);
		let full_date_overlap = args
			.constraints
			.must
			.date_window
			.map(|window| {
				matched_parents.iter().any(|record| record_fully_overlaps(record, window))
			})
			.unwrap_or(false);

		ranked.push(RankedPerson {
			person_id,
			score,
			matched_parent_ids,
			matched_children: children,
			display_record_ids,
			salary_stated: person.preferred_salary_min.is_some(),
			full_date_overlap,
		});
	}

	let wants_salary = args.constraints.wants_salary();
	let wants_time = args.constraints.wants_time_window();

	ranked.sort_by(|lhs, rhs| {
		scoring::compare_ranked(
			&rank_key(lhs),
			&rank_key(rhs),
			wants_salary,
			wants_time,
		)
	});

	ranked
}

fn rank_key(person: &RankedPerson) -> RankKey {
	RankKey {
		score: person.score,
		salary_stated: person.salary_stated,
		full_date_overlap: person.full_date_overlap,
		person_id: person.person_id,
	}
}

/// Matched parents first; a child-only person borrows its best children's
/// owning parents for display.
fn select_display_records(parent_ids: &[Uuid], children: &[ChildHit]) -> Vec<Uuid> {
	let mut out: Vec<Uuid> = parent_ids.iter().copied().take(MAX_DISPLAY_RECORDS).collect();

	if out.is_empty() {
		for child in children {
			if !out.contains(&child.record_id) {
				out.push(child.record_id);
			}
			if out.len() >= MAX_DISPLAY_RECORDS {
				break;
			}
		}
	}

	out
}

fn count_person_should_hits(
	matched_parents: &[&ExperienceRecord],
	constraints: &QueryConstraints,
) -> u32 {
	let keywords = &constraints.should.keywords;
	let phrases = &constraints.should.phrases;

	if keywords.is_empty() && phrases.is_empty() {
		return 0;
	}

	matched_parents
		.iter()
		.map(|record| {
			text::count_should_hits(
				keywords,
				phrases,
				&record.search_phrases,
				&record.searchable_text(),
			)
		})
		.sum()
}

fn location_matches(
	matched_parents: &[&ExperienceRecord],
	constraints: &QueryConstraints,
) -> bool {
	constraints.must.locations.iter().any(|term| {
		matched_parents.iter().any(|record| text::contains_term(&record.location, term))
	})
}

/// Full overlap needs both record bounds known and both inside-or-spanning
/// the query window.
fn record_fully_overlaps(record: &ExperienceRecord, window: DateWindow) -> bool {
	let (Some(start), Some(end)) = (record.start_date, record.end_date) else {
		return false;
	};

	let starts_in_time = window.to.map(|to| start <= to).unwrap_or(true);
	let ends_in_time = window.from.map(|from| end >= from).unwrap_or(true);

	starts_in_time && ends_in_time
}
