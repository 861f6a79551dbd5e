use std::collections::HashMap;

use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::search::scoring::RankedPerson;
use roster_domain::{
	constraints::{DateWindow, QueryConstraints},
	explanation::{self, ReasonEvidence},
	subrecord::SubRecordValue,
	text,
};
use roster_storage::models::{ExperienceRecord, ExperienceSubRecord};

/// The persisted evidence blob plus the deterministic fallback reasons.
pub(crate) struct BuiltEvidence {
	pub blob: Value,
	pub reasons: Vec<String>,
}

pub(crate) struct EvidenceArgs<'a> {
	pub person: &'a RankedPerson,
	pub records: &'a HashMap<Uuid, ExperienceRecord>,
	pub subrecords: &'a HashMap<Uuid, ExperienceSubRecord>,
	pub constraints: &'a QueryConstraints,
	pub cfg: &'a roster_config::Explanation,
}

/// Build the compact, deduplicated evidence payload for one ranked person and
/// derive its deterministic reasons. Everything the async refinement needs
/// lives in the returned blob, so the worker never re-runs retrieval.
pub(crate) fn build_person_evidence(args: EvidenceArgs<'_>) -> BuiltEvidence {
	let EvidenceArgs { person, records, subrecords, constraints, cfg } = args;
	let matched_parents: Vec<&ExperienceRecord> =
		person.matched_parent_ids.iter().filter_map(|id| records.get(id)).collect();
	let display_parents: Vec<&ExperienceRecord> =
		person.display_record_ids.iter().filter_map(|id| records.get(id)).collect();
	let evidence_parents: Vec<&ExperienceRecord> =
		if matched_parents.is_empty() { display_parents.clone() } else { matched_parents };

	let company_match = constraints.must.companies.iter().find_map(|term| {
		evidence_parents
			.iter()
			.find(|record| text::contains_term(&record.company, term))
			.map(|record| record.company.clone())
	});
	let location_match = constraints.must.locations.iter().find_map(|term| {
		evidence_parents
			.iter()
			.any(|record| text::contains_term(&record.location, term))
			.then(|| term.clone())
	});
	let time_match = constraints.must.date_window.and_then(|window| {
		evidence_parents
			.iter()
			.any(|record| record.has_any_date())
			.then(|| render_window(window))
	});

	let mut skill_overlap = Vec::new();
	for keyword in &constraints.should.keywords {
		let matched = evidence_parents.iter().any(|record| {
			text::count_should_hits(
				std::slice::from_ref(keyword),
				&[],
				&record.search_phrases,
				&record.searchable_text(),
			) > 0
		});

		if matched && !skill_overlap.contains(keyword) {
			skill_overlap.push(keyword.clone());
		}
		if skill_overlap.len() >= 3 {
			break;
		}
	}

	let mut snippets = Vec::new();
	let mut metric_snippets = Vec::new();
	for record in evidence_parents.iter().take(cfg.max_snippets_per_person) {
		if record.summary.trim().is_empty() {
			continue;
		}

		let truncated = truncate_graphemes(record.summary.trim(), cfg.snippet_max_chars);

		snippets.push(serde_json::json!({
			"source": "parent",
			"record_id": record.record_id,
			"text": truncated,
		}));
	}
	for child in &person.matched_children {
		let Some(subrecord) = subrecords.get(&child.subrecord_id) else {
			continue;
		};
		let value = SubRecordValue::parse(&subrecord.value);

		for line in value.display_lines() {
			if snippets.len() >= cfg.max_snippets_per_person {
				break;
			}

			let truncated = truncate_graphemes(&line, cfg.snippet_max_chars);

			if snippets
				.iter()
				.any(|existing: &Value| existing["text"].as_str() == Some(truncated.as_str()))
			{
				continue;
			}
			if matches!(subrecord.kind.as_str(), "metrics" | "achievements")
				&& metric_snippets.len() < cfg.max_reasons
			{
				metric_snippets.push(truncated.clone());
			}

			snippets.push(serde_json::json!({
				"source": "child",
				"subrecord_id": subrecord.subrecord_id,
				"record_id": subrecord.record_id,
				"kind": subrecord.kind,
				"text": truncated,
			}));
		}
	}

	let top_parent = evidence_parents.first();
	let reason_evidence = ReasonEvidence {
		company_match,
		location_match,
		time_match,
		skill_overlap: skill_overlap.clone(),
		metric_snippets,
		domain: top_parent
			.map(|record| record.domain.clone())
			.filter(|domain| !domain.trim().is_empty()),
		summary: top_parent
			.map(|record| truncate_graphemes(record.summary.trim(), cfg.max_reason_chars))
			.filter(|summary| !summary.is_empty()),
	};
	let reasons = explanation::deterministic_reasons(&reason_evidence, cfg);

	let child_subrecord_ids: Vec<Uuid> =
		person.matched_children.iter().map(|child| child.subrecord_id).collect();
	let blob = serde_json::json!({
		"parent_record_ids": person.matched_parent_ids,
		"child_subrecord_ids": child_subrecord_ids,
		"display_record_ids": person.display_record_ids,
		"company_match": reason_evidence.company_match,
		"location_match": reason_evidence.location_match,
		"time_match": reason_evidence.time_match,
		"skill_overlap": skill_overlap,
		"snippets": snippets,
	});

	BuiltEvidence { blob, reasons }
}

fn render_window(window: DateWindow) -> String {
	match (window.from, window.to) {
		(Some(from), Some(to)) if from.year() == to.year() => format!("during {}", from.year()),
		(Some(from), Some(to)) => format!("during {}-{}", from.year(), to.year()),
		(Some(from), None) => format!("since {}", from.year()),
		(None, Some(to)) => format!("until {}", to.year()),
		(None, None) => "recently".to_string(),
	}
}

/// Grapheme-safe truncation for display snippets.
pub(crate) fn truncate_graphemes(text: &str, max: usize) -> String {
	if text.graphemes(true).count() <= max {
		return text.to_string();
	}

	let mut out: String = text.graphemes(true).take(max.saturating_sub(1)).collect();

	out.push('…');

	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use time::macros::date;

	#[test]
	fn renders_window_labels() {
		let year = DateWindow { from: Some(date!(2022 - 01 - 01)), to: Some(date!(2022 - 12 - 31)) };
		let range = DateWindow { from: Some(date!(2020 - 01 - 01)), to: Some(date!(2022 - 12 - 31)) };
		let open = DateWindow { from: Some(date!(2020 - 01 - 01)), to: None };

		assert_eq!(render_window(year), "during 2022");
		assert_eq!(render_window(range), "during 2020-2022");
		assert_eq!(render_window(open), "since 2020");
	}

	#[test]
	fn grapheme_truncation_keeps_clusters_whole() {
		assert_eq!(truncate_graphemes("héllo", 10), "héllo");

		let truncated = truncate_graphemes("a🇩🇪b🇫🇷cdef", 4);

		assert_eq!(truncated.graphemes(true).count(), 4);
		assert!(truncated.ends_with('…'));
	}
}
