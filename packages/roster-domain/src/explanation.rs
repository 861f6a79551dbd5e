use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Per-person evidence the deterministic reason builder works from. Already
/// deduplicated and truncated by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonEvidence {
	pub company_match: Option<String>,
	pub location_match: Option<String>,
	pub time_match: Option<String>,
	pub skill_overlap: Vec<String>,
	pub metric_snippets: Vec<String>,
	pub domain: Option<String>,
	pub summary: Option<String>,
}

/// Derive 1-3 short reasons by fixed priority: explicit filter matches, then
/// skill/tool overlap, then outcome snippets, then domain/summary fallback.
/// This is the permanent safety net when refinement is skipped or fails.
pub fn deterministic_reasons(
	evidence: &ReasonEvidence,
	cfg: &roster_config::Explanation,
) -> Vec<String> {
	let mut out: Vec<String> = Vec::new();
	let mut push = |text: String, out: &mut Vec<String>| {
		let truncated = truncate_chars(text.trim(), cfg.max_reason_chars);

		if truncated.is_empty() {
			return;
		}
		if out.iter().any(|existing| existing.eq_ignore_ascii_case(&truncated)) {
			return;
		}
		if out.len() < cfg.max_reasons {
			out.push(truncated);
		}
	};

	if let Some(company) = evidence.company_match.as_deref() {
		push(format!("Worked at {company}"), &mut out);
	}
	if let Some(location) = evidence.location_match.as_deref() {
		push(format!("Based in {location}"), &mut out);
	}
	if let Some(window) = evidence.time_match.as_deref() {
		push(format!("Active {window}"), &mut out);
	}

	if !evidence.skill_overlap.is_empty() {
		let listed = evidence
			.skill_overlap
			.iter()
			.take(3)
			.map(String::as_str)
			.collect::<Vec<_>>()
			.join(", ");

		push(format!("Hands-on with {listed}"), &mut out);
	}

	for snippet in &evidence.metric_snippets {
		push(snippet.clone(), &mut out);
	}

	if out.is_empty() {
		if let Some(summary) = evidence.summary.as_deref() {
			push(summary.to_string(), &mut out);
		}
	}
	if out.is_empty() {
		if let Some(domain) = evidence.domain.as_deref() {
			push(format!("Background in {domain}"), &mut out);
		}
	}
	if out.is_empty() {
		push("Relevant experience match".to_string(), &mut out);
	}

	out
}

/// Accept a refined reason list only when every line survives validation and
/// at least one line remains after dedup. Otherwise the deterministic
/// fallback stands.
pub fn sanitize_refined_reasons(
	reasons: Vec<String>,
	cfg: &roster_config::Explanation,
) -> Option<Vec<String>> {
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for reason in reasons {
		let trimmed = reason.trim().to_string();

		if !reason_is_valid(&trimmed, cfg.max_reason_chars) {
			return None;
		}
		if !seen.insert(trimmed.to_lowercase()) {
			return None;
		}
		if out.len() < cfg.max_reasons {
			out.push(trimmed);
		}
	}

	if out.is_empty() { None } else { Some(out) }
}

pub fn reason_is_valid(text: &str, max_chars: usize) -> bool {
	let trimmed = text.trim();

	if trimmed.is_empty() {
		return false;
	}
	if trimmed.chars().count() > max_chars {
		return false;
	}

	!is_repeated_word_spam(trimmed)
}

/// A reason where one word dominates the text is generator noise, not a
/// usable explanation.
fn is_repeated_word_spam(text: &str) -> bool {
	let words: Vec<String> =
		text.split_whitespace().map(|word| word.to_lowercase()).collect();

	if words.len() < 4 {
		return false;
	}

	let mut max_count = 0;

	for word in &words {
		let count = words.iter().filter(|candidate| *candidate == word).count();

		max_count = max_count.max(count);
	}

	max_count * 2 > words.len()
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
	if text.chars().count() <= max_chars {
		return text.to_string();
	}

	let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();

	out.push('…');

	out
}
