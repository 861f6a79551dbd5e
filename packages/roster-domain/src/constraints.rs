use regex::Regex;
use serde::{Deserialize, Serialize};
use time::{Date, Month};

/// Provider-parsed constraint payload, tolerant of missing or extra fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConstraints {
	pub confidence: f32,
	pub must: RawMust,
	pub should: RawShould,
	pub exclude: RawExclude,
	pub search_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMust {
	pub intents: Vec<String>,
	pub companies: Vec<String>,
	pub teams: Vec<String>,
	pub locations: Vec<String>,
	pub domains: Vec<String>,
	pub subdomains: Vec<String>,
	pub date_from: Option<String>,
	pub date_to: Option<String>,
	pub salary_min: Option<i64>,
	pub salary_max: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawShould {
	pub keywords: Vec<String>,
	pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawExclude {
	pub companies: Vec<String>,
	pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
	Hiring,
	Job,
	Collaboration,
	Mentorship,
	Investment,
}
impl Intent {
	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"hiring" => Some(Self::Hiring),
			"job" => Some(Self::Job),
			"collaboration" => Some(Self::Collaboration),
			"mentorship" => Some(Self::Mentorship),
			"investment" => Some(Self::Investment),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Hiring => "hiring",
			Self::Job => "job",
			Self::Collaboration => "collaboration",
			Self::Mentorship => "mentorship",
			Self::Investment => "investment",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
	pub from: Option<Date>,
	pub to: Option<Date>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MustConstraints {
	pub intents: Vec<Intent>,
	pub companies: Vec<String>,
	pub teams: Vec<String>,
	pub locations: Vec<String>,
	pub domains: Vec<String>,
	pub subdomains: Vec<String>,
	pub date_window: Option<DateWindow>,
	pub salary_min: Option<i64>,
	pub salary_max: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShouldConstraints {
	pub keywords: Vec<String>,
	pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeConstraints {
	pub companies: Vec<String>,
	pub keywords: Vec<String>,
}

/// Rebalanced constraint set, safe to hand to retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConstraints {
	pub confidence: f32,
	pub must: MustConstraints,
	pub should: ShouldConstraints,
	pub exclude: ExcludeConstraints,
	pub search_text: String,
}
impl QueryConstraints {
	/// Fully unconstrained semantic search over the raw query text.
	pub fn unconstrained(query: &str) -> Self {
		Self {
			confidence: 0.0,
			must: MustConstraints::default(),
			should: ShouldConstraints::default(),
			exclude: ExcludeConstraints::default(),
			search_text: query.trim().to_string(),
		}
	}

	pub fn wants_time_window(&self) -> bool {
		self.must.date_window.is_some()
	}

	pub fn wants_location(&self) -> bool {
		!self.must.locations.is_empty()
	}

	pub fn wants_salary(&self) -> bool {
		self.must.salary_min.is_some() || self.must.salary_max.is_some()
	}
}

/// Rebalance a raw provider payload into a safe constraint set. Never fails:
/// worst case the result degrades toward an unconstrained semantic search.
pub fn normalize(
	raw: RawConstraints,
	query: &str,
	cfg: &roster_config::Constraints,
) -> QueryConstraints {
	let confidence = if raw.confidence.is_finite() { raw.confidence.clamp(0.0, 1.0) } else { 0.0 };
	let mut demoted_keywords = Vec::new();

	let mut intents = Vec::new();
	for raw_intent in &raw.must.intents {
		let Some(intent) = Intent::parse(raw_intent) else {
			continue;
		};
		if !intents.contains(&intent) {
			intents.push(intent);
		}
	}
	demote_excess_intents(&mut intents, cfg.max_must_intents, &mut demoted_keywords);

	let mut companies = dedupe_case_insensitive(raw.must.companies);
	demote_excess(&mut companies, cfg.max_must_companies, &mut demoted_keywords);

	let mut teams = dedupe_case_insensitive(raw.must.teams);
	demote_excess(&mut teams, cfg.max_must_teams, &mut demoted_keywords);

	let mut locations = dedupe_case_insensitive(raw.must.locations);
	demote_excess(&mut locations, cfg.max_must_locations, &mut demoted_keywords);

	let mut domains = dedupe_case_insensitive(raw.must.domains);
	let mut subdomains = dedupe_case_insensitive(raw.must.subdomains);

	if confidence < cfg.min_parse_confidence {
		demoted_keywords.append(&mut domains);
		demoted_keywords.append(&mut subdomains);
	}

	let from = raw
		.must
		.date_from
		.as_deref()
		.and_then(|text| parse_query_date(text, DateEdge::Start, cfg));
	let to = raw
		.must
		.date_to
		.as_deref()
		.and_then(|text| parse_query_date(text, DateEdge::End, cfg));
	let date_window = match (from, to) {
		(None, None) => None,
		(Some(from), Some(to)) if from > to => Some(DateWindow { from: Some(to), to: Some(from) }),
		(from, to) => Some(DateWindow { from, to }),
	};

	let salary_min = raw.must.salary_min.and_then(|v| normalize_salary(v, cfg.min_annual_salary));
	let salary_max = raw.must.salary_max.and_then(|v| normalize_salary(v, cfg.min_annual_salary));
	let (salary_min, salary_max) = match (salary_min, salary_max) {
		(Some(lo), Some(hi)) if lo > hi => (Some(hi), Some(lo)),
		other => other,
	};

	let mut keywords = raw.should.keywords;
	keywords.extend(demoted_keywords);
	let keywords = dedupe_case_insensitive(keywords);
	let phrases = dedupe_case_insensitive(raw.should.phrases);

	let search_text = raw
		.search_text
		.as_deref()
		.map(str::trim)
		.filter(|text| !text.is_empty())
		.unwrap_or_else(|| query.trim())
		.to_string();

	QueryConstraints {
		confidence,
		must: MustConstraints {
			intents,
			companies,
			teams,
			locations,
			domains,
			subdomains,
			date_window,
			salary_min,
			salary_max,
		},
		should: ShouldConstraints { keywords, phrases },
		exclude: ExcludeConstraints {
			companies: dedupe_case_insensitive(raw.exclude.companies),
			keywords: dedupe_case_insensitive(raw.exclude.keywords),
		},
		search_text,
	}
}

/// Case-insensitive dedupe preserving first-seen order. Blank entries drop.
pub fn dedupe_case_insensitive(items: Vec<String>) -> Vec<String> {
	let mut seen = Vec::new();
	let mut out = Vec::new();

	for item in items {
		let trimmed = item.trim();

		if trimmed.is_empty() {
			continue;
		}

		let lowered = trimmed.to_lowercase();

		if seen.contains(&lowered) {
			continue;
		}

		seen.push(lowered);
		out.push(trimmed.to_string());
	}

	out
}

fn demote_excess(items: &mut Vec<String>, cap: usize, demoted: &mut Vec<String>) {
	if items.len() > cap {
		demoted.extend(items.split_off(cap));
	}
}

fn demote_excess_intents(items: &mut Vec<Intent>, cap: usize, demoted: &mut Vec<String>) {
	if items.len() > cap {
		demoted.extend(items.split_off(cap).into_iter().map(|intent| intent.as_str().to_string()));
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateEdge {
	Start,
	End,
}

/// Parse `YYYY-MM-DD`, `YYYY-MM`, or `YYYY`, widened to the edge of the stated
/// period and clamped to the configured year range. Anything else is None.
pub fn parse_query_date(
	text: &str,
	edge: DateEdge,
	cfg: &roster_config::Constraints,
) -> Option<Date> {
	let trimmed = text.trim();
	let mut parts = trimmed.split('-');
	let year: i32 = parts.next()?.parse().ok()?;

	if trimmed.split('-').next().map(str::len) != Some(4) {
		return None;
	}

	let year = year.clamp(cfg.min_query_year, cfg.max_query_year);
	let month = match parts.next() {
		None => None,
		Some(raw) => {
			if raw.len() != 2 {
				return None;
			}

			let value: u8 = raw.parse().ok()?;

			Some(Month::try_from(value).ok()?)
		},
	};
	let day = match parts.next() {
		None => None,
		Some(raw) => {
			if raw.len() != 2 {
				return None;
			}

			Some(raw.parse::<u8>().ok()?)
		},
	};

	if parts.next().is_some() {
		return None;
	}

	match (month, day) {
		(Some(month), Some(day)) => Date::from_calendar_date(year, month, day).ok(),
		(Some(month), None) => match edge {
			DateEdge::Start => Date::from_calendar_date(year, month, 1).ok(),
			DateEdge::End => {
				let last = month.length(year);

				Date::from_calendar_date(year, month, last).ok()
			},
		},
		(None, None) => match edge {
			DateEdge::Start => Date::from_calendar_date(year, Month::January, 1).ok(),
			DateEdge::End => Date::from_calendar_date(year, Month::December, 31).ok(),
		},
		(None, Some(_)) => None,
	}
}

/// Figures below the annual plausibility floor are read as per-month pay.
/// Negative figures drop.
pub fn normalize_salary(value: i64, min_annual: i64) -> Option<i64> {
	if value < 0 {
		return None;
	}
	if value == 0 {
		return None;
	}
	if value < min_annual {
		return Some(value * 12);
	}

	Some(value)
}

/// Infer a requested card count from phrases like "give me 3 cards" or
/// "show 5 profiles". The result is unclamped; the caller bounds it.
pub fn requested_num_cards(query: &str) -> Option<u32> {
	let pattern = Regex::new(
		r"(?i)\b(\d{1,3})\s*(?:cards?|results?|profiles?|candidates?|people|matches)\b",
	)
	.ok()?;
	let captures = pattern.captures(query)?;

	captures.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cfg() -> roster_config::Constraints {
		roster_config::Constraints::default()
	}

	#[test]
	fn excess_must_companies_demote_to_keywords() {
		let raw = RawConstraints {
			confidence: 0.9,
			must: RawMust {
				companies: vec![
					"Acme".to_string(),
					"Globex".to_string(),
					"Initech".to_string(),
					"Umbrella".to_string(),
				],
				..RawMust::default()
			},
			..RawConstraints::default()
		};
		let normalized = normalize(raw, "engineers", &cfg());

		assert_eq!(normalized.must.companies.len(), 3);
		assert!(normalized.should.keywords.iter().any(|k| k == "Umbrella"));
	}

	#[test]
	fn low_confidence_demotes_domains() {
		let raw = RawConstraints {
			confidence: 0.2,
			must: RawMust { domains: vec!["fintech".to_string()], ..RawMust::default() },
			..RawConstraints::default()
		};
		let normalized = normalize(raw, "fintech people", &cfg());

		assert!(normalized.must.domains.is_empty());
		assert!(normalized.should.keywords.iter().any(|k| k == "fintech"));
	}

	#[test]
	fn inverted_dates_swap() {
		let raw = RawConstraints {
			confidence: 0.9,
			must: RawMust {
				date_from: Some("2023".to_string()),
				date_to: Some("2021".to_string()),
				..RawMust::default()
			},
			..RawConstraints::default()
		};
		let normalized = normalize(raw, "q", &cfg());
		let window = normalized.must.date_window.expect("window expected");

		assert!(window.from.unwrap() < window.to.unwrap());
	}

	#[test]
	fn year_only_dates_widen_to_period_edges() {
		let from = parse_query_date("2022", DateEdge::Start, &cfg()).unwrap();
		let to = parse_query_date("2022", DateEdge::End, &cfg()).unwrap();

		assert_eq!(from.to_string(), "2022-01-01");
		assert_eq!(to.to_string(), "2022-12-31");
	}

	#[test]
	fn garbage_dates_drop() {
		assert!(parse_query_date("22", DateEdge::Start, &cfg()).is_none());
		assert!(parse_query_date("March 2022", DateEdge::Start, &cfg()).is_none());
		assert!(parse_query_date("2022-3", DateEdge::Start, &cfg()).is_none());
	}

	#[test]
	fn monthly_salary_annualizes() {
		assert_eq!(normalize_salary(800, 10_000), Some(9_600));
		assert_eq!(normalize_salary(120_000, 10_000), Some(120_000));
		assert_eq!(normalize_salary(-5, 10_000), None);
	}

	#[test]
	fn invalid_intents_silently_drop() {
		let raw = RawConstraints {
			confidence: 0.9,
			must: RawMust {
				intents: vec!["hiring".to_string(), "world domination".to_string()],
				..RawMust::default()
			},
			..RawConstraints::default()
		};
		let normalized = normalize(raw, "q", &cfg());

		assert_eq!(normalized.must.intents, vec![Intent::Hiring]);
	}

	#[test]
	fn dedupe_preserves_first_seen_order() {
		let deduped = dedupe_case_insensitive(vec![
			"Rust".to_string(),
			"  rust ".to_string(),
			"Go".to_string(),
		]);

		assert_eq!(deduped, vec!["Rust".to_string(), "Go".to_string()]);
	}

	#[test]
	fn card_count_parses_from_query_text() {
		assert_eq!(requested_num_cards("give me 3 cards of ML folks"), Some(3));
		assert_eq!(requested_num_cards("show 12 profiles"), Some(12));
		assert_eq!(requested_num_cards("rust engineers in berlin"), None);
	}
}
