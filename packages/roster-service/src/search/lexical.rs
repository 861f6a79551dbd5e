use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use roster_domain::{constraints::QueryConstraints, text};

const MAX_LEXICAL_TERMS: usize = 8;
const MAX_LEXICAL_PERSONS: i64 = 256;

/// Per-person lexical relevance over both record types, already scaled into
/// the bounded bonus range. Best-effort: callers treat any error as "no
/// lexical bonus".
pub(crate) async fn person_lexical_bonus(
	pool: &PgPool,
	constraints: &QueryConstraints,
	scale: f32,
) -> sqlx::Result<HashMap<Uuid, f32>> {
	let Some(query_text) = build_lexical_query(constraints) else {
		return Ok(HashMap::new());
	};

	let rows: Vec<(Uuid, f32)> = sqlx::query_as(
		"\
SELECT person_id, MAX(rank_score)::real AS rank_score
FROM (
	SELECT r.person_id, ts_rank(r.search_doc, q) AS rank_score
	FROM experience_records r, websearch_to_tsquery('english', $1) q
	WHERE r.visible AND r.search_doc @@ q
	UNION ALL
	SELECT s.person_id, ts_rank(s.search_doc, q) AS rank_score
	FROM experience_subrecords s
	JOIN experience_records r ON r.record_id = s.record_id AND r.visible,
	websearch_to_tsquery('english', $1) q
	WHERE s.search_doc @@ q
) hits
GROUP BY person_id
ORDER BY rank_score DESC
LIMIT $2",
	)
	.bind(query_text)
	.bind(MAX_LEXICAL_PERSONS)
	.fetch_all(pool)
	.await?;

	Ok(rows.into_iter().map(|(person_id, rank)| (person_id, rank * scale)).collect())
}

/// Extracted phrases plus top keywords, as a websearch expression. Falls back
/// to the canonical search text when the parser produced neither.
fn build_lexical_query(constraints: &QueryConstraints) -> Option<String> {
	let mut terms = Vec::new();

	for phrase in constraints.should.phrases.iter().take(MAX_LEXICAL_TERMS) {
		let trimmed = phrase.trim();

		if !trimmed.is_empty() {
			terms.push(format!("\"{}\"", trimmed.replace('"', "")));
		}
	}
	for keyword in &constraints.should.keywords {
		if terms.len() >= MAX_LEXICAL_TERMS {
			break;
		}

		let trimmed = keyword.trim();

		if !trimmed.is_empty() {
			terms.push(trimmed.to_string());
		}
	}

	if terms.is_empty() {
		terms = text::tokenize(&constraints.search_text, MAX_LEXICAL_TERMS);
	}
	if terms.is_empty() {
		return None;
	}

	Some(terms.join(" OR "))
}
