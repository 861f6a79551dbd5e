use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
	Result,
	models::{
		ExperienceRecord, ExperienceSubRecord, PersonProfile, SearchRequestRow, SearchResultRow,
	},
};

const PERSON_COLUMNS: &str = "\
person_id, display_name, headline, bio, open_to_work, open_to_contact, preferred_locations, \
preferred_salary_min, preferred_salary_max, credit_balance, created_at, updated_at";

const RECORD_COLUMNS: &str = "\
record_id, person_id, title, company, team, role, domain, summary, location, employment_type, \
seniority, start_date, end_date, is_current, visible, search_phrases, embedding_version, \
created_at, updated_at";

const SUBRECORD_COLUMNS: &str = "\
subrecord_id, record_id, person_id, kind, value, embedding_version, created_at, updated_at";

pub async fn insert_person(executor: impl PgExecutor<'_>, person: &PersonProfile) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO person_profiles (
	person_id,
	display_name,
	headline,
	bio,
	open_to_work,
	open_to_contact,
	preferred_locations,
	preferred_salary_min,
	preferred_salary_max,
	credit_balance,
	created_at,
	updated_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
	)
	.bind(person.person_id)
	.bind(person.display_name.as_str())
	.bind(person.headline.as_str())
	.bind(person.bio.as_str())
	.bind(person.open_to_work)
	.bind(person.open_to_contact)
	.bind(person.preferred_locations.as_slice())
	.bind(person.preferred_salary_min)
	.bind(person.preferred_salary_max)
	.bind(person.credit_balance)
	.bind(person.created_at)
	.bind(person.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn insert_record(executor: impl PgExecutor<'_>, record: &ExperienceRecord) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO experience_records (
	record_id,
	person_id,
	title,
	company,
	team,
	role,
	domain,
	summary,
	location,
	employment_type,
	seniority,
	start_date,
	end_date,
	is_current,
	visible,
	search_phrases,
	search_doc,
	embedding_version,
	created_at,
	updated_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,to_tsvector('english', $17),$18,$19,$20)",
	)
	.bind(record.record_id)
	.bind(record.person_id)
	.bind(record.title.as_str())
	.bind(record.company.as_str())
	.bind(record.team.as_str())
	.bind(record.role.as_str())
	.bind(record.domain.as_str())
	.bind(record.summary.as_str())
	.bind(record.location.as_str())
	.bind(record.employment_type.as_str())
	.bind(record.seniority.as_str())
	.bind(record.start_date)
	.bind(record.end_date)
	.bind(record.is_current)
	.bind(record.visible)
	.bind(record.search_phrases.as_slice())
	.bind(record.searchable_text())
	.bind(record.embedding_version.as_str())
	.bind(record.created_at)
	.bind(record.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

/// Re-write a record's editable content and refresh its lexical document.
pub async fn update_record_content(
	executor: impl PgExecutor<'_>,
	record: &ExperienceRecord,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE experience_records
SET
	title = $1,
	company = $2,
	team = $3,
	role = $4,
	domain = $5,
	summary = $6,
	location = $7,
	start_date = $8,
	end_date = $9,
	is_current = $10,
	search_phrases = $11,
	search_doc = to_tsvector('english', $12),
	updated_at = $13
WHERE record_id = $14",
	)
	.bind(record.title.as_str())
	.bind(record.company.as_str())
	.bind(record.team.as_str())
	.bind(record.role.as_str())
	.bind(record.domain.as_str())
	.bind(record.summary.as_str())
	.bind(record.location.as_str())
	.bind(record.start_date)
	.bind(record.end_date)
	.bind(record.is_current)
	.bind(record.search_phrases.as_slice())
	.bind(record.searchable_text())
	.bind(record.updated_at)
	.bind(record.record_id)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn insert_subrecord(
	executor: impl PgExecutor<'_>,
	subrecord: &ExperienceSubRecord,
	doc_text: &str,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO experience_subrecords (
	subrecord_id,
	record_id,
	person_id,
	kind,
	value,
	search_doc,
	embedding_version,
	created_at,
	updated_at
)
VALUES ($1,$2,$3,$4,$5,to_tsvector('english', $6),$7,$8,$9)",
	)
	.bind(subrecord.subrecord_id)
	.bind(subrecord.record_id)
	.bind(subrecord.person_id)
	.bind(subrecord.kind.as_str())
	.bind(&subrecord.value)
	.bind(doc_text)
	.bind(subrecord.embedding_version.as_str())
	.bind(subrecord.created_at)
	.bind(subrecord.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_record(
	executor: impl PgExecutor<'_>,
	record_id: Uuid,
) -> Result<Option<ExperienceRecord>> {
	let record = sqlx::query_as(&format!(
		"SELECT {RECORD_COLUMNS} FROM experience_records WHERE record_id = $1"
	))
	.bind(record_id)
	.fetch_optional(executor)
	.await?;

	Ok(record)
}

pub async fn load_persons(
	executor: impl PgExecutor<'_>,
	person_ids: &[Uuid],
) -> Result<Vec<PersonProfile>> {
	if person_ids.is_empty() {
		return Ok(Vec::new());
	}

	let persons = sqlx::query_as(&format!(
		"SELECT {PERSON_COLUMNS} FROM person_profiles WHERE person_id = ANY($1)"
	))
	.bind(person_ids)
	.fetch_all(executor)
	.await?;

	Ok(persons)
}

pub async fn load_records(
	executor: impl PgExecutor<'_>,
	record_ids: &[Uuid],
) -> Result<Vec<ExperienceRecord>> {
	if record_ids.is_empty() {
		return Ok(Vec::new());
	}

	let records = sqlx::query_as(&format!(
		"SELECT {RECORD_COLUMNS} FROM experience_records WHERE record_id = ANY($1)"
	))
	.bind(record_ids)
	.fetch_all(executor)
	.await?;

	Ok(records)
}

pub async fn load_subrecords(
	executor: impl PgExecutor<'_>,
	subrecord_ids: &[Uuid],
) -> Result<Vec<ExperienceSubRecord>> {
	if subrecord_ids.is_empty() {
		return Ok(Vec::new());
	}

	let subrecords = sqlx::query_as(&format!(
		"SELECT {SUBRECORD_COLUMNS} FROM experience_subrecords WHERE subrecord_id = ANY($1)"
	))
	.bind(subrecord_ids)
	.fetch_all(executor)
	.await?;

	Ok(subrecords)
}

pub async fn load_subrecords_for_records(
	executor: impl PgExecutor<'_>,
	record_ids: &[Uuid],
) -> Result<Vec<ExperienceSubRecord>> {
	if record_ids.is_empty() {
		return Ok(Vec::new());
	}

	let subrecords = sqlx::query_as(&format!(
		"SELECT {SUBRECORD_COLUMNS} FROM experience_subrecords WHERE record_id = ANY($1)"
	))
	.bind(record_ids)
	.fetch_all(executor)
	.await?;

	Ok(subrecords)
}

/// Most recent visible parent records per person, newest first, bounded per
/// person. Backfill for child-only matches whose evidence lookup came up
/// empty.
pub async fn recent_visible_records(
	executor: impl PgExecutor<'_>,
	person_ids: &[Uuid],
	per_person: i64,
) -> Result<Vec<ExperienceRecord>> {
	if person_ids.is_empty() {
		return Ok(Vec::new());
	}

	let records = sqlx::query_as(&format!(
		"\
SELECT {RECORD_COLUMNS}
FROM (
	SELECT *, row_number() OVER (
		PARTITION BY person_id
		ORDER BY start_date DESC NULLS LAST, updated_at DESC
	) AS recency_rank
	FROM experience_records
	WHERE person_id = ANY($1) AND visible
) ranked
WHERE recency_rank <= $2"
	))
	.bind(person_ids)
	.bind(per_person)
	.fetch_all(executor)
	.await?;

	Ok(records)
}

pub async fn upsert_record_embedding(
	executor: impl PgExecutor<'_>,
	record_id: Uuid,
	embedding_version: &str,
	vec_text: &str,
	dim: i32,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO record_embeddings (record_id, embedding_version, embedding_dim, vec)
VALUES ($1, $2, $3, $4::text::vector)
ON CONFLICT (record_id, embedding_version)
DO UPDATE SET vec = EXCLUDED.vec, embedding_dim = EXCLUDED.embedding_dim",
	)
	.bind(record_id)
	.bind(embedding_version)
	.bind(dim)
	.bind(vec_text)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn upsert_subrecord_embedding(
	executor: impl PgExecutor<'_>,
	subrecord_id: Uuid,
	embedding_version: &str,
	vec_text: &str,
	dim: i32,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO subrecord_embeddings (subrecord_id, embedding_version, embedding_dim, vec)
VALUES ($1, $2, $3, $4::text::vector)
ON CONFLICT (subrecord_id, embedding_version)
DO UPDATE SET vec = EXCLUDED.vec, embedding_dim = EXCLUDED.embedding_dim",
	)
	.bind(subrecord_id)
	.bind(embedding_version)
	.bind(dim)
	.bind(vec_text)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn insert_search_request(
	executor: impl PgExecutor<'_>,
	request: &SearchRequestRow,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO search_requests (
	search_id,
	searcher_id,
	query,
	constraints,
	fallback_tier,
	num_cards,
	revealed_count,
	created_at,
	expires_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
	)
	.bind(request.search_id)
	.bind(request.searcher_id)
	.bind(request.query.as_str())
	.bind(&request.constraints)
	.bind(request.fallback_tier)
	.bind(request.num_cards)
	.bind(request.revealed_count)
	.bind(request.created_at)
	.bind(request.expires_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn insert_search_result(
	executor: impl PgExecutor<'_>,
	result: &SearchResultRow,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO search_results (
	search_id,
	rank,
	person_id,
	score,
	evidence,
	reasons,
	explanation_source,
	created_at,
	updated_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
	)
	.bind(result.search_id)
	.bind(result.rank)
	.bind(result.person_id)
	.bind(result.score)
	.bind(&result.evidence)
	.bind(&result.reasons)
	.bind(result.explanation_source.as_str())
	.bind(result.created_at)
	.bind(result.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_search_request(
	executor: impl PgExecutor<'_>,
	search_id: Uuid,
) -> Result<Option<SearchRequestRow>> {
	let request = sqlx::query_as(
		"\
SELECT search_id, searcher_id, query, constraints, fallback_tier, num_cards, revealed_count, \
created_at, expires_at
FROM search_requests
WHERE search_id = $1",
	)
	.bind(search_id)
	.fetch_optional(executor)
	.await?;

	Ok(request)
}

pub async fn load_results_page(
	executor: impl PgExecutor<'_>,
	search_id: Uuid,
	offset: i64,
	limit: i64,
) -> Result<Vec<SearchResultRow>> {
	let rows = sqlx::query_as(
		"\
SELECT search_id, rank, person_id, score, evidence, reasons, explanation_source, created_at, \
updated_at
FROM search_results
WHERE search_id = $1
ORDER BY rank
OFFSET $2
LIMIT $3",
	)
	.bind(search_id)
	.bind(offset)
	.bind(limit)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn load_results_for_search(
	executor: impl PgExecutor<'_>,
	search_id: Uuid,
) -> Result<Vec<SearchResultRow>> {
	let rows = sqlx::query_as(
		"\
SELECT search_id, rank, person_id, score, evidence, reasons, explanation_source, created_at, \
updated_at
FROM search_results
WHERE search_id = $1
ORDER BY rank",
	)
	.bind(search_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn count_results(executor: impl PgExecutor<'_>, search_id: Uuid) -> Result<i64> {
	let count: i64 =
		sqlx::query_scalar("SELECT COUNT(*) FROM search_results WHERE search_id = $1")
			.bind(search_id)
			.fetch_one(executor)
			.await?;

	Ok(count)
}

pub async fn set_revealed_count(
	executor: impl PgExecutor<'_>,
	search_id: Uuid,
	revealed_count: i32,
) -> Result<()> {
	sqlx::query("UPDATE search_requests SET revealed_count = $1 WHERE search_id = $2")
		.bind(revealed_count)
		.bind(search_id)
		.execute(executor)
		.await?;

	Ok(())
}

/// Patch explanation text in place. Only the reasons and source marker ever
/// change on a persisted snapshot row.
pub async fn patch_result_reasons(
	executor: impl PgExecutor<'_>,
	search_id: Uuid,
	person_id: Uuid,
	reasons: &serde_json::Value,
	source: &str,
	now: time::OffsetDateTime,
) -> Result<u64> {
	let result = sqlx::query(
		"\
UPDATE search_results
SET reasons = $1, explanation_source = $2, updated_at = $3
WHERE search_id = $4 AND person_id = $5",
	)
	.bind(reasons)
	.bind(source)
	.bind(now)
	.bind(search_id)
	.bind(person_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}
