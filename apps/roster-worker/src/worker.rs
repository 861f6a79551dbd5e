use std::time::Duration as StdDuration;

use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;
use uuid::Uuid;

use crate::{Error, Result};
use roster_domain::{explanation, subrecord::SubRecordValue};
use roster_providers::{embedding, explainer};
use roster_storage::{
	db::Db,
	models::{EmbeddingOutboxEntry, ExperienceSubRecord, ExplanationOutboxEntry, SearchResultRow},
	outbox, queries, vector_to_pg,
};

const POLL_INTERVAL_MS: i64 = 500;
const CLAIM_BATCH: i64 = 8;
const CLAIM_LEASE_SECONDS: i64 = 30;
const BASE_BACKOFF_MS: i64 = 500;
const MAX_BACKOFF_MS: i64 = 30_000;
const MAX_ATTEMPTS: i32 = 8;
const SNAPSHOT_READ_RETRIES: u32 = 3;
const SNAPSHOT_READ_DELAY_MS: u64 = 200;
const MAX_OUTBOX_ERROR_CHARS: usize = 1_024;

pub struct WorkerState {
	pub db: Db,
	pub cfg: roster_config::Config,
}

pub async fn run_worker(state: WorkerState) -> color_eyre::Result<()> {
	loop {
		if let Err(err) = process_explanation_outbox_once(&state).await {
			tracing::error!(error = %err, "Explanation outbox processing failed.");
		}
		if let Err(err) = process_embedding_outbox_once(&state).await {
			tracing::error!(error = %err, "Embedding outbox processing failed.");
		}

		tokio_time::sleep(to_std_duration(Duration::milliseconds(POLL_INTERVAL_MS))).await;
	}
}

pub async fn process_explanation_outbox_once(state: &WorkerState) -> Result<()> {
	let now = OffsetDateTime::now_utc();
	let jobs = outbox::claim_explanation_jobs(
		&state.db.pool,
		CLAIM_BATCH,
		Duration::seconds(CLAIM_LEASE_SECONDS),
		now,
	)
	.await?;

	for job in jobs {
		match handle_explanation_job(state, &job).await {
			Ok(patched) => {
				outbox::mark_explanation_done(
					&state.db.pool,
					job.outbox_id,
					OffsetDateTime::now_utc(),
				)
				.await?;
				tracing::info!(search_id = %job.search_id, patched, "Explanations refined.");
			},
			Err(err) => {
				// Refinement is strictly best-effort: park the job after the
				// attempt budget and leave the deterministic reasons standing.
				fail_job(state, FailedJob::Explanation(&job), &err).await?;
			},
		}
	}

	Ok(())
}

pub async fn process_embedding_outbox_once(state: &WorkerState) -> Result<()> {
	let now = OffsetDateTime::now_utc();
	let jobs = outbox::claim_embedding_jobs(
		&state.db.pool,
		CLAIM_BATCH,
		Duration::seconds(CLAIM_LEASE_SECONDS),
		now,
	)
	.await?;

	for job in jobs {
		match handle_embedding_job(state, &job).await {
			Ok(()) => {
				outbox::mark_embedding_done(
					&state.db.pool,
					job.outbox_id,
					OffsetDateTime::now_utc(),
				)
				.await?;
				tracing::info!(record_id = %job.record_id, "Record re-embedded.");
			},
			Err(err) => {
				fail_job(state, FailedJob::Embedding(&job), &err).await?;
			},
		}
	}

	Ok(())
}

async fn handle_explanation_job(
	state: &WorkerState,
	job: &ExplanationOutboxEntry,
) -> Result<u64> {
	let Some(request) = queries::get_search_request(&state.db.pool, job.search_id).await? else {
		return Err(Error::Message(format!("Search {} does not exist.", job.search_id)));
	};
	let rows = read_snapshot_with_retry(state, job.search_id).await?;

	// A zero-result search has nothing to refine.
	if rows.is_empty() {
		return Ok(0);
	}

	let payload = build_refine_payload(&rows);
	let refined =
		explainer::refine(&state.cfg.providers.explainer, &request.query, &payload)
			.await
			.map_err(|err| Error::Message(format!("Explainer call failed: {err}.")))?;
	let now = OffsetDateTime::now_utc();
	let mut patched = 0;

	for person in refined {
		let Ok(person_id) = Uuid::parse_str(&person.person_id) else {
			continue;
		};
		// Server-provided reasons only replace the deterministic fallback
		// when every line survives validation.
		let Some(reasons) =
			explanation::sanitize_refined_reasons(person.reasons, &state.cfg.explanation)
		else {
			continue;
		};
		let reasons_json = serde_json::to_value(&reasons)?;

		patched += queries::patch_result_reasons(
			&state.db.pool,
			job.search_id,
			person_id,
			&reasons_json,
			"refined",
			now,
		)
		.await?;
	}

	Ok(patched)
}

/// The persisting transaction may not be visible yet right after claiming a
/// fresh job; poll briefly before treating the snapshot as empty.
async fn read_snapshot_with_retry(
	state: &WorkerState,
	search_id: Uuid,
) -> Result<Vec<SearchResultRow>> {
	let mut rows = Vec::new();

	for attempt in 0..SNAPSHOT_READ_RETRIES {
		rows = queries::load_results_for_search(&state.db.pool, search_id).await?;

		if !rows.is_empty() {
			break;
		}
		if attempt + 1 < SNAPSHOT_READ_RETRIES {
			tokio_time::sleep(StdDuration::from_millis(SNAPSHOT_READ_DELAY_MS)).await;
		}
	}

	Ok(rows)
}

fn build_refine_payload(rows: &[SearchResultRow]) -> Value {
	let people: Vec<Value> = rows
		.iter()
		.map(|row| {
			serde_json::json!({
				"person_id": row.person_id,
				"snippets": row.evidence.get("snippets").cloned().unwrap_or(Value::Array(Vec::new())),
				"skill_overlap": row.evidence.get("skill_overlap").cloned().unwrap_or(Value::Array(Vec::new())),
				"company_match": row.evidence.get("company_match").cloned().unwrap_or(Value::Null),
				"location_match": row.evidence.get("location_match").cloned().unwrap_or(Value::Null),
				"time_match": row.evidence.get("time_match").cloned().unwrap_or(Value::Null),
			})
		})
		.collect();

	Value::Array(people)
}

async fn handle_embedding_job(state: &WorkerState, job: &EmbeddingOutboxEntry) -> Result<()> {
	let Some(record) = queries::get_record(&state.db.pool, job.record_id).await? else {
		tracing::info!(record_id = %job.record_id, "Record gone; skipping re-embed.");

		return Ok(());
	};
	let subrecords =
		queries::load_subrecords_for_records(&state.db.pool, &[job.record_id]).await?;
	let mut texts = vec![record.searchable_text()];

	for subrecord in &subrecords {
		texts.push(subrecord_text(subrecord));
	}

	let vectors = embedding::embed(&state.cfg.providers.embedding, &texts)
		.await
		.map_err(|err| Error::Message(format!("Embedding call failed: {err}.")))?;

	if vectors.len() != texts.len() {
		return Err(Error::Message("Embedding provider returned a short batch.".to_string()));
	}

	let dim = state.cfg.storage.vector_dim as usize;

	for vec in &vectors {
		if vec.len() != dim {
			return Err(Error::Message(format!(
				"Embedding dimension {} does not match configured vector_dim {dim}.",
				vec.len()
			)));
		}
	}

	let mut tx = state.db.pool.begin().await?;

	queries::upsert_record_embedding(
		&mut *tx,
		record.record_id,
		&job.embedding_version,
		&vector_to_pg(&vectors[0]),
		dim as i32,
	)
	.await?;
	sqlx::query("UPDATE experience_records SET embedding_version = $1 WHERE record_id = $2")
		.bind(job.embedding_version.as_str())
		.bind(record.record_id)
		.execute(&mut *tx)
		.await?;

	for (subrecord, vec) in subrecords.iter().zip(vectors.iter().skip(1)) {
		queries::upsert_subrecord_embedding(
			&mut *tx,
			subrecord.subrecord_id,
			&job.embedding_version,
			&vector_to_pg(vec),
			dim as i32,
		)
		.await?;
		sqlx::query(
			"UPDATE experience_subrecords SET embedding_version = $1 WHERE subrecord_id = $2",
		)
		.bind(job.embedding_version.as_str())
		.bind(subrecord.subrecord_id)
		.execute(&mut *tx)
		.await?;
	}

	tx.commit().await?;

	Ok(())
}

fn subrecord_text(subrecord: &ExperienceSubRecord) -> String {
	let value = SubRecordValue::parse(&subrecord.value);
	let mut lines = vec![subrecord.kind.clone()];

	lines.extend(value.display_lines());

	lines.join("\n")
}

enum FailedJob<'a> {
	Explanation(&'a ExplanationOutboxEntry),
	Embedding(&'a EmbeddingOutboxEntry),
}

async fn fail_job(state: &WorkerState, job: FailedJob<'_>, err: &Error) -> Result<()> {
	let now = OffsetDateTime::now_utc();
	let sanitized = sanitize_outbox_error(&err.to_string());

	match job {
		FailedJob::Explanation(entry) => {
			let retry_at = retry_time(entry.attempts, now);

			tracing::warn!(
				outbox_id = %entry.outbox_id,
				attempts = entry.attempts,
				error = %sanitized,
				"Explanation job failed."
			);
			outbox::mark_explanation_failed(
				&state.db.pool,
				entry.outbox_id,
				&sanitized,
				retry_at,
				now,
			)
			.await?;
		},
		FailedJob::Embedding(entry) => {
			let retry_at = retry_time(entry.attempts, now);

			tracing::warn!(
				outbox_id = %entry.outbox_id,
				attempts = entry.attempts,
				error = %sanitized,
				"Embedding job failed."
			);
			outbox::mark_embedding_failed(
				&state.db.pool,
				entry.outbox_id,
				&sanitized,
				retry_at,
				now,
			)
			.await?;
		},
	}

	Ok(())
}

fn retry_time(attempts: i32, now: OffsetDateTime) -> Option<OffsetDateTime> {
	if attempts >= MAX_ATTEMPTS {
		return None;
	}

	Some(now + backoff_for_attempt(attempts))
}

fn backoff_for_attempt(attempt: i32) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(6);
	let base = BASE_BACKOFF_MS.saturating_mul(1 << exp);
	let capped = base.min(MAX_BACKOFF_MS);

	Duration::milliseconds(capped)
}

fn sanitize_outbox_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = match raw.split(sep).next() {
					Some(prefix) => prefix,
					None => raw,
				};

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_OUTBOX_ERROR_CHARS {
		out = out.chars().take(MAX_OUTBOX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

fn to_std_duration(duration: Duration) -> StdDuration {
	let millis = duration.whole_milliseconds();

	if millis <= 0 {
		return StdDuration::from_millis(0);
	}

	StdDuration::from_millis(millis.min(u64::MAX as i128) as u64)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_grows_and_caps() {
		assert_eq!(backoff_for_attempt(1), Duration::milliseconds(500));
		assert_eq!(backoff_for_attempt(2), Duration::milliseconds(1_000));
		assert_eq!(backoff_for_attempt(20), Duration::milliseconds(30_000));
	}

	#[test]
	fn exhausted_attempts_park_the_job() {
		let now = OffsetDateTime::now_utc();

		assert!(retry_time(1, now).is_some());
		assert!(retry_time(MAX_ATTEMPTS, now).is_none());
	}

	#[test]
	fn sanitizes_secrets_in_errors() {
		let sanitized = sanitize_outbox_error("failed with api_key=sk-123 Bearer sk-456");

		assert!(!sanitized.contains("sk-123"));
		assert!(!sanitized.contains("sk-456"));
		assert!(sanitized.contains("api_key=[REDACTED]"));
	}
}
