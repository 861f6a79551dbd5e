use sqlx::PgExecutor;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
	Result,
	models::{EmbeddingOutboxEntry, ExplanationOutboxEntry},
};

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_PROCESSING: &str = "PROCESSING";
pub const STATUS_DONE: &str = "DONE";
pub const STATUS_FAILED: &str = "FAILED";

pub async fn enqueue_explanation(
	executor: impl PgExecutor<'_>,
	search_id: Uuid,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO explanation_outbox (outbox_id, search_id, status, available_at, created_at, updated_at)
VALUES ($1, $2, 'PENDING', $3, $3, $3)",
	)
	.bind(Uuid::new_v4())
	.bind(search_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn enqueue_embedding(
	executor: impl PgExecutor<'_>,
	record_id: Uuid,
	op: &str,
	embedding_version: &str,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO embedding_outbox (
	outbox_id,
	record_id,
	op,
	embedding_version,
	status,
	available_at,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, 'PENDING', $5, $5, $5)",
	)
	.bind(Uuid::new_v4())
	.bind(record_id)
	.bind(op)
	.bind(embedding_version)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

/// Claim due explanation jobs under a lease. SKIP LOCKED keeps concurrent
/// workers off the same rows; the lease keeps a crashed worker from parking a
/// job forever.
pub async fn claim_explanation_jobs(
	executor: impl PgExecutor<'_>,
	limit: i64,
	lease: Duration,
	now: OffsetDateTime,
) -> Result<Vec<ExplanationOutboxEntry>> {
	let entries = sqlx::query_as(
		"\
UPDATE explanation_outbox
SET status = 'PROCESSING', attempts = attempts + 1, available_at = $3, updated_at = $2
WHERE outbox_id IN (
	SELECT outbox_id
	FROM explanation_outbox
	WHERE status IN ('PENDING', 'PROCESSING') AND available_at <= $2
	ORDER BY available_at
	LIMIT $1
	FOR UPDATE SKIP LOCKED
)
RETURNING outbox_id, search_id, status, attempts, last_error, available_at, created_at, updated_at",
	)
	.bind(limit)
	.bind(now)
	.bind(now + lease)
	.fetch_all(executor)
	.await?;

	Ok(entries)
}

pub async fn claim_embedding_jobs(
	executor: impl PgExecutor<'_>,
	limit: i64,
	lease: Duration,
	now: OffsetDateTime,
) -> Result<Vec<EmbeddingOutboxEntry>> {
	let entries = sqlx::query_as(
		"\
UPDATE embedding_outbox
SET status = 'PROCESSING', attempts = attempts + 1, available_at = $3, updated_at = $2
WHERE outbox_id IN (
	SELECT outbox_id
	FROM embedding_outbox
	WHERE status IN ('PENDING', 'PROCESSING') AND available_at <= $2
	ORDER BY available_at
	LIMIT $1
	FOR UPDATE SKIP LOCKED
)
RETURNING outbox_id, record_id, op, embedding_version, status, attempts, last_error, \
available_at, created_at, updated_at",
	)
	.bind(limit)
	.bind(now)
	.bind(now + lease)
	.fetch_all(executor)
	.await?;

	Ok(entries)
}

pub async fn mark_explanation_done(
	executor: impl PgExecutor<'_>,
	outbox_id: Uuid,
	now: OffsetDateTime,
) -> Result<()> {
	mark_done(executor, "explanation_outbox", outbox_id, now).await
}

pub async fn mark_embedding_done(
	executor: impl PgExecutor<'_>,
	outbox_id: Uuid,
	now: OffsetDateTime,
) -> Result<()> {
	mark_done(executor, "embedding_outbox", outbox_id, now).await
}

pub async fn mark_explanation_failed(
	executor: impl PgExecutor<'_>,
	outbox_id: Uuid,
	error: &str,
	retry_at: Option<OffsetDateTime>,
	now: OffsetDateTime,
) -> Result<()> {
	mark_failed(executor, "explanation_outbox", outbox_id, error, retry_at, now).await
}

pub async fn mark_embedding_failed(
	executor: impl PgExecutor<'_>,
	outbox_id: Uuid,
	error: &str,
	retry_at: Option<OffsetDateTime>,
	now: OffsetDateTime,
) -> Result<()> {
	mark_failed(executor, "embedding_outbox", outbox_id, error, retry_at, now).await
}

async fn mark_done(
	executor: impl PgExecutor<'_>,
	table: &str,
	outbox_id: Uuid,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(&format!(
		"UPDATE {table} SET status = 'DONE', last_error = NULL, updated_at = $2 WHERE outbox_id = $1"
	))
	.bind(outbox_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

/// None for `retry_at` parks the job as FAILED permanently.
async fn mark_failed(
	executor: impl PgExecutor<'_>,
	table: &str,
	outbox_id: Uuid,
	error: &str,
	retry_at: Option<OffsetDateTime>,
	now: OffsetDateTime,
) -> Result<()> {
	match retry_at {
		Some(retry_at) => {
			sqlx::query(&format!(
				"\
UPDATE {table}
SET status = 'PENDING', last_error = $2, available_at = $3, updated_at = $4
WHERE outbox_id = $1"
			))
			.bind(outbox_id)
			.bind(error)
			.bind(retry_at)
			.bind(now)
			.execute(executor)
			.await?;
		},
		None => {
			sqlx::query(&format!(
				"\
UPDATE {table}
SET status = 'FAILED', last_error = $2, updated_at = $3
WHERE outbox_id = $1"
			))
			.bind(outbox_id)
			.bind(error)
			.bind(now)
			.execute(executor)
			.await?;
		},
	}

	Ok(())
}
