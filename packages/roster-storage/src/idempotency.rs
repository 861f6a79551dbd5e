use serde_json::Value;
use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::Result;

const STATUS_IN_PROGRESS: &str = "IN_PROGRESS";
const STATUS_DONE: &str = "DONE";

/// Outcome of trying to take ownership of (key, person, endpoint).
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
	/// This caller owns the key and must run the side-effecting execution.
	Claimed,
	/// A concurrent execution holds the key and has not committed yet.
	InProgress,
	/// A prior execution committed; replay the stored response verbatim.
	Replay(Value),
}

/// Claim a key before doing anything billable. The primary key on
/// (idempotency_key, person_id, endpoint) is the serializing lock: exactly
/// one concurrent caller sees a row inserted.
pub async fn claim(
	executor: impl PgExecutor<'_>,
	key: &str,
	person_id: Uuid,
	endpoint: &str,
	now: OffsetDateTime,
) -> Result<ClaimOutcome> {
	let inserted = sqlx::query(
		"\
INSERT INTO idempotency_keys (idempotency_key, person_id, endpoint, status, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $5)
ON CONFLICT (idempotency_key, person_id, endpoint) DO NOTHING",
	)
	.bind(key)
	.bind(person_id)
	.bind(endpoint)
	.bind(STATUS_IN_PROGRESS)
	.bind(now)
	.execute(executor)
	.await?;

	if inserted.rows_affected() == 1 {
		return Ok(ClaimOutcome::Claimed);
	}

	Ok(ClaimOutcome::InProgress)
}

/// Re-read a contested key: a committed winner yields its stored response.
pub async fn fetch(
	executor: impl PgExecutor<'_>,
	key: &str,
	person_id: Uuid,
	endpoint: &str,
) -> Result<Option<ClaimOutcome>> {
	let row: Option<(String, Option<Value>)> = sqlx::query_as(
		"\
SELECT status, response
FROM idempotency_keys
WHERE idempotency_key = $1 AND person_id = $2 AND endpoint = $3",
	)
	.bind(key)
	.bind(person_id)
	.bind(endpoint)
	.fetch_optional(executor)
	.await?;

	let outcome = row.map(|(status, response)| match (status.as_str(), response) {
		(STATUS_DONE, Some(response)) => ClaimOutcome::Replay(response),
		_ => ClaimOutcome::InProgress,
	});

	Ok(outcome)
}

/// Store the successful response. Runs inside the same transaction as the
/// side effects it records.
pub async fn complete(
	executor: impl PgExecutor<'_>,
	key: &str,
	person_id: Uuid,
	endpoint: &str,
	response: &Value,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE idempotency_keys
SET status = $4, response = $5, updated_at = $6
WHERE idempotency_key = $1 AND person_id = $2 AND endpoint = $3",
	)
	.bind(key)
	.bind(person_id)
	.bind(endpoint)
	.bind(STATUS_DONE)
	.bind(response)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

/// Release a claim after a failed execution so a retry can run.
pub async fn release(
	executor: impl PgExecutor<'_>,
	key: &str,
	person_id: Uuid,
	endpoint: &str,
) -> Result<()> {
	sqlx::query(
		"\
DELETE FROM idempotency_keys
WHERE idempotency_key = $1 AND person_id = $2 AND endpoint = $3 AND status = $4",
	)
	.bind(key)
	.bind(person_id)
	.bind(endpoint)
	.bind(STATUS_IN_PROGRESS)
	.execute(executor)
	.await?;

	Ok(())
}
