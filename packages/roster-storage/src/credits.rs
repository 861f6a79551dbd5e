use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::CreditLedgerEntry};

/// The generic wallet primitive. Every balance change goes through here so
/// the sum of ledger entries always equals the stored balance.
///
/// Returns the resulting balance, or None when the balance cannot cover the
/// amount. The guarded UPDATE and the ledger append share the caller's
/// transaction, so an aborted caller leaves neither.
pub async fn debit(
	tx: &mut Transaction<'_, Postgres>,
	person_id: Uuid,
	amount: i64,
	reason: &str,
	reference: Option<Uuid>,
	now: OffsetDateTime,
) -> Result<Option<i64>> {
	if amount <= 0 {
		return Err(crate::Error::InvalidArgument(
			"Debit amount must be greater than zero.".to_string(),
		));
	}

	let balance_after: Option<i64> = sqlx::query_scalar(
		"\
UPDATE person_profiles
SET credit_balance = credit_balance - $2, updated_at = $3
WHERE person_id = $1 AND credit_balance >= $2
RETURNING credit_balance",
	)
	.bind(person_id)
	.bind(amount)
	.bind(now)
	.fetch_optional(&mut **tx)
	.await?;

	let Some(balance_after) = balance_after else {
		return Ok(None);
	};

	append_entry(tx, person_id, -amount, reason, reference, balance_after, now).await?;

	Ok(Some(balance_after))
}

pub async fn credit(
	tx: &mut Transaction<'_, Postgres>,
	person_id: Uuid,
	amount: i64,
	reason: &str,
	reference: Option<Uuid>,
	now: OffsetDateTime,
) -> Result<i64> {
	if amount <= 0 {
		return Err(crate::Error::InvalidArgument(
			"Credit amount must be greater than zero.".to_string(),
		));
	}

	let balance_after: i64 = sqlx::query_scalar(
		"\
UPDATE person_profiles
SET credit_balance = credit_balance + $2, updated_at = $3
WHERE person_id = $1
RETURNING credit_balance",
	)
	.bind(person_id)
	.bind(amount)
	.bind(now)
	.fetch_optional(&mut **tx)
	.await?
	.ok_or_else(|| crate::Error::NotFound(format!("Unknown person {person_id}.")))?;

	append_entry(tx, person_id, amount, reason, reference, balance_after, now).await?;

	Ok(balance_after)
}

pub async fn balance(executor: impl sqlx::PgExecutor<'_>, person_id: Uuid) -> Result<i64> {
	let balance: i64 =
		sqlx::query_scalar("SELECT credit_balance FROM person_profiles WHERE person_id = $1")
			.bind(person_id)
			.fetch_optional(executor)
			.await?
			.ok_or_else(|| crate::Error::NotFound(format!("Unknown person {person_id}.")))?;

	Ok(balance)
}

/// Sum of all ledger entries for a person. Equals `balance` at all times.
pub async fn ledger_sum(executor: impl sqlx::PgExecutor<'_>, person_id: Uuid) -> Result<i64> {
	let sum: i64 = sqlx::query_scalar(
		"SELECT COALESCE(SUM(amount), 0)::bigint FROM credit_ledger WHERE person_id = $1",
	)
	.bind(person_id)
	.fetch_one(executor)
	.await?;

	Ok(sum)
}

pub async fn ledger_entries(
	executor: impl sqlx::PgExecutor<'_>,
	person_id: Uuid,
) -> Result<Vec<CreditLedgerEntry>> {
	let entries = sqlx::query_as(
		"\
SELECT entry_id, person_id, amount, reason, reference, balance_after, created_at
FROM credit_ledger
WHERE person_id = $1
ORDER BY created_at",
	)
	.bind(person_id)
	.fetch_all(executor)
	.await?;

	Ok(entries)
}

async fn append_entry(
	tx: &mut Transaction<'_, Postgres>,
	person_id: Uuid,
	amount: i64,
	reason: &str,
	reference: Option<Uuid>,
	balance_after: i64,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO credit_ledger (entry_id, person_id, amount, reason, reference, balance_after, created_at)
VALUES ($1,$2,$3,$4,$5,$6,$7)",
	)
	.bind(Uuid::new_v4())
	.bind(person_id)
	.bind(amount)
	.bind(reason)
	.bind(reference)
	.bind(balance_after)
	.bind(now)
	.execute(&mut **tx)
	.await?;

	Ok(())
}
