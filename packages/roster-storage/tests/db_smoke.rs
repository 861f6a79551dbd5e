use time::OffsetDateTime;
use uuid::Uuid;

use roster_config::Postgres;
use roster_storage::{credits, db::Db, models::PersonProfile, queries};
use roster_testkit::TestDatabase;

fn person(balance: i64) -> PersonProfile {
	let now = OffsetDateTime::now_utc();

	PersonProfile {
		person_id: Uuid::new_v4(),
		display_name: "Test Person".to_string(),
		headline: String::new(),
		bio: String::new(),
		open_to_work: true,
		open_to_contact: false,
		preferred_locations: Vec::new(),
		preferred_salary_min: None,
		preferred_salary_max: None,
		credit_balance: balance,
		created_at: now,
		updated_at: now,
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROSTER_PG_DSN to run."]
async fn db_connects_and_bootstraps() {
	let Some(base_dsn) = roster_testkit::env_dsn() else {
		eprintln!("Skipping db_connects_and_bootstraps; set ROSTER_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 1 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(8).await.expect("Failed to ensure schema.");

	for table in ["person_profiles", "experience_records", "search_results", "credit_ledger"] {
		let count: i64 = sqlx::query_scalar(
			"SELECT count(*) FROM information_schema.tables WHERE table_name = $1",
		)
		.bind(table)
		.fetch_one(&db.pool)
		.await
		.expect("Failed to query schema tables.");

		assert_eq!(count, 1, "missing table {table}");
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROSTER_PG_DSN to run."]
async fn ledger_tracks_balance_through_debits_and_credits() {
	let Some(base_dsn) = roster_testkit::env_dsn() else {
		eprintln!(
			"Skipping ledger_tracks_balance_through_debits_and_credits; set ROSTER_PG_DSN to run."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(8).await.expect("Failed to ensure schema.");

	let profile = person(0);
	let now = OffsetDateTime::now_utc();

	queries::insert_person(&db.pool, &profile).await.expect("Failed to insert person.");

	let mut tx = db.pool.begin().await.expect("Failed to begin transaction.");

	credits::credit(&mut tx, profile.person_id, 10, "topup", None, now)
		.await
		.expect("Failed to credit.");

	let after_debit = credits::debit(&mut tx, profile.person_id, 4, "search", None, now)
		.await
		.expect("Failed to debit.");

	assert_eq!(after_debit, Some(6));

	// Insufficient balance must refuse without touching the ledger.
	let refused = credits::debit(&mut tx, profile.person_id, 100, "search", None, now)
		.await
		.expect("Debit call failed.");

	assert_eq!(refused, None);

	tx.commit().await.expect("Failed to commit.");

	let balance =
		credits::balance(&db.pool, profile.person_id).await.expect("Failed to read balance.");
	let ledger_sum =
		credits::ledger_sum(&db.pool, profile.person_id).await.expect("Failed to sum ledger.");

	assert_eq!(balance, 6);
	assert_eq!(ledger_sum, balance);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROSTER_PG_DSN to run."]
async fn idempotency_claim_admits_exactly_one_caller() {
	let Some(base_dsn) = roster_testkit::env_dsn() else {
		eprintln!(
			"Skipping idempotency_claim_admits_exactly_one_caller; set ROSTER_PG_DSN to run."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(8).await.expect("Failed to ensure schema.");

	let person_id = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();
	let first = roster_storage::idempotency::claim(&db.pool, "k1", person_id, "search", now)
		.await
		.expect("Failed to claim.");
	let second = roster_storage::idempotency::claim(&db.pool, "k1", person_id, "search", now)
		.await
		.expect("Failed to claim.");

	assert!(matches!(first, roster_storage::idempotency::ClaimOutcome::Claimed));
	assert!(matches!(second, roster_storage::idempotency::ClaimOutcome::InProgress));

	roster_storage::idempotency::complete(
		&db.pool,
		"k1",
		person_id,
		"search",
		&serde_json::json!({ "search_id": "stored" }),
		now,
	)
	.await
	.expect("Failed to complete.");

	let replayed = roster_storage::idempotency::fetch(&db.pool, "k1", person_id, "search")
		.await
		.expect("Failed to fetch.")
		.expect("Expected stored outcome.");

	match replayed {
		roster_storage::idempotency::ClaimOutcome::Replay(response) => {
			assert_eq!(response["search_id"], "stored");
		},
		other => panic!("Expected replay, got {other:?}"),
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
