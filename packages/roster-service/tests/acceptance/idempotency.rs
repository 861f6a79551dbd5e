use roster_service::{SearchRequest, ServiceError};
use roster_storage::credits;

use super::{SeedPerson, SeedRecord};

fn search_request(searcher_id: uuid::Uuid, key: &str) -> SearchRequest {
	SearchRequest {
		searcher_id,
		query: "rust engineer".to_string(),
		open_to_work_only: None,
		preferred_locations: None,
		salary_min: None,
		salary_max: None,
		num_cards: Some(2),
		idempotency_key: Some(key.to_string()),
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROSTER_PG_DSN to run."]
async fn concurrent_duplicate_searches_bill_exactly_once() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping concurrent_duplicate_searches_bill_exactly_once; set ROSTER_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let (providers, _) = super::stub_providers(super::unconstrained_payload());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let searcher =
		super::seed_person(&service, SeedPerson { balance: 50, ..SeedPerson::default() }).await;

	for name in ["Rust Person A", "Rust Person B"] {
		let person = super::seed_person(&service, SeedPerson { name, ..SeedPerson::default() }).await;

		super::seed_record(
			&service,
			person,
			SeedRecord {
				title: "Rust Engineer",
				summary: "Wrote rust services",
				..SeedRecord::default()
			},
		)
		.await;
	}

	let request = search_request(searcher, "dup-key");
	let (first, second) =
		tokio::join!(service.search(request.clone()), service.search(request.clone()));

	let mut search_ids = Vec::new();
	for outcome in [first, second] {
		match outcome {
			Ok(response) => search_ids.push(response.search_id),
			Err(ServiceError::InProgress) => {},
			Err(other) => panic!("Unexpected error: {other}"),
		}
	}

	assert!(!search_ids.is_empty(), "At least one caller must win.");

	// Exactly one side-effecting execution: one debit, cost of one request.
	let entries =
		credits::ledger_entries(&service.db.pool, searcher).await.expect("Failed to read ledger.");
	let debits: Vec<_> = entries.iter().filter(|entry| entry.amount < 0).collect();

	assert_eq!(debits.len(), 1);
	assert_eq!(debits[0].amount, -2);

	let balance =
		credits::balance(&service.db.pool, searcher).await.expect("Failed to read balance.");

	assert_eq!(balance, 48);

	// Both callers eventually observe the same search id via replay.
	let replayed =
		service.search(search_request(searcher, "dup-key")).await.expect("Replay failed.");

	for id in &search_ids {
		assert_eq!(*id, replayed.search_id);
	}

	let final_balance =
		credits::balance(&service.db.pool, searcher).await.expect("Failed to read balance.");

	assert_eq!(final_balance, 48, "Replay must not bill again.");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROSTER_PG_DSN to run."]
async fn failed_execution_releases_the_key_for_retry() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping failed_execution_releases_the_key_for_retry; set ROSTER_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let (providers, _) = super::stub_providers(super::unconstrained_payload());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	// Broke: cannot afford the default card count.
	let searcher =
		super::seed_person(&service, SeedPerson { balance: 1, ..SeedPerson::default() }).await;
	let person = super::seed_person(&service, SeedPerson::default()).await;

	super::seed_record(&service, person, SeedRecord::default()).await;

	let mut request = search_request(searcher, "retry-key");

	request.num_cards = Some(5);

	let refused = service.search(request.clone()).await;

	assert!(matches!(refused, Err(ServiceError::InsufficientCredits { .. })));

	// Top up through the ledger, then the same key must work.
	let mut tx = service.db.pool.begin().await.expect("Failed to begin transaction.");

	credits::credit(&mut tx, searcher, 10, "topup", None, time::OffsetDateTime::now_utc())
		.await
		.expect("Failed to credit.");
	tx.commit().await.expect("Failed to commit.");

	let retried = service.search(request).await.expect("Retry after topup failed.");

	assert!(!retried.people.is_empty());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
