use std::sync::Arc;

use roster_service::{Providers, SearchRequest, ServiceError};
use roster_storage::credits;

use super::{FailingEmbedding, SeedPerson, SeedRecord, StubExplainer, StubParser};

fn plain_request(searcher_id: uuid::Uuid, num_cards: u32) -> SearchRequest {
	SearchRequest {
		searcher_id,
		query: "backend engineer".to_string(),
		open_to_work_only: None,
		preferred_locations: None,
		salary_min: None,
		salary_max: None,
		num_cards: Some(num_cards),
		idempotency_key: None,
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROSTER_PG_DSN to run."]
async fn insufficient_balance_rejects_without_partial_charge() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping insufficient_balance_rejects_without_partial_charge; set ROSTER_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let (providers, _) = super::stub_providers(super::unconstrained_payload());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let searcher =
		super::seed_person(&service, SeedPerson { balance: 3, ..SeedPerson::default() }).await;

	for name in ["P1", "P2", "P3", "P4", "P5"] {
		let person = super::seed_person(&service, SeedPerson { name, ..SeedPerson::default() }).await;

		super::seed_record(
			&service,
			person,
			SeedRecord { title: "Backend Engineer", ..SeedRecord::default() },
		)
		.await;
	}

	let err = service
		.search(plain_request(searcher, 5))
		.await
		.expect_err("Search must fail on a short balance.");

	match err {
		ServiceError::InsufficientCredits { required, balance } => {
			assert_eq!(required, 5);
			assert_eq!(balance, 3);
		},
		other => panic!("Expected InsufficientCredits, got {other}"),
	}

	let balance =
		credits::balance(&service.db.pool, searcher).await.expect("Failed to read balance.");

	assert_eq!(balance, 3, "No partial charge on refusal.");

	let searches: i64 =
		sqlx::query_scalar("SELECT COUNT(*) FROM search_requests WHERE searcher_id = $1")
			.bind(searcher)
			.fetch_one(&service.db.pool)
			.await
			.expect("Failed to count searches.");

	assert_eq!(searches, 0, "A refused search leaves no snapshot.");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROSTER_PG_DSN to run."]
async fn empty_result_set_is_valid_and_free() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping empty_result_set_is_valid_and_free; set ROSTER_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let (providers, _) = super::stub_providers(super::unconstrained_payload());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let searcher =
		super::seed_person(&service, SeedPerson { balance: 10, ..SeedPerson::default() }).await;

	// Nobody else in the corpus: zero cards, zero charge, terminal tier.
	let response = service.search(plain_request(searcher, 4)).await.expect("Search failed.");

	assert!(response.people.is_empty());
	assert_eq!(
		response.fallback_tier,
		roster_domain::fallback::FallbackTier::CompanySoft
	);

	let balance =
		credits::balance(&service.db.pool, searcher).await.expect("Failed to read balance.");

	assert_eq!(balance, 10);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROSTER_PG_DSN to run."]
async fn embedding_outage_aborts_search_with_no_charge() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping embedding_outage_aborts_search_with_no_charge; set ROSTER_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let providers = Providers::new(
		Arc::new(FailingEmbedding),
		Arc::new(StubParser { payload: super::unconstrained_payload() }),
		Arc::new(StubExplainer),
	);
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let searcher =
		super::seed_person(&service, SeedPerson { balance: 10, ..SeedPerson::default() }).await;
	let err = service
		.search(plain_request(searcher, 2))
		.await
		.expect_err("Search must abort without embeddings.");

	assert!(matches!(err, ServiceError::EmbeddingUnavailable { .. }));
	assert!(err.is_retryable());

	let balance =
		credits::balance(&service.db.pool, searcher).await.expect("Failed to read balance.");

	assert_eq!(balance, 10);

	let searches: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_requests")
		.fetch_one(&service.db.pool)
		.await
		.expect("Failed to count searches.");

	assert_eq!(searches, 0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROSTER_PG_DSN to run."]
async fn ledger_sum_equals_balance_at_every_step() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping ledger_sum_equals_balance_at_every_step; set ROSTER_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let (providers, _) = super::stub_providers(super::unconstrained_payload());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	// Fund through the ledger so conservation holds from a zero start.
	let searcher =
		super::seed_person(&service, SeedPerson { balance: 0, ..SeedPerson::default() }).await;
	let mut tx = service.db.pool.begin().await.expect("Failed to begin transaction.");

	credits::credit(&mut tx, searcher, 20, "topup", None, time::OffsetDateTime::now_utc())
		.await
		.expect("Failed to credit.");
	tx.commit().await.expect("Failed to commit.");

	for name in ["C1", "C2", "C3"] {
		let person = super::seed_person(&service, SeedPerson { name, ..SeedPerson::default() }).await;

		super::seed_record(
			&service,
			person,
			SeedRecord { title: "Backend Engineer", ..SeedRecord::default() },
		)
		.await;
	}

	let assert_conserved = |label: &'static str, balance: i64, ledger: i64| {
		assert_eq!(balance, ledger, "Conservation violated after {label}.");
	};

	let balance = credits::balance(&service.db.pool, searcher).await.expect("balance");
	let ledger = credits::ledger_sum(&service.db.pool, searcher).await.expect("ledger");

	assert_conserved("topup", balance, ledger);

	let response = service.search(plain_request(searcher, 2)).await.expect("Search failed.");

	let balance = credits::balance(&service.db.pool, searcher).await.expect("balance");
	let ledger = credits::ledger_sum(&service.db.pool, searcher).await.expect("ledger");

	assert_conserved("search", balance, ledger);
	assert_eq!(balance, 18);

	let _ = service
		.load_more(roster_service::LoadMoreRequest {
			searcher_id: searcher,
			search_id: response.search_id,
			offset: 2,
			limit: Some(2),
			history: false,
		})
		.await
		.expect("Load more failed.");

	let balance = credits::balance(&service.db.pool, searcher).await.expect("balance");
	let ledger = credits::ledger_sum(&service.db.pool, searcher).await.expect("ledger");

	assert_conserved("load_more", balance, ledger);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
