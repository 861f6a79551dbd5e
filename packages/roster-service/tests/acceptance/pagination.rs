use std::sync::atomic::Ordering;

use roster_service::{LoadMoreRequest, SearchRequest, ServiceError};
use roster_storage::credits;

use super::{SeedPerson, SeedRecord};

fn search_request(searcher_id: uuid::Uuid, num_cards: u32) -> SearchRequest {
	SearchRequest {
		searcher_id,
		query: "data engineer".to_string(),
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
async fn pages_serve_from_the_snapshot_in_rank_order() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping pages_serve_from_the_snapshot_in_rank_order; set ROSTER_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let (providers, embed_calls) = super::stub_providers(super::unconstrained_payload());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let searcher =
		super::seed_person(&service, SeedPerson { balance: 30, ..SeedPerson::default() }).await;

	for name in ["D1", "D2", "D3", "D4", "D5"] {
		let person = super::seed_person(&service, SeedPerson { name, ..SeedPerson::default() }).await;

		super::seed_record(
			&service,
			person,
			SeedRecord { title: "Data Engineer", ..SeedRecord::default() },
		)
		.await;
	}

	let response = service.search(search_request(searcher, 2)).await.expect("Search failed.");

	assert_eq!(response.people.len(), 2);

	let calls_after_search = embed_calls.load(Ordering::SeqCst);
	let balance_after_search =
		credits::balance(&service.db.pool, searcher).await.expect("balance");

	assert_eq!(balance_after_search, 28);

	// Page two: pure snapshot read plus reveal billing.
	let page_two = service
		.load_more(LoadMoreRequest {
			searcher_id: searcher,
			search_id: response.search_id,
			offset: 2,
			limit: Some(2),
			history: false,
		})
		.await
		.expect("Load more failed.");

	assert_eq!(page_two.people.len(), 2);
	assert_eq!(page_two.total, 5);

	let first_page_ids: Vec<_> = response.people.iter().map(|person| person.person_id).collect();

	for person in &page_two.people {
		assert!(
			!first_page_ids.contains(&person.person_id),
			"Pages must not overlap."
		);
	}

	// Retrieval never re-runs for pagination.
	assert_eq!(embed_calls.load(Ordering::SeqCst), calls_after_search);

	let balance_after_more =
		credits::balance(&service.db.pool, searcher).await.expect("balance");

	assert_eq!(balance_after_more, 26, "One credit per newly revealed row.");

	// History replay of the same slice is free and identical.
	let replay = service
		.load_more(LoadMoreRequest {
			searcher_id: searcher,
			search_id: response.search_id,
			offset: 2,
			limit: Some(2),
			history: true,
		})
		.await
		.expect("History replay failed.");
	let replay_ids: Vec<_> = replay.people.iter().map(|person| person.person_id).collect();
	let page_two_ids: Vec<_> = page_two.people.iter().map(|person| person.person_id).collect();

	assert_eq!(replay_ids, page_two_ids);

	let balance_after_replay =
		credits::balance(&service.db.pool, searcher).await.expect("balance");

	assert_eq!(balance_after_replay, 26, "History replay skips billing.");

	// Already-revealed rows never bill twice even without the history flag.
	let re_read = service
		.load_more(LoadMoreRequest {
			searcher_id: searcher,
			search_id: response.search_id,
			offset: 0,
			limit: Some(4),
			history: false,
		})
		.await
		.expect("Re-read failed.");

	assert_eq!(re_read.people.len(), 4);

	let balance_after_re_read =
		credits::balance(&service.db.pool, searcher).await.expect("balance");

	assert_eq!(balance_after_re_read, 26);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROSTER_PG_DSN to run."]
async fn foreign_or_unknown_searches_are_rejected() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping foreign_or_unknown_searches_are_rejected; set ROSTER_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let (providers, _) = super::stub_providers(super::unconstrained_payload());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let searcher =
		super::seed_person(&service, SeedPerson { balance: 10, ..SeedPerson::default() }).await;
	let other = super::seed_person(
		&service,
		SeedPerson { name: "Other Searcher", balance: 10, ..SeedPerson::default() },
	)
	.await;
	let person = super::seed_person(&service, SeedPerson::default()).await;

	super::seed_record(&service, person, SeedRecord::default()).await;

	let response = service.search(search_request(searcher, 1)).await.expect("Search failed.");

	let unknown = service
		.load_more(LoadMoreRequest {
			searcher_id: searcher,
			search_id: uuid::Uuid::new_v4(),
			offset: 0,
			limit: Some(1),
			history: false,
		})
		.await;

	assert!(matches!(unknown, Err(ServiceError::InvalidOrExpiredSearch { .. })));

	let foreign = service
		.load_more(LoadMoreRequest {
			searcher_id: other,
			search_id: response.search_id,
			offset: 0,
			limit: Some(1),
			history: false,
		})
		.await;

	assert!(matches!(foreign, Err(ServiceError::InvalidOrExpiredSearch { .. })));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
