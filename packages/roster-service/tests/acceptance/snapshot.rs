use roster_service::{LoadMoreRequest, SearchRequest, UpdateRecordRequest};
use roster_storage::queries;

use super::{SeedPerson, SeedRecord};

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROSTER_PG_DSN to run."]
async fn record_edits_never_rewrite_persisted_results() {
	let Some(test_db) = super::test_db().await else {
		eprintln!("Skipping record_edits_never_rewrite_persisted_results; set ROSTER_PG_DSN.");

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let (providers, _) = super::stub_providers(super::unconstrained_payload());
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let searcher =
		super::seed_person(&service, SeedPerson { balance: 20, ..SeedPerson::default() }).await;
	let person = super::seed_person(&service, SeedPerson::default()).await;
	let record_id = super::seed_record(
		&service,
		person,
		SeedRecord {
			title: "Search Engineer",
			summary: "Built search ranking pipelines",
			..SeedRecord::default()
		},
	)
	.await;

	let response = service
		.search(SearchRequest {
			searcher_id: searcher,
			query: "search ranking".to_string(),
			open_to_work_only: None,
			preferred_locations: None,
			salary_min: None,
			salary_max: None,
			num_cards: Some(1),
			idempotency_key: None,
		})
		.await
		.expect("Search failed.");

	assert_eq!(response.people.len(), 1);

	let before = queries::load_results_for_search(&service.db.pool, response.search_id)
		.await
		.expect("Failed to read snapshot.");

	// Rewrite the record wholesale; the edit re-triggers embedding through
	// the outbox but must not touch the committed snapshot.
	service
		.update_record(UpdateRecordRequest {
			record_id,
			title: Some("Gardener".to_string()),
			company: None,
			team: None,
			role: None,
			domain: None,
			summary: Some("Prunes hedges".to_string()),
			location: None,
			search_phrases: None,
		})
		.await
		.expect("Record update failed.");

	let pending_jobs: i64 = sqlx::query_scalar(
		"SELECT COUNT(*) FROM embedding_outbox WHERE record_id = $1 AND status = 'PENDING'",
	)
	.bind(record_id)
	.fetch_one(&service.db.pool)
	.await
	.expect("Failed to count embedding jobs.");

	assert_eq!(pending_jobs, 1, "Edit must enqueue a re-embed job.");

	let after = queries::load_results_for_search(&service.db.pool, response.search_id)
		.await
		.expect("Failed to read snapshot.");

	assert_eq!(before.len(), after.len());

	for (lhs, rhs) in before.iter().zip(after.iter()) {
		assert_eq!(lhs.rank, rhs.rank);
		assert_eq!(lhs.person_id, rhs.person_id);
		assert_eq!(lhs.score, rhs.score);
		assert_eq!(lhs.evidence, rhs.evidence);
	}

	// Pagination re-hydrates display data live, but rank and score come from
	// the immutable snapshot.
	let replay = service
		.load_more(LoadMoreRequest {
			searcher_id: searcher,
			search_id: response.search_id,
			offset: 0,
			limit: Some(1),
			history: true,
		})
		.await
		.expect("History replay failed.");

	assert_eq!(replay.people.len(), 1);
	assert_eq!(replay.people[0].person_id, response.people[0].person_id);
	assert_eq!(replay.people[0].similarity_percent, response.people[0].similarity_percent);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROSTER_PG_DSN to run."]
async fn deterministic_reasons_are_present_from_the_first_response() {
	let Some(test_db) = super::test_db().await else {
		eprintln!(
			"Skipping deterministic_reasons_are_present_from_the_first_response; set ROSTER_PG_DSN."
		);

		return;
	};
	let cfg = super::test_config(test_db.dsn().to_string());
	let payload = serde_json::json!({
		"confidence": 0.9,
		"must": { "companies": ["Acme"] },
		"should": { "keywords": ["kafka"] },
		"exclude": {},
		"search_text": "kafka engineer at Acme",
	});
	let (providers, _) = super::stub_providers(payload);
	let service = super::build_service(cfg, providers).await.expect("Failed to build service.");
	let searcher =
		super::seed_person(&service, SeedPerson { balance: 10, ..SeedPerson::default() }).await;
	let person = super::seed_person(&service, SeedPerson::default()).await;
	let record_id = super::seed_record(
		&service,
		person,
		SeedRecord {
			title: "Streaming Engineer",
			company: "Acme",
			summary: "Ran kafka clusters",
			search_phrases: vec!["kafka".to_string()],
			..SeedRecord::default()
		},
	)
	.await;

	super::seed_subrecord(
		&service,
		record_id,
		person,
		"metrics",
		&[("Throughput", "Doubled pipeline throughput")],
	)
	.await;

	let response = service
		.search(SearchRequest {
			searcher_id: searcher,
			query: "kafka engineer at Acme".to_string(),
			open_to_work_only: None,
			preferred_locations: None,
			salary_min: None,
			salary_max: None,
			num_cards: Some(1),
			idempotency_key: None,
		})
		.await
		.expect("Search failed.");

	assert_eq!(response.people.len(), 1);

	let reasons = &response.people[0].why_matched;

	assert!(!reasons.is_empty() && reasons.len() <= 3);
	assert_eq!(reasons[0], "Worked at Acme", "Filter matches outrank other reasons.");

	// The synchronous response never waits on refinement: the stored rows
	// still carry the deterministic marker.
	let rows = queries::load_results_for_search(&service.db.pool, response.search_id)
		.await
		.expect("Failed to read snapshot.");

	assert!(rows.iter().all(|row| row.explanation_source == "deterministic"));

	let queued: i64 = sqlx::query_scalar(
		"SELECT COUNT(*) FROM explanation_outbox WHERE search_id = $1",
	)
	.bind(response.search_id)
	.fetch_one(&service.db.pool)
	.await
	.expect("Failed to count explanation jobs.");

	assert_eq!(queued, 1, "Refinement rides the durable outbox.");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
