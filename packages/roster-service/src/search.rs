pub(crate) mod lexical;
pub(crate) mod retrieval;
pub(crate) mod scoring;

use std::collections::{HashMap, HashSet};

use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::{
	RosterService, ServiceError, ServiceResult, embed_query, embedding_version,
	evidence::{self, EvidenceArgs},
	search::{
		retrieval::RetrievalArgs,
		scoring::{CollapseArgs, MAX_DISPLAY_RECORDS, RankedPerson},
	},
};
use roster_domain::{
	constraints::{self, Intent, QueryConstraints, RawConstraints},
	fallback::FallbackTier,
	scoring::similarity_percent,
};
use roster_storage::{
	credits, idempotency,
	idempotency::ClaimOutcome,
	models::{ExperienceRecord, PersonProfile, SearchRequestRow, SearchResultRow},
	outbox, queries, vector_to_pg,
};

pub(crate) const SEARCH_ENDPOINT: &str = "search";
pub(crate) const EXPLANATION_SOURCE_DETERMINISTIC: &str = "deterministic";
pub(crate) const DEBIT_REASON_SEARCH: &str = "search_cards";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchRequest {
	pub searcher_id: Uuid,
	pub query: String,
	#[serde(default)]
	pub open_to_work_only: Option<bool>,
	#[serde(default)]
	pub preferred_locations: Option<Vec<String>>,
	#[serde(default)]
	pub salary_min: Option<i64>,
	#[serde(default)]
	pub salary_max: Option<i64>,
	#[serde(default)]
	pub num_cards: Option<u32>,
	#[serde(default)]
	pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RecordCard {
	pub record_id: Uuid,
	pub title: String,
	pub company: String,
	pub team: String,
	pub role: String,
	pub domain: String,
	pub summary: String,
	pub location: String,
	pub employment_type: String,
	pub seniority: String,
	#[serde(with = "crate::time_serde::date_option")]
	pub start_date: Option<time::Date>,
	#[serde(with = "crate::time_serde::date_option")]
	pub end_date: Option<time::Date>,
	pub is_current: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PersonCard {
	pub person_id: Uuid,
	pub display_name: String,
	pub headline: String,
	pub bio: String,
	pub similarity_percent: u8,
	pub why_matched: Vec<String>,
	pub open_to_work: bool,
	pub open_to_contact: bool,
	pub preferred_locations: Vec<String>,
	pub preferred_salary_min: Option<i64>,
	pub preferred_salary_max: Option<i64>,
	pub matched_records: Vec<RecordCard>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchResponse {
	pub search_id: Uuid,
	pub num_cards: u32,
	pub fallback_tier: FallbackTier,
	pub people: Vec<PersonCard>,
}

impl RosterService {
	/// Run one search end to end: normalize constraints, retrieve with tiered
	/// fallback, collapse and rank persons, then persist the snapshot and the
	/// credit debit under a single commit.
	pub async fn search(&self, req: SearchRequest) -> ServiceResult<SearchResponse> {
		let query = req.query.trim().to_string();

		if query.is_empty() {
			return Err(ServiceError::InvalidRequest {
				message: "query must be non-empty.".to_string(),
			});
		}
		if let Some(num_cards) = req.num_cards
			&& (num_cards == 0 || num_cards > self.cfg.search.max_num_cards)
		{
			return Err(ServiceError::InvalidRequest {
				message: format!(
					"num_cards must be in the range 1-{}.",
					self.cfg.search.max_num_cards
				),
			});
		}

		let idempotency_key = req
			.idempotency_key
			.as_deref()
			.map(str::trim)
			.filter(|key| !key.is_empty())
			.map(str::to_string);
		let Some(key) = idempotency_key else {
			return self.execute_search(&req, &query, None).await;
		};
		let now = OffsetDateTime::now_utc();

		match idempotency::claim(&self.db.pool, &key, req.searcher_id, SEARCH_ENDPOINT, now)
			.await?
		{
			ClaimOutcome::Claimed => {},
			_ => {
				// Lost the race: replay the winner's stored response, or
				// report the in-flight execution.
				return match idempotency::fetch(
					&self.db.pool,
					&key,
					req.searcher_id,
					SEARCH_ENDPOINT,
				)
				.await?
				{
					Some(ClaimOutcome::Replay(stored)) => serde_json::from_value(stored)
						.map_err(|err| ServiceError::Storage {
							message: format!("Stored idempotent response is unreadable: {err}."),
						}),
					_ => Err(ServiceError::InProgress),
				};
			},
		}

		let result = self.execute_search(&req, &query, Some(&key)).await;

		if result.is_err()
			&& let Err(release_err) =
				idempotency::release(&self.db.pool, &key, req.searcher_id, SEARCH_ENDPOINT).await
		{
			warn!(error = %release_err, "Failed to release idempotency claim.");
		}

		result
	}

	async fn execute_search(
		&self,
		req: &SearchRequest,
		query: &str,
		idempotency_key: Option<&str>,
	) -> ServiceResult<SearchResponse> {
		let constraints = self.resolve_constraints(req, query).await;
		let num_cards = match req.num_cards {
			Some(value) => value,
			None => constraints::requested_num_cards(query)
				.map(|value| value.clamp(1, self.cfg.search.max_num_cards))
				.unwrap_or(self.cfg.search.default_num_cards),
		};
		let open_to_work_only = req.open_to_work_only.unwrap_or(false)
			|| constraints
				.must
				.intents
				.iter()
				.any(|intent| matches!(intent, Intent::Hiring | Intent::Job));

		// The two retrieval signals are independent: embedding failure kills
		// the search, lexical failure only loses its bonus.
		let (embedded, lexical) = tokio::join!(
			embed_query(self, &constraints.search_text),
			lexical::person_lexical_bonus(
				&self.db.pool,
				&constraints,
				self.cfg.ranking.lexical_bonus_scale,
			),
		);
		let query_vec = embedded?;
		let lexical = match lexical {
			Ok(map) => map,
			Err(err) => {
				warn!(error = %err, "Lexical relevance unavailable; continuing without bonus.");

				HashMap::new()
			},
		};

		let vec_text = vector_to_pg(&query_vec);
		let version = embedding_version(&self.cfg);
		let (tier, candidates) = retrieval::retrieve_with_fallback(&RetrievalArgs {
			pool: &self.db.pool,
			constraints: &constraints,
			open_to_work_only,
			query_vec_text: &vec_text,
			embedding_version: &version,
			candidate_k: self.cfg.search.candidate_k as i64,
			child_evidence_k: self.cfg.search.child_evidence_k as i64,
			min_distinct_persons: self.cfg.search.min_distinct_persons as usize,
		})
		.await?;

		let record_ids: Vec<Uuid> = candidates
			.parents
			.iter()
			.map(|hit| hit.record_id)
			.chain(candidates.child_evidence.iter().map(|hit| hit.record_id))
			.chain(candidates.child_best.iter().map(|hit| hit.record_id))
			.collect::<HashSet<_>>()
			.into_iter()
			.collect();
		let subrecord_ids: Vec<Uuid> = candidates
			.child_evidence
			.iter()
			.map(|hit| hit.subrecord_id)
			.chain(candidates.child_best.iter().map(|hit| hit.subrecord_id))
			.collect::<HashSet<_>>()
			.into_iter()
			.collect();
		let person_ids: Vec<Uuid> = candidates.distinct_persons().into_iter().collect();

		let mut records: HashMap<Uuid, ExperienceRecord> =
			queries::load_records(&self.db.pool, &record_ids)
				.await?
				.into_iter()
				.map(|record| (record.record_id, record))
				.collect();
		let subrecords = queries::load_subrecords(&self.db.pool, &subrecord_ids)
			.await?
			.into_iter()
			.map(|subrecord| (subrecord.subrecord_id, subrecord))
			.collect();
		let persons: HashMap<Uuid, PersonProfile> =
			queries::load_persons(&self.db.pool, &person_ids)
				.await?
				.into_iter()
				.map(|person| (person.person_id, person))
				.collect();

		let mut ranked = scoring::collapse_and_rank(CollapseArgs {
			candidates: &candidates,
			records: &records,
			persons: &persons,
			lexical: &lexical,
			constraints: &constraints,
			tier,
			ranking: &self.cfg.ranking,
		});

		ranked.truncate(self.cfg.search.max_snapshot_rows as usize);
		self.backfill_display_records(&mut ranked, &mut records).await?;

		self.persist_search(PersistSearchArgs {
			req,
			query,
			constraints: &constraints,
			tier,
			num_cards,
			ranked: &ranked,
			records: &records,
			subrecords: &subrecords,
			persons: &persons,
			idempotency_key,
		})
		.await
	}

	/// Parse the query through the constraint provider. Worst case this
	/// degrades to an unconstrained semantic search, never an error.
	async fn resolve_constraints(&self, req: &SearchRequest, query: &str) -> QueryConstraints {
		let raw = match self
			.providers
			.query_parser
			.parse(&self.cfg.providers.query_parser, query)
			.await
		{
			Ok(value) => serde_json::from_value::<RawConstraints>(value).unwrap_or_default(),
			Err(err) => {
				warn!(error = %err, "Query parsing failed; falling back to semantic-only search.");

				RawConstraints::default()
			},
		};
		let mut constraints = constraints::normalize(raw, query, &self.cfg.constraints);

		if let Some(locations) = &req.preferred_locations {
			let mut merged = constraints.must.locations;

			merged.extend(locations.clone());
			constraints.must.locations = constraints::dedupe_case_insensitive(merged);
		}
		if req.salary_min.is_some() {
			constraints.must.salary_min = req.salary_min;
		}
		if req.salary_max.is_some() {
			constraints.must.salary_max = req.salary_max;
		}

		constraints
	}

	/// A child-only person whose evidence lookup came up empty still needs
	/// parents to display: fall back to their most recent visible records.
	async fn backfill_display_records(
		&self,
		ranked: &mut [RankedPerson],
		records: &mut HashMap<Uuid, ExperienceRecord>,
	) -> ServiceResult<()> {
		let missing: Vec<Uuid> = ranked
			.iter()
			.filter(|person| person.display_record_ids.is_empty())
			.map(|person| person.person_id)
			.collect();

		if missing.is_empty() {
			return Ok(());
		}

		let recent = queries::recent_visible_records(
			&self.db.pool,
			&missing,
			MAX_DISPLAY_RECORDS as i64,
		)
		.await?;
		let mut by_person: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

		for record in recent {
			by_person.entry(record.person_id).or_default().push(record.record_id);
			records.insert(record.record_id, record);
		}
		for person in ranked.iter_mut() {
			if person.display_record_ids.is_empty()
				&& let Some(ids) = by_person.remove(&person.person_id)
			{
				person.display_record_ids = ids;
			}
		}

		Ok(())
	}

	async fn persist_search(
		&self,
		args: PersistSearchArgs<'_>,
	) -> ServiceResult<SearchResponse> {
		let PersistSearchArgs {
			req,
			query,
			constraints,
			tier,
			num_cards,
			ranked,
			records,
			subrecords,
			persons,
			idempotency_key,
		} = args;
		let now = OffsetDateTime::now_utc();
		let search_id = Uuid::new_v4();
		let cost_per_card = self.cfg.credits.cost_per_card;
		let required = num_cards as i64 * cost_per_card;
		let charged_cards = (num_cards as usize).min(ranked.len());
		let constraints_json =
			serde_json::to_value(constraints).map_err(|err| ServiceError::Storage {
				message: format!("Failed to encode constraints: {err}."),
			})?;

		let mut tx = self.db.pool.begin().await?;

		// The whole request is refused when the wallet cannot cover the
		// requested cards, even if fewer ranks materialize.
		let balance = credits::balance(&mut *tx, req.searcher_id).await.map_err(|err| {
			match err {
				roster_storage::Error::NotFound(_) => ServiceError::InvalidRequest {
					message: format!("Unknown searcher {}.", req.searcher_id),
				},
				other => other.into(),
			}
		})?;

		if balance < required {
			return Err(ServiceError::InsufficientCredits { required, balance });
		}

		queries::insert_search_request(
			&mut *tx,
			&SearchRequestRow {
				search_id,
				searcher_id: req.searcher_id,
				query: query.to_string(),
				constraints: constraints_json,
				fallback_tier: tier.as_i32(),
				num_cards: num_cards as i32,
				revealed_count: charged_cards as i32,
				created_at: now,
				expires_at: None,
			},
		)
		.await?;

		if charged_cards > 0 {
			let amount = charged_cards as i64 * cost_per_card;
			let debited = credits::debit(
				&mut tx,
				req.searcher_id,
				amount,
				DEBIT_REASON_SEARCH,
				Some(search_id),
				now,
			)
			.await?;

			if debited.is_none() {
				return Err(ServiceError::InsufficientCredits { required: amount, balance });
			}
		}

		let mut cards = Vec::with_capacity(charged_cards);

		for (idx, person) in ranked.iter().enumerate() {
			let rank = idx as i32 + 1;
			let built = evidence::build_person_evidence(EvidenceArgs {
				person,
				records,
				subrecords,
				constraints,
				cfg: &self.cfg.explanation,
			});
			let reasons_json =
				serde_json::to_value(&built.reasons).map_err(|err| ServiceError::Storage {
					message: format!("Failed to encode reasons: {err}."),
				})?;

			queries::insert_search_result(
				&mut *tx,
				&SearchResultRow {
					search_id,
					rank,
					person_id: person.person_id,
					score: person.score,
					evidence: built.blob,
					reasons: reasons_json,
					explanation_source: EXPLANATION_SOURCE_DETERMINISTIC.to_string(),
					created_at: now,
					updated_at: now,
				},
			)
			.await?;

			if idx < charged_cards
				&& let Some(profile) = persons.get(&person.person_id)
			{
				cards.push(build_person_card(
					profile,
					person.score,
					built.reasons,
					&person.display_record_ids,
					records,
				));
			}
		}

		if !ranked.is_empty() && self.cfg.explanation.refine_enabled {
			outbox::enqueue_explanation(&mut *tx, search_id, now).await?;
		}

		let response = SearchResponse { search_id, num_cards, fallback_tier: tier, people: cards };

		if let Some(key) = idempotency_key {
			let stored = serde_json::to_value(&response).map_err(|err| ServiceError::Storage {
				message: format!("Failed to encode response: {err}."),
			})?;

			idempotency::complete(&mut *tx, key, req.searcher_id, SEARCH_ENDPOINT, &stored, now)
				.await?;
		}

		tx.commit().await?;

		tracing::info!(
			%search_id,
			tier = tier.as_i32(),
			ranked = ranked.len(),
			charged = charged_cards,
			"Search persisted."
		);

		Ok(response)
	}
}

struct PersistSearchArgs<'a> {
	req: &'a SearchRequest,
	query: &'a str,
	constraints: &'a QueryConstraints,
	tier: FallbackTier,
	num_cards: u32,
	ranked: &'a [RankedPerson],
	records: &'a HashMap<Uuid, ExperienceRecord>,
	subrecords: &'a HashMap<Uuid, roster_storage::models::ExperienceSubRecord>,
	persons: &'a HashMap<Uuid, PersonProfile>,
	idempotency_key: Option<&'a str>,
}

pub(crate) fn build_person_card(
	profile: &PersonProfile,
	score: f32,
	why_matched: Vec<String>,
	display_record_ids: &[Uuid],
	records: &HashMap<Uuid, ExperienceRecord>,
) -> PersonCard {
	let matched_records = display_record_ids
		.iter()
		.filter_map(|id| records.get(id))
		.take(MAX_DISPLAY_RECORDS)
		.map(record_card)
		.collect();

	PersonCard {
		person_id: profile.person_id,
		display_name: profile.display_name.clone(),
		headline: profile.headline.clone(),
		bio: profile.bio.clone(),
		similarity_percent: similarity_percent(score),
		why_matched,
		open_to_work: profile.open_to_work,
		open_to_contact: profile.open_to_contact,
		preferred_locations: profile.preferred_locations.clone(),
		preferred_salary_min: profile.preferred_salary_min,
		preferred_salary_max: profile.preferred_salary_max,
		matched_records,
	}
}

fn record_card(record: &ExperienceRecord) -> RecordCard {
	RecordCard {
		record_id: record.record_id,
		title: record.title.clone(),
		company: record.company.clone(),
		team: record.team.clone(),
		role: record.role.clone(),
		domain: record.domain.clone(),
		summary: record.summary.clone(),
		location: record.location.clone(),
		employment_type: record.employment_type.clone(),
		seniority: record.seniority.clone(),
		start_date: record.start_date,
		end_date: record.end_date,
		is_current: record.is_current,
	}
}
