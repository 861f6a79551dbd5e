use std::collections::{HashMap, HashSet};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	PersonCard, RosterService, ServiceError, ServiceResult,
	search::{DEBIT_REASON_SEARCH, build_person_card},
};
use roster_storage::{credits, models::SearchResultRow, queries};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LoadMoreRequest {
	pub searcher_id: Uuid,
	pub search_id: Uuid,
	#[serde(default)]
	pub offset: u32,
	#[serde(default)]
	pub limit: Option<u32>,
	/// Replaying an already-paid search from history skips billing.
	#[serde(default)]
	pub history: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LoadMoreResponse {
	pub search_id: Uuid,
	pub offset: u32,
	pub total: u32,
	pub people: Vec<PersonCard>,
}

impl RosterService {
	/// Serve the next slice of a persisted snapshot, strictly by stored rank.
	/// Never re-runs retrieval or re-scores; only the reveal billing touches
	/// the database for writes.
	pub async fn load_more(&self, req: LoadMoreRequest) -> ServiceResult<LoadMoreResponse> {
		let request = queries::get_search_request(&self.db.pool, req.search_id)
			.await?
			.ok_or_else(|| ServiceError::InvalidOrExpiredSearch {
				message: format!("Unknown search {}.", req.search_id),
			})?;

		if request.searcher_id != req.searcher_id {
			return Err(ServiceError::InvalidOrExpiredSearch {
				message: "Search belongs to a different searcher.".to_string(),
			});
		}

		let now = OffsetDateTime::now_utc();

		if let Some(expires_at) = request.expires_at
			&& expires_at <= now
		{
			return Err(ServiceError::InvalidOrExpiredSearch {
				message: format!("Search {} has expired.", req.search_id),
			});
		}

		let limit = req.limit.unwrap_or(self.cfg.search.default_num_cards).clamp(
			1,
			self.cfg.search.max_num_cards,
		);
		let rows = queries::load_results_page(
			&self.db.pool,
			req.search_id,
			req.offset as i64,
			limit as i64,
		)
		.await?;
		let total = queries::count_results(&self.db.pool, req.search_id).await? as u32;

		if !req.history {
			self.bill_newly_revealed(&request.search_id, req.searcher_id, &rows, req.offset, request.revealed_count)
				.await?;
		}

		let people = self.hydrate_cards(&rows).await?;

		Ok(LoadMoreResponse { search_id: req.search_id, offset: req.offset, total, people })
	}

	/// One credit per newly revealed row, in one transaction with the reveal
	/// marker update.
	async fn bill_newly_revealed(
		&self,
		search_id: &Uuid,
		searcher_id: Uuid,
		rows: &[SearchResultRow],
		offset: u32,
		revealed_count: i32,
	) -> ServiceResult<()> {
		let end = offset as i64 + rows.len() as i64;
		let newly = end - revealed_count as i64;

		if rows.is_empty() || newly <= 0 {
			return Ok(());
		}

		let now = OffsetDateTime::now_utc();
		let amount = newly * self.cfg.credits.cost_per_card;
		let mut tx = self.db.pool.begin().await?;
		let debited = credits::debit(
			&mut tx,
			searcher_id,
			amount,
			DEBIT_REASON_SEARCH,
			Some(*search_id),
			now,
		)
		.await?;

		let Some(_) = debited else {
			let balance = credits::balance(&self.db.pool, searcher_id).await?;

			return Err(ServiceError::InsufficientCredits { required: amount, balance });
		};

		queries::set_revealed_count(&mut *tx, *search_id, end as i32).await?;
		tx.commit().await?;

		Ok(())
	}

	async fn hydrate_cards(&self, rows: &[SearchResultRow]) -> ServiceResult<Vec<PersonCard>> {
		let person_ids: Vec<Uuid> = rows.iter().map(|row| row.person_id).collect();
		let record_ids: Vec<Uuid> = rows
			.iter()
			.flat_map(|row| display_record_ids(&row.evidence))
			.collect::<HashSet<_>>()
			.into_iter()
			.collect();
		let persons: HashMap<Uuid, _> = queries::load_persons(&self.db.pool, &person_ids)
			.await?
			.into_iter()
			.map(|person| (person.person_id, person))
			.collect();
		let records: HashMap<Uuid, _> = queries::load_records(&self.db.pool, &record_ids)
			.await?
			.into_iter()
			.map(|record| (record.record_id, record))
			.collect();

		let mut people = Vec::with_capacity(rows.len());

		for row in rows {
			let Some(profile) = persons.get(&row.person_id) else {
				continue;
			};
			let reasons: Vec<String> =
				serde_json::from_value(row.reasons.clone()).unwrap_or_default();
			let display = display_record_ids(&row.evidence);

			people.push(build_person_card(profile, row.score, reasons, &display, &records));
		}

		Ok(people)
	}
}

fn display_record_ids(evidence: &serde_json::Value) -> Vec<Uuid> {
	evidence
		.get("display_record_ids")
		.and_then(|value| value.as_array())
		.map(|items| {
			items
				.iter()
				.filter_map(|item| item.as_str())
				.filter_map(|raw| Uuid::parse_str(raw).ok())
				.collect()
		})
		.unwrap_or_default()
}
