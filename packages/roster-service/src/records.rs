use time::OffsetDateTime;
use uuid::Uuid;

use crate::{RosterService, ServiceError, ServiceResult, embedding_version};
use roster_storage::{outbox, queries};

/// Explicit edit of a parent record's free-text content. Every edit refreshes
/// the lexical document and re-triggers embedding through the outbox.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UpdateRecordRequest {
	pub record_id: Uuid,
	#[serde(default)]
	pub title: Option<String>,
	#[serde(default)]
	pub company: Option<String>,
	#[serde(default)]
	pub team: Option<String>,
	#[serde(default)]
	pub role: Option<String>,
	#[serde(default)]
	pub domain: Option<String>,
	#[serde(default)]
	pub summary: Option<String>,
	#[serde(default)]
	pub location: Option<String>,
	#[serde(default)]
	pub search_phrases: Option<Vec<String>>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UpdateRecordResponse {
	pub record_id: Uuid,
	/// The new vectors land asynchronously; existing snapshots keep their
	/// already-ranked scores.
	pub embedding_pending: bool,
}

impl RosterService {
	pub async fn update_record(
		&self,
		req: UpdateRecordRequest,
	) -> ServiceResult<UpdateRecordResponse> {
		let mut tx = self.db.pool.begin().await?;
		let mut record = queries::get_record(&mut *tx, req.record_id).await?.ok_or_else(|| {
			ServiceError::InvalidRequest {
				message: format!("Unknown record {}.", req.record_id),
			}
		})?;

		if let Some(title) = req.title {
			record.title = title;
		}
		if let Some(company) = req.company {
			record.company = company;
		}
		if let Some(team) = req.team {
			record.team = team;
		}
		if let Some(role) = req.role {
			record.role = role;
		}
		if let Some(domain) = req.domain {
			record.domain = domain;
		}
		if let Some(summary) = req.summary {
			record.summary = summary;
		}
		if let Some(location) = req.location {
			record.location = location;
		}
		if let Some(search_phrases) = req.search_phrases {
			record.search_phrases = search_phrases;
		}

		let now = OffsetDateTime::now_utc();

		record.updated_at = now;

		let version = embedding_version(&self.cfg);

		queries::update_record_content(&mut *tx, &record).await?;
		outbox::enqueue_embedding(&mut *tx, record.record_id, "UPSERT", &version, now).await?;
		tx.commit().await?;

		tracing::info!(record_id = %record.record_id, "Record updated; re-embedding enqueued.");

		Ok(UpdateRecordResponse { record_id: record.record_id, embedding_pending: true })
	}
}
