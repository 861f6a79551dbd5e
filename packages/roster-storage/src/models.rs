use serde_json::Value;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PersonProfile {
	pub person_id: Uuid,
	pub display_name: String,
	pub headline: String,
	pub bio: String,
	pub open_to_work: bool,
	pub open_to_contact: bool,
	pub preferred_locations: Vec<String>,
	pub preferred_salary_min: Option<i64>,
	pub preferred_salary_max: Option<i64>,
	pub credit_balance: i64,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExperienceRecord {
	pub record_id: Uuid,
	pub person_id: Uuid,
	pub title: String,
	pub company: String,
	pub team: String,
	pub role: String,
	pub domain: String,
	pub summary: String,
	pub location: String,
	pub employment_type: String,
	pub seniority: String,
	pub start_date: Option<Date>,
	pub end_date: Option<Date>,
	pub is_current: bool,
	pub visible: bool,
	pub search_phrases: Vec<String>,
	pub embedding_version: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl ExperienceRecord {
	pub fn has_any_date(&self) -> bool {
		self.start_date.is_some() || self.end_date.is_some()
	}

	/// Text rendered into the lexical search document and used for SHOULD
	/// keyword matching.
	pub fn searchable_text(&self) -> String {
		[
			self.title.as_str(),
			self.company.as_str(),
			self.team.as_str(),
			self.role.as_str(),
			self.domain.as_str(),
			self.summary.as_str(),
			self.location.as_str(),
		]
		.iter()
		.filter(|part| !part.is_empty())
		.copied()
		.collect::<Vec<_>>()
		.join("\n")
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExperienceSubRecord {
	pub subrecord_id: Uuid,
	pub record_id: Uuid,
	pub person_id: Uuid,
	pub kind: String,
	pub value: Value,
	pub embedding_version: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CreditLedgerEntry {
	pub entry_id: Uuid,
	pub person_id: Uuid,
	pub amount: i64,
	pub reason: String,
	pub reference: Option<Uuid>,
	pub balance_after: i64,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchRequestRow {
	pub search_id: Uuid,
	pub searcher_id: Uuid,
	pub query: String,
	pub constraints: Value,
	pub fallback_tier: i32,
	pub num_cards: i32,
	pub revealed_count: i32,
	pub created_at: OffsetDateTime,
	pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchResultRow {
	pub search_id: Uuid,
	pub rank: i32,
	pub person_id: Uuid,
	pub score: f32,
	pub evidence: Value,
	pub reasons: Value,
	pub explanation_source: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExplanationOutboxEntry {
	pub outbox_id: Uuid,
	pub search_id: Uuid,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmbeddingOutboxEntry {
	pub outbox_id: Uuid,
	pub record_id: Uuid,
	pub op: String,
	pub embedding_version: String,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
