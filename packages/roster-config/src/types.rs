use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub constraints: Constraints,
	#[serde(default)]
	pub ranking: Ranking,
	#[serde(default)]
	pub credits: Credits,
	#[serde(default)]
	pub explanation: Explanation,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	#[serde(default)]
	pub bind_localhost_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub query_parser: LlmProviderConfig,
	pub explainer: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	/// Candidate rows fetched per vector query at each fallback tier.
	pub candidate_k: u32,
	/// Minimum distinct persons required before the fallback loop stops.
	pub min_distinct_persons: u32,
	/// Child evidence rows kept per person for display.
	pub child_evidence_k: u32,
	/// Upper bound on persisted snapshot rows per search.
	pub max_snapshot_rows: u32,
	pub default_num_cards: u32,
	pub max_num_cards: u32,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			candidate_k: 50,
			min_distinct_persons: 8,
			child_evidence_k: 3,
			max_snapshot_rows: 100,
			default_num_cards: 6,
			max_num_cards: 24,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Constraints {
	pub max_must_intents: usize,
	pub max_must_companies: usize,
	pub max_must_teams: usize,
	pub max_must_locations: usize,
	pub min_parse_confidence: f32,
	pub min_query_year: i32,
	pub max_query_year: i32,
	/// Salary figures below this are read as per-month and annualized.
	pub min_annual_salary: i64,
}
impl Default for Constraints {
	fn default() -> Self {
		Self {
			max_must_intents: 2,
			max_must_companies: 3,
			max_must_teams: 3,
			max_must_locations: 3,
			min_parse_confidence: 0.5,
			min_query_year: 1950,
			max_query_year: 2100,
			min_annual_salary: 10_000,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Ranking {
	pub parent_weight: f32,
	pub child_weight: f32,
	pub depth_weight: f32,
	pub lexical_bonus_scale: f32,
	pub lexical_bonus_cap: f32,
	pub should_hit_boost: f32,
	pub should_hit_cap: f32,
	pub missing_date_penalty: f32,
	pub location_mismatch_penalty: f32,
}
impl Default for Ranking {
	fn default() -> Self {
		Self {
			parent_weight: 0.55,
			child_weight: 0.30,
			depth_weight: 0.15,
			lexical_bonus_scale: 0.1,
			lexical_bonus_cap: 0.05,
			should_hit_boost: 0.02,
			should_hit_cap: 0.08,
			missing_date_penalty: 0.05,
			location_mismatch_penalty: 0.05,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Credits {
	pub cost_per_card: i64,
}
impl Default for Credits {
	fn default() -> Self {
		Self { cost_per_card: 1 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Explanation {
	pub max_reasons: usize,
	pub max_reason_chars: usize,
	pub snippet_max_chars: usize,
	pub max_snippets_per_person: usize,
	/// Disable to leave deterministic reasons permanently in place.
	pub refine_enabled: bool,
}
impl Default for Explanation {
	fn default() -> Self {
		Self {
			max_reasons: 3,
			max_reason_chars: 120,
			snippet_max_chars: 160,
			max_snippets_per_person: 4,
			refine_enabled: true,
		}
	}
}
