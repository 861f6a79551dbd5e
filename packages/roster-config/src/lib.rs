mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Constraints, Credits, EmbeddingProviderConfig, Explanation, LlmProviderConfig,
	Postgres, Providers, Ranking, Search, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.vector_dim.".to_string(),
		});
	}
	if cfg.search.candidate_k == 0 {
		return Err(Error::Validation {
			message: "search.candidate_k must be greater than zero.".to_string(),
		});
	}
	if cfg.search.min_distinct_persons == 0 {
		return Err(Error::Validation {
			message: "search.min_distinct_persons must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_num_cards == 0 || cfg.search.max_num_cards > 24 {
		return Err(Error::Validation {
			message: "search.max_num_cards must be in the range 1-24.".to_string(),
		});
	}
	if cfg.search.default_num_cards == 0
		|| cfg.search.default_num_cards > cfg.search.max_num_cards
	{
		return Err(Error::Validation {
			message: "search.default_num_cards must be in the range 1..=search.max_num_cards."
				.to_string(),
		});
	}
	if cfg.search.max_snapshot_rows < cfg.search.max_num_cards {
		return Err(Error::Validation {
			message: "search.max_snapshot_rows must be at least search.max_num_cards.".to_string(),
		});
	}
	if cfg.constraints.min_query_year >= cfg.constraints.max_query_year {
		return Err(Error::Validation {
			message: "constraints.min_query_year must be less than constraints.max_query_year."
				.to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.constraints.min_parse_confidence) {
		return Err(Error::Validation {
			message: "constraints.min_parse_confidence must be in the range 0.0-1.0.".to_string(),
		});
	}

	for (label, weight) in [
		("ranking.parent_weight", cfg.ranking.parent_weight),
		("ranking.child_weight", cfg.ranking.child_weight),
		("ranking.depth_weight", cfg.ranking.depth_weight),
		("ranking.lexical_bonus_scale", cfg.ranking.lexical_bonus_scale),
		("ranking.lexical_bonus_cap", cfg.ranking.lexical_bonus_cap),
		("ranking.should_hit_boost", cfg.ranking.should_hit_boost),
		("ranking.should_hit_cap", cfg.ranking.should_hit_cap),
		("ranking.missing_date_penalty", cfg.ranking.missing_date_penalty),
		("ranking.location_mismatch_penalty", cfg.ranking.location_mismatch_penalty),
	] {
		if !weight.is_finite() {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number."),
			});
		}
		if weight < 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be zero or greater."),
			});
		}
	}

	if cfg.credits.cost_per_card <= 0 {
		return Err(Error::Validation {
			message: "credits.cost_per_card must be greater than zero.".to_string(),
		});
	}
	if cfg.explanation.max_reasons == 0 || cfg.explanation.max_reasons > 3 {
		return Err(Error::Validation {
			message: "explanation.max_reasons must be in the range 1-3.".to_string(),
		});
	}
	if cfg.explanation.max_reason_chars == 0 {
		return Err(Error::Validation {
			message: "explanation.max_reason_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.explanation.snippet_max_chars == 0 {
		return Err(Error::Validation {
			message: "explanation.snippet_max_chars must be greater than zero.".to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("query_parser", &cfg.providers.query_parser.api_key),
		("explainer", &cfg.providers.explainer.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	Ok(())
}
