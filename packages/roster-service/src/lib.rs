pub mod evidence;
pub mod more;
pub mod records;
pub mod search;
pub mod time_serde;

mod error;

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

pub use error::{ServiceError, ServiceResult};
pub use more::{LoadMoreRequest, LoadMoreResponse};
pub use records::{UpdateRecordRequest, UpdateRecordResponse};
pub use search::{PersonCard, RecordCard, SearchRequest, SearchResponse};

use roster_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use roster_providers::{embedding, explainer, explainer::RefinedReasons, parser};
use roster_storage::db::Db;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait QueryParserProvider
where
	Self: Send + Sync,
{
	fn parse<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		query: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Value>>;
}

pub trait ExplainerProvider
where
	Self: Send + Sync,
{
	fn refine<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		query: &'a str,
		evidence: &'a Value,
	) -> BoxFuture<'a, color_eyre::Result<Vec<RefinedReasons>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub query_parser: Arc<dyn QueryParserProvider>,
	pub explainer: Arc<dyn ExplainerProvider>,
}

pub struct RosterService {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl QueryParserProvider for DefaultProviders {
	fn parse<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		query: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<Value>> {
		Box::pin(parser::parse_query(cfg, query))
	}
}

impl ExplainerProvider for DefaultProviders {
	fn refine<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		query: &'a str,
		evidence: &'a Value,
	) -> BoxFuture<'a, color_eyre::Result<Vec<RefinedReasons>>> {
		Box::pin(explainer::refine(cfg, query, evidence))
	}
}

impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		query_parser: Arc<dyn QueryParserProvider>,
		explainer: Arc<dyn ExplainerProvider>,
	) -> Self {
		Self { embedding, query_parser, explainer }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);
		Self { embedding: provider.clone(), query_parser: provider.clone(), explainer: provider }
	}
}

impl RosterService {
	pub fn new(cfg: Config, db: Db) -> Self {
		Self { cfg, db, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, db: Db, providers: Providers) -> Self {
		Self { cfg, db, providers }
	}
}

/// Embedding rows are keyed by this so a model change invalidates them all.
pub fn embedding_version(cfg: &Config) -> String {
	format!(
		"{}:{}:{}",
		cfg.providers.embedding.provider_id, cfg.providers.embedding.model, cfg.storage.vector_dim
	)
}

pub(crate) async fn embed_query(
	service: &RosterService,
	text: &str,
) -> ServiceResult<Vec<f32>> {
	let embeddings = service
		.providers
		.embedding
		.embed(&service.cfg.providers.embedding, std::slice::from_ref(&text.to_string()))
		.await
		.map_err(|err| ServiceError::EmbeddingUnavailable { message: err.to_string() })?;
	let query_vec =
		embeddings.into_iter().next().ok_or_else(|| ServiceError::EmbeddingUnavailable {
			message: "Embedding provider returned no vectors.".to_string(),
		})?;

	if query_vec.len() != service.cfg.storage.vector_dim as usize {
		return Err(ServiceError::EmbeddingUnavailable {
			message: "Embedding vector dimension mismatch.".to_string(),
		});
	}

	Ok(query_vec)
}
