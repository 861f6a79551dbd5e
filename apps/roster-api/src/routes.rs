use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;
use roster_service::{
	LoadMoreRequest, LoadMoreResponse, SearchRequest, SearchResponse, ServiceError,
	UpdateRecordRequest, UpdateRecordResponse,
};

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/search", post(search))
		.route("/v1/search/{id}/more", get(load_more))
		.route("/v1/records/update", post(update_record))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn search(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(mut payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	// The header wins over any key smuggled into the body.
	if let Some(key) = headers.get(IDEMPOTENCY_KEY_HEADER).and_then(|value| value.to_str().ok()) {
		payload.idempotency_key = Some(key.to_string());
	}

	let response = state.service.search(payload).await?;
	Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct LoadMoreParams {
	searcher_id: Uuid,
	#[serde(default)]
	offset: u32,
	#[serde(default)]
	limit: Option<u32>,
	#[serde(default)]
	history: bool,
}

async fn load_more(
	State(state): State<AppState>,
	Path(search_id): Path<Uuid>,
	Query(params): Query<LoadMoreParams>,
) -> Result<Json<LoadMoreResponse>, ApiError> {
	let response = state
		.service
		.load_more(LoadMoreRequest {
			searcher_id: params.searcher_id,
			search_id,
			offset: params.offset,
			limit: params.limit,
			history: params.history,
		})
		.await?;
	Ok(Json(response))
}

async fn update_record(
	State(state): State<AppState>,
	Json(payload): Json<UpdateRecordRequest>,
) -> Result<Json<UpdateRecordResponse>, ApiError> {
	let response = state.service.update_record(payload).await?;
	Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	retryable: bool,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	retryable: bool,
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let retryable = err.is_retryable();
		let (status, error_code) = match &err {
			ServiceError::InsufficientCredits { .. } =>
				(StatusCode::PAYMENT_REQUIRED, "insufficient_credits"),
			ServiceError::InvalidOrExpiredSearch { .. } =>
				(StatusCode::NOT_FOUND, "invalid_or_expired_search"),
			ServiceError::EmbeddingUnavailable { .. } =>
				(StatusCode::SERVICE_UNAVAILABLE, "embedding_unavailable"),
			ServiceError::InProgress => (StatusCode::CONFLICT, "in_progress"),
			ServiceError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
			ServiceError::Provider { .. } =>
				(StatusCode::INTERNAL_SERVER_ERROR, "provider_error"),
			ServiceError::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
		};

		Self { status, error_code: error_code.to_string(), message: err.to_string(), retryable }
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody {
			error_code: self.error_code,
			message: self.message,
			retryable: self.retryable,
		};
		(self.status, Json(body)).into_response()
	}
}
