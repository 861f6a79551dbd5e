pub type ServiceResult<T> = Result<T, ServiceError>;

/// The error taxonomy the HTTP surface maps to status codes. Provider
/// failures are converted at the gateway boundary, before any persistence
/// logic runs.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("Insufficient credits: {required} required, {balance} available.")]
	InsufficientCredits { required: i64, balance: i64 },
	#[error("Invalid or expired search: {message}")]
	InvalidOrExpiredSearch { message: String },
	#[error("Embedding service unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("A request with this idempotency key is already in progress.")]
	InProgress,
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl ServiceError {
	/// Retryable failures are transient service conditions, not client
	/// mistakes.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::EmbeddingUnavailable { .. } | Self::Storage { .. })
	}
}
impl From<sqlx::Error> for ServiceError {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<roster_storage::Error> for ServiceError {
	fn from(err: roster_storage::Error) -> Self {
		match err {
			roster_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			roster_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			roster_storage::Error::NotFound(message) =>
				Self::InvalidOrExpiredSearch { message },
			roster_storage::Error::Conflict(message) => Self::Storage { message },
		}
	}
}
