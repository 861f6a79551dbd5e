pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Message(String),
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	Storage(#[from] roster_storage::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
