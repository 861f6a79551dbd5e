pub mod credits;
pub mod db;
pub mod idempotency;
pub mod models;
pub mod outbox;
pub mod queries;
pub mod schema;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Render a vector as the pgvector text literal, e.g. `[0.1,0.2]`.
pub fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);
	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}
		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}
