use uuid::Uuid;

use crate::pipeline::Stage;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Unknown role {role:?}.")]
	UnknownRole { role: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Embedding unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("Index unavailable after {attempts} attempt(s): {message}")]
	IndexUnavailable { attempts: u32, message: String },
	#[error("Generation unavailable: {message}")]
	GenerationUnavailable { message: String },
	#[error("History unavailable: {message}")]
	HistoryUnavailable { message: String },
	#[error("{stage} stage exceeded its {timeout_ms} ms deadline.")]
	Timeout { stage: Stage, timeout_ms: u64 },
	#[error("Access violation: {message}")]
	AccessViolation { message: String },
	#[error("Invalid passage: {message}")]
	InvalidPassage { message: String },
}
impl Error {
	/// Stable machine-readable code.
	pub fn code(&self) -> &'static str {
		match self {
			Self::UnknownRole { .. } => "UNKNOWN_ROLE",
			Self::InvalidRequest { .. } => "INVALID_REQUEST",
			Self::EmbeddingUnavailable { .. } => "EMBEDDING_UNAVAILABLE",
			Self::IndexUnavailable { .. } => "INDEX_UNAVAILABLE",
			Self::GenerationUnavailable { .. } => "GENERATION_UNAVAILABLE",
			Self::HistoryUnavailable { .. } => "HISTORY_UNAVAILABLE",
			Self::Timeout { .. } => "TIMEOUT",
			Self::AccessViolation { .. } => "ACCESS_VIOLATION",
			Self::InvalidPassage { .. } => "INVALID_PASSAGE",
		}
	}
}
impl From<sage_domain::Error> for Error {
	fn from(err: sage_domain::Error) -> Self {
		match err {
			sage_domain::Error::UnknownRole { role } => Self::UnknownRole { role },
			other => Self::InvalidRequest { message: other.to_string() },
		}
	}
}

/// A query that ended in the `Failed` state. No answer accompanies it.
#[derive(Debug, thiserror::Error)]
#[error("Query {query_id} failed during {stage}: {error}")]
pub struct QueryFailure {
	pub query_id: Uuid,
	pub stage: Stage,
	#[source]
	pub error: Error,
}
impl QueryFailure {
	pub fn code(&self) -> &'static str {
		self.error.code()
	}
}
