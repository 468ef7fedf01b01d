use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid passage {id:?}: {message}")]
	InvalidPassage { id: String, message: String },
	#[error("Index unavailable: {message}")]
	IndexUnavailable { message: String },
	#[error("History unavailable: {message}")]
	HistoryUnavailable { message: String },
	#[error("Corpus file {path:?} line {line}: {message}")]
	Corpus { path: PathBuf, line: usize, message: String },
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
