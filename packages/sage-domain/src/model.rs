use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Partition, Role};

/// An indexed chunk of a source document. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
	pub id: String,
	pub document_id: String,
	pub partition: Partition,
	pub text: String,
	pub embedding: Vec<f32>,
}

/// A passage as supplied by the ingestion side. The vector is optional; passages without one
/// are embedded on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageInput {
	pub id: String,
	pub document_id: String,
	pub partition: Partition,
	pub text: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub embedding: Option<Vec<f32>>,
}
impl PassageInput {
	pub fn into_passage(self, embedding: Vec<f32>) -> Passage {
		Passage {
			id: self.id,
			document_id: self.document_id,
			partition: self.partition,
			text: self.text,
			embedding,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
	pub id: Uuid,
	pub role: Role,
	pub text: String,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
}
impl Query {
	pub fn new(id: Uuid, role: Role, text: impl Into<String>) -> Self {
		Self { id, role, text: text.into(), created_at: OffsetDateTime::now_utc() }
	}
}

#[derive(Debug, Clone)]
pub struct ScoredPassage {
	pub passage: Arc<Passage>,
	pub score: f32,
}

/// Ranked hits for one query: at most `k`, best first, allowed partitions only.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
	pub hits: Vec<ScoredPassage>,
}
impl RetrievalResult {
	pub fn is_empty(&self) -> bool {
		self.hits.is_empty()
	}

	pub fn len(&self) -> usize {
		self.hits.len()
	}

	pub fn top_score(&self) -> Option<f32> {
		self.hits.first().map(|hit| hit.score)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
	pub query_id: Uuid,
	pub text: String,
	pub citations: Vec<String>,
	pub confidence: f32,
}

/// Result of embedding a text. `Fallback` marks a degraded hash vector produced because the
/// model was unavailable.
#[derive(Debug, Clone, PartialEq)]
pub enum Embedding {
	Real(Vec<f32>),
	Fallback(Vec<f32>),
}
impl Embedding {
	pub fn vector(&self) -> &[f32] {
		match self {
			Self::Real(vector) | Self::Fallback(vector) => vector,
		}
	}

	pub fn into_vector(self) -> Vec<f32> {
		match self {
			Self::Real(vector) | Self::Fallback(vector) => vector,
		}
	}

	pub fn source(&self) -> EmbeddingSource {
		match self {
			Self::Real(_) => EmbeddingSource::Model,
			Self::Fallback(_) => EmbeddingSource::Fallback,
		}
	}

	pub fn is_degraded(&self) -> bool {
		matches!(self, Self::Fallback(_))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingSource {
	Model,
	Fallback,
}

/// One completed query as handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
	pub query: Query,
	pub answer: Answer,
	pub embedding: EmbeddingSource,
	pub partitions: Vec<Partition>,
	pub elapsed_ms: u64,
}
