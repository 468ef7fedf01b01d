use serde::{Deserialize, Serialize};

use sage_domain::{Passage, PassageInput};
use sage_storage::IndexStats;

use crate::{Error, Result, SageService};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestRequest {
	pub passages: Vec<PassageInput>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestResponse {
	pub upserted: usize,
	/// Passages that arrived without a vector and were embedded here.
	pub embedded: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoveDocumentResponse {
	pub document_id: String,
	pub removed: usize,
}

impl SageService {
	/// Adds or replaces passages. Passages without a vector are embedded with the configured
	/// provider in one batch; the whole batch fails if that provider is unavailable.
	pub async fn ingest(&self, req: IngestRequest) -> Result<IngestResponse> {
		if req.passages.is_empty() {
			return Err(Error::InvalidRequest {
				message: "passages must be non-empty.".to_string(),
			});
		}

		let missing: Vec<String> = req
			.passages
			.iter()
			.filter(|passage| passage.embedding.is_none())
			.map(|passage| passage.text.clone())
			.collect();
		let embedded = missing.len();
		let mut vectors = self.embed_passages(&missing).await?.into_iter();
		let mut passages: Vec<Passage> = Vec::with_capacity(req.passages.len());

		for mut input in req.passages {
			let embedding = match input.embedding.take() {
				Some(embedding) => embedding,
				None => vectors.next().ok_or_else(|| Error::EmbeddingUnavailable {
					message: "Embedding provider returned too few vectors.".to_string(),
				})?,
			};

			passages.push(input.into_passage(embedding));
		}

		let upserted = self.index.upsert(passages).await.map_err(storage_error)?;

		tracing::info!(upserted, embedded, "Passages ingested.");

		Ok(IngestResponse { upserted, embedded })
	}

	/// Removes every passage of a document. Searches started after this returns never see
	/// the document.
	pub async fn remove_document(&self, document_id: &str) -> Result<RemoveDocumentResponse> {
		let document_id = document_id.trim();

		if document_id.is_empty() {
			return Err(Error::InvalidRequest {
				message: "document_id must be non-empty.".to_string(),
			});
		}

		let removed = self.index.remove_document(document_id).await.map_err(storage_error)?;

		tracing::info!(document_id, removed, "Document removed.");

		Ok(RemoveDocumentResponse { document_id: document_id.to_string(), removed })
	}

	pub async fn stats(&self) -> Result<IndexStats> {
		self.index.stats().await.map_err(storage_error)
	}
}

fn storage_error(err: sage_storage::Error) -> Error {
	match err {
		sage_storage::Error::InvalidPassage { id, message } =>
			Error::InvalidPassage { message: format!("{id:?}: {message}") },
		other => Error::IndexUnavailable { attempts: 1, message: other.to_string() },
	}
}
