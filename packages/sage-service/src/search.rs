use serde::{Deserialize, Serialize};

use sage_domain::{EmbeddingSource, Partition, PartitionSet, RetrievalResult};

use crate::{
	Error, Result, SageService, SourceRef,
	pipeline::{self, Stage},
	query,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRequest {
	pub text: String,
	pub role: String,
	#[serde(default)]
	pub top_k: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResponse {
	pub partitions: Vec<Partition>,
	pub embedding: EmbeddingSource,
	pub hits: Vec<SourceRef>,
}

impl SageService {
	/// Tier-filtered retrieval without composition. Nothing is recorded in history.
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let (_, allowed) = self.access.resolve(&req.role)?;
		let text = query::validate_text(&req.text, self.cfg.retrieval.max_query_chars as usize)?;
		let top_k = self.resolve_top_k(req.top_k)?;
		let pipeline_cfg = &self.cfg.pipeline;
		let embedding = pipeline::with_deadline(
			Stage::Embedding,
			pipeline_cfg.embed_timeout_ms,
			self.embed_query(&text),
		)
		.await?;
		let result = pipeline::with_deadline(
			Stage::Retrieving,
			pipeline_cfg.search_timeout_ms,
			self.retrieve(embedding.vector(), allowed, top_k),
		)
		.await?;
		let preview_chars = self.cfg.retrieval.preview_chars as usize;

		Ok(SearchResponse {
			partitions: allowed.iter().copied().collect(),
			embedding: embedding.source(),
			hits: result.hits.iter().map(|hit| SourceRef::from_hit(hit, preview_chars)).collect(),
		})
	}

	pub(crate) fn resolve_top_k(&self, requested: Option<u32>) -> Result<usize> {
		let retrieval = &self.cfg.retrieval;

		match requested {
			None => Ok(retrieval.top_k as usize),
			Some(0) => Err(Error::InvalidRequest {
				message: "top_k must be greater than zero.".to_string(),
			}),
			Some(k) => Ok(k.min(retrieval.max_top_k) as usize),
		}
	}

	/// Searches the index with bounded retries and re-checks every hit against `allowed`.
	pub(crate) async fn retrieve(
		&self,
		vector: &[f32],
		allowed: &PartitionSet,
		k: usize,
	) -> Result<RetrievalResult> {
		let pipeline_cfg = &self.cfg.pipeline;
		let max_attempts = pipeline_cfg.index_max_attempts.max(1);
		let mut attempt = 1;

		loop {
			match self.index.search(vector, allowed, k).await {
				Ok(mut result) => {
					verify_partitions(&result, allowed)?;

					result.hits.truncate(k);

					return Ok(result);
				},
				Err(err) if attempt < max_attempts => {
					tracing::warn!(attempt, error = %err, "Index search failed. Retrying.");

					tokio::time::sleep(pipeline::backoff_for_attempt(pipeline_cfg, attempt)).await;

					attempt += 1;
				},
				Err(err) => {
					return Err(Error::IndexUnavailable {
						attempts: attempt,
						message: err.to_string(),
					});
				},
			}
		}
	}
}

fn verify_partitions(result: &RetrievalResult, allowed: &PartitionSet) -> Result<()> {
	match result.hits.iter().find(|hit| !allowed.contains(&hit.passage.partition)) {
		Some(hit) => Err(Error::AccessViolation {
			message: format!(
				"Index returned passage {} from {}, which the requester may not read.",
				hit.passage.id, hit.passage.partition
			),
		}),
		None => Ok(()),
	}
}
