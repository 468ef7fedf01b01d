use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sage_domain::{Answer, EmbeddingSource, HistoryEntry, Partition, Query, ScoredPassage};

use crate::{
	Error, QueryFailure, Result, SageService,
	compose,
	pipeline::{self, QueryPipeline, Stage},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryRequest {
	pub text: String,
	pub role: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryResponse {
	pub answer: Answer,
	pub sources: Vec<SourceRef>,
	pub metadata: QueryMetadata,
}

/// A retrieved passage as shown to the requester.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
	pub passage_id: String,
	pub document_id: String,
	pub partition: Partition,
	pub score: f32,
	pub preview: String,
}
impl SourceRef {
	pub(crate) fn from_hit(hit: &ScoredPassage, preview_chars: usize) -> Self {
		Self {
			passage_id: hit.passage.id.clone(),
			document_id: hit.passage.document_id.clone(),
			partition: hit.passage.partition,
			score: hit.score,
			preview: preview(&hit.passage.text, preview_chars),
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryMetadata {
	pub embedding: EmbeddingSource,
	pub degraded: bool,
	pub partitions: Vec<Partition>,
	pub retrieved: usize,
	pub elapsed_ms: u64,
	pub embedding_model: String,
	pub generation_model: String,
}

impl SageService {
	/// Runs one query through the pipeline. On success exactly one history entry has been
	/// recorded; on failure no answer is returned.
	///
	/// Dropping the returned future cancels the query. Nothing is persisted unless the
	/// history write had already completed.
	pub async fn process_query(&self, req: QueryRequest) -> Result<QueryResponse, QueryFailure> {
		let mut run = QueryPipeline::start(Uuid::new_v4(), &req.role);
		let (role, allowed) = self.access.resolve(&req.role).map_err(|err| run.fail(err.into()))?;
		let text = validate_text(&req.text, self.cfg.retrieval.max_query_chars as usize)
			.map_err(|err| run.fail(err))?;
		let query = Query::new(run.query_id(), role, text);
		let pipeline_cfg = &self.cfg.pipeline;

		run.advance(Stage::Embedding);

		let embedding = pipeline::with_deadline(
			Stage::Embedding,
			pipeline_cfg.embed_timeout_ms,
			self.embed_query(&query.text),
		)
		.await
		.map_err(|err| run.fail(err))?;

		run.advance(Stage::Retrieving);

		let result = pipeline::with_deadline(
			Stage::Retrieving,
			pipeline_cfg.search_timeout_ms,
			self.retrieve(embedding.vector(), allowed, self.cfg.retrieval.top_k as usize),
		)
		.await
		.map_err(|err| run.fail(err))?;

		run.advance(Stage::Composing);

		let answer = pipeline::with_deadline(
			Stage::Composing,
			pipeline_cfg.generation_timeout_ms,
			self.compose(&query, role, &result),
		)
		.await
		.map_err(|err| run.fail(err))?;
		let partitions: Vec<Partition> = allowed.iter().copied().collect();
		let entry = HistoryEntry {
			query,
			answer,
			embedding: embedding.source(),
			partitions: partitions.clone(),
			elapsed_ms: run.elapsed_ms(),
		};

		pipeline::with_deadline(
			Stage::Composing,
			pipeline_cfg.history_timeout_ms,
			self.record_history(&entry),
		)
		.await
		.map_err(|err| run.fail(err))?;

		let elapsed_ms = run.complete();
		let preview_chars = self.cfg.retrieval.preview_chars as usize;
		let sources =
			result.hits.iter().map(|hit| SourceRef::from_hit(hit, preview_chars)).collect();

		if embedding.is_degraded() {
			tracing::warn!(query_id = %entry.query.id, "Query answered with a degraded embedding.");
		}

		Ok(QueryResponse {
			answer: entry.answer,
			sources,
			metadata: QueryMetadata {
				embedding: embedding.source(),
				degraded: embedding.is_degraded(),
				partitions,
				retrieved: result.len(),
				elapsed_ms,
				embedding_model: self.embedding_model(),
				generation_model: self.generation_model(),
			},
		})
	}
}

pub(crate) fn validate_text(raw: &str, max_chars: usize) -> Result<String> {
	let text = raw.trim();

	if text.is_empty() {
		return Err(Error::InvalidRequest { message: "Query text must be non-empty.".to_string() });
	}
	if text.chars().count() > max_chars {
		return Err(Error::InvalidRequest {
			message: format!("Query text must be at most {max_chars} characters."),
		});
	}

	Ok(text.to_string())
}

/// First `chars` characters of `text`, with `...` appended when anything was cut.
pub fn preview(text: &str, chars: usize) -> String {
	let head = compose::truncate_chars(text, chars);

	if head.len() < text.len() { format!("{head}...") } else { head.to_string() }
}
