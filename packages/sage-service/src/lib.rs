pub mod compose;
pub mod history;
pub mod ingest;
pub mod pipeline;
pub mod query;
pub mod search;

mod embed;
mod error;

pub use error::{Error, QueryFailure, Result};
pub use history::{HistoryRequest, HistoryResponse};
pub use ingest::{IngestRequest, IngestResponse, RemoveDocumentResponse};
pub use pipeline::Stage;
pub use query::{QueryMetadata, QueryRequest, QueryResponse, SourceRef};
pub use search::{SearchRequest, SearchResponse};

use std::{future, sync::Arc};

use sage_config::{
	Config, EmbeddingKind, EmbeddingProviderConfig, GenerationKind, GenerationProviderConfig,
};
use sage_domain::{AccessRule, BoxFuture, Role};
use sage_providers::{embedding, extractive, generation, hashing};
use sage_storage::{HistoryStore, PassageIndex};

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, sage_providers::Result<Vec<Vec<f32>>>>;
}

/// Turns retrieved passages into prose. Passages are numbered from 1 in the order given and
/// the text is expected to cite them as `[n]`.
pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		role: Role,
		query: &'a str,
		passages: &'a [String],
	) -> BoxFuture<'a, sage_providers::Result<String>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub generation: Arc<dyn GenerationProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		generation: Arc<dyn GenerationProvider>,
	) -> Self {
		Self { embedding, generation }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), generation: provider }
	}
}

pub struct SageService {
	pub cfg: Config,
	pub access: AccessRule,
	pub index: Arc<dyn PassageIndex>,
	pub history: Arc<dyn HistoryStore>,
	pub providers: Providers,
}
impl SageService {
	pub fn new(
		cfg: Config,
		access: AccessRule,
		index: Arc<dyn PassageIndex>,
		history: Arc<dyn HistoryStore>,
	) -> Self {
		Self { cfg, access, index, history, providers: Providers::default() }
	}

	pub fn with_providers(
		cfg: Config,
		access: AccessRule,
		index: Arc<dyn PassageIndex>,
		history: Arc<dyn HistoryStore>,
		providers: Providers,
	) -> Self {
		Self { cfg, access, index, history, providers }
	}

	pub(crate) fn embedding_model(&self) -> String {
		let cfg = &self.cfg.providers.embedding;

		match cfg.kind {
			EmbeddingKind::Http => cfg.model.clone(),
			EmbeddingKind::Hash => hashing::HASH_MODEL_ID.to_string(),
		}
	}

	pub(crate) fn generation_model(&self) -> String {
		let cfg = &self.cfg.providers.generation;

		match cfg.kind {
			GenerationKind::Http => cfg.model.clone(),
			GenerationKind::Extractive => extractive::EXTRACTIVE_MODEL_ID.to_string(),
		}
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, sage_providers::Result<Vec<Vec<f32>>>> {
		match cfg.kind {
			EmbeddingKind::Http => Box::pin(embedding::embed(cfg, texts)),
			EmbeddingKind::Hash => {
				let dimensions = cfg.dimensions as usize;
				let vectors: Vec<Vec<f32>> =
					texts.iter().map(|text| hashing::hash_embedding(text, dimensions)).collect();

				Box::pin(future::ready(Ok(vectors)))
			},
		}
	}
}
impl GenerationProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		role: Role,
		query: &'a str,
		passages: &'a [String],
	) -> BoxFuture<'a, sage_providers::Result<String>> {
		match cfg.kind {
			GenerationKind::Http => Box::pin(generation::generate(cfg, role, query, passages)),
			GenerationKind::Extractive =>
				Box::pin(future::ready(Ok(extractive::compose(role, query, passages)))),
		}
	}
}
