use std::{path::Path, sync::Arc};

use sage_config::Config;
use sage_domain::AccessRule;
use sage_service::{IngestRequest, SageService};
use sage_storage::{HistoryStore, JsonlHistory, MemoryHistory, MemoryIndex, corpus};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<SageService>,
}
impl AppState {
	/// Builds the service from config and loads the corpus file, if one is configured.
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let access = AccessRule::from_config(&config.access)?;
		let index = Arc::new(MemoryIndex::new(config.providers.embedding.dimensions as usize));
		let history: Arc<dyn HistoryStore> = match config.storage.history_path.as_deref() {
			Some(path) => Arc::new(JsonlHistory::open(path).await?),
			None => Arc::new(MemoryHistory::new()),
		};
		let corpus_path = config.storage.corpus_path.clone();
		let service = SageService::new(config, access, index, history);

		if let Some(path) = corpus_path {
			let passages = corpus::load_jsonl(Path::new(&path)).await?;

			if !passages.is_empty() {
				let report = service.ingest(IngestRequest { passages }).await?;

				tracing::info!(path = %path, upserted = report.upserted, "Corpus loaded.");
			}
		}

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: SageService) -> Self {
		Self { service: Arc::new(service) }
	}
}
