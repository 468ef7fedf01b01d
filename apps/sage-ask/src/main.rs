use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use color_eyre::eyre;

use sage_domain::AccessRule;
use sage_service::{IngestRequest, QueryRequest, SageService, SearchRequest};
use sage_storage::{MemoryHistory, MemoryIndex, corpus};

/// Answers one question against a corpus file and prints the response as JSON.
#[derive(Debug, Parser)]
#[command(
	version = sage_cli::VERSION,
	rename_all = "kebab",
	styles = sage_cli::styles(),
)]
struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	config: PathBuf,
	/// JSON Lines corpus. Overrides `storage.corpus_path`.
	#[arg(long, value_name = "FILE")]
	corpus: Option<PathBuf>,
	#[arg(long, short = 'r', default_value = "customer")]
	role: String,
	/// Only retrieve; skip answer composition.
	#[arg(long)]
	search_only: bool,
	#[arg(value_name = "QUESTION", required = true, num_args = 1..)]
	question: Vec<String>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();
	let config = sage_config::load(&args.config)?;

	sage_cli::init_tracing(&config.service.log_level);

	let corpus_path =
		args.corpus.or_else(|| config.storage.corpus_path.as_ref().map(PathBuf::from));
	let Some(corpus_path) = corpus_path else {
		return Err(eyre::eyre!("No corpus given. Pass --corpus or set storage.corpus_path."));
	};
	let access = AccessRule::from_config(&config.access)?;
	let index = Arc::new(MemoryIndex::new(config.providers.embedding.dimensions as usize));
	let service = SageService::new(config, access, index, Arc::new(MemoryHistory::new()));
	let passages = corpus::load_jsonl(&corpus_path).await?;

	if !passages.is_empty() {
		service.ingest(IngestRequest { passages }).await?;
	}

	let text = args.question.join(" ");
	let output = if args.search_only {
		let response = service
			.search(SearchRequest { text, role: args.role, top_k: None })
			.await?;

		serde_json::to_string_pretty(&response)?
	} else {
		let response = service.process_query(QueryRequest { text, role: args.role }).await?;

		serde_json::to_string_pretty(&response)?
	};

	println!("{output}");

	Ok(())
}
