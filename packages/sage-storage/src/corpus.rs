//! JSONL corpus files: one `PassageInput` object per line, blank lines ignored.

use std::path::Path;

use crate::{Error, Result};
use sage_domain::PassageInput;

pub async fn load_jsonl(path: &Path) -> Result<Vec<PassageInput>> {
	let raw = tokio::fs::read_to_string(path).await?;

	parse_jsonl(path, &raw)
}

pub fn parse_jsonl(path: &Path, raw: &str) -> Result<Vec<PassageInput>> {
	let mut passages = Vec::new();

	for (index, line) in raw.lines().enumerate() {
		if line.trim().is_empty() {
			continue;
		}

		let passage = serde_json::from_str(line).map_err(|err| Error::Corpus {
			path: path.to_path_buf(),
			line: index + 1,
			message: err.to_string(),
		})?;

		passages.push(passage);
	}

	tracing::info!(path = %path.display(), passages = passages.len(), "Corpus file parsed.");

	Ok(passages)
}
