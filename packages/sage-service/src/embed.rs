use sage_domain::Embedding;
use sage_providers::hashing;

use crate::{Error, Result, SageService};

impl SageService {
	/// Embeds query text. When the provider fails or answers with the wrong shape, falls back
	/// to the hash embedder if configured to; otherwise the query fails.
	pub(crate) async fn embed_query(&self, text: &str) -> Result<Embedding> {
		let cfg = &self.cfg.providers.embedding;
		let dimensions = cfg.dimensions as usize;
		let texts = [text.to_string()];
		let outcome = self.providers.embedding.embed(cfg, &texts).await;

		match check_vectors(outcome, 1, dimensions) {
			Ok(vectors) => match vectors.into_iter().next() {
				Some(vector) => Ok(Embedding::Real(vector)),
				None => Err(Error::EmbeddingUnavailable {
					message: "Embedding provider returned no vectors.".to_string(),
				}),
			},
			Err(message) if cfg.fallback => {
				tracing::warn!(
					provider_id = %cfg.provider_id,
					error = %message,
					"Embedding provider unavailable. Using hash fallback."
				);

				Ok(Embedding::Fallback(hashing::hash_embedding(text, dimensions)))
			},
			Err(message) => Err(Error::EmbeddingUnavailable { message }),
		}
	}

	/// Embeds passage texts for storage. Fallback vectors are never stored.
	pub(crate) async fn embed_passages(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		if texts.is_empty() {
			return Ok(Vec::new());
		}

		let cfg = &self.cfg.providers.embedding;
		let outcome = self.providers.embedding.embed(cfg, texts).await;

		check_vectors(outcome, texts.len(), cfg.dimensions as usize)
			.map_err(|message| Error::EmbeddingUnavailable { message })
	}
}

fn check_vectors(
	outcome: sage_providers::Result<Vec<Vec<f32>>>,
	expected: usize,
	dimensions: usize,
) -> Result<Vec<Vec<f32>>, String> {
	let vectors = outcome.map_err(|err| err.to_string())?;

	if vectors.len() != expected {
		return Err(format!(
			"Embedding provider returned {} vectors for {expected} inputs.",
			vectors.len()
		));
	}
	if let Some(vector) = vectors.iter().find(|vector| vector.len() != dimensions) {
		return Err(format!(
			"Embedding vector has {} dimensions, expected {dimensions}.",
			vector.len()
		));
	}
	if vectors.iter().flatten().any(|value| !value.is_finite()) {
		return Err("Embedding vector contains non-finite values.".to_string());
	}

	Ok(vectors)
}
