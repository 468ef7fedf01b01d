mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Access, Composer, Config, EmbeddingKind, EmbeddingProviderConfig, GenerationKind,
	GenerationProviderConfig, Pipeline, Providers, Retrieval, Security, Service, Storage,
};

use std::{fs, path::Path};

const PARTITION_LABELS: [&str; 3] = ["customer_kb", "engineer_kb", "admin_kb"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } =>
			Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

/// Parses, normalizes and validates a config document that is already in memory.
pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (key, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
	] {
		if value.trim().is_empty() {
			return Err(Error::invalid(key, "must be non-empty."));
		}
	}

	validate_pipeline(cfg)?;
	validate_embedding(cfg)?;
	validate_generation(cfg)?;
	validate_access(&cfg.access)?;
	validate_retrieval(cfg)?;
	validate_composer(cfg)?;

	Ok(())
}

fn validate_embedding(cfg: &Config) -> Result<()> {
	let embedding = &cfg.providers.embedding;

	if embedding.dimensions == 0 {
		return Err(Error::invalid("providers.embedding.dimensions", "must be greater than zero."));
	}
	if embedding.kind == EmbeddingKind::Http {
		for (key, value) in [
			("providers.embedding.provider_id", &embedding.provider_id),
			("providers.embedding.api_base", &embedding.api_base),
			("providers.embedding.api_key", &embedding.api_key),
			("providers.embedding.model", &embedding.model),
		] {
			if value.trim().is_empty() {
				return Err(Error::invalid(key, "must be non-empty when kind is http."));
			}
		}

		if embedding.timeout_ms == 0 {
			return Err(Error::invalid(
				"providers.embedding.timeout_ms",
				"must be greater than zero.",
			));
		}
		if embedding.fallback && embedding.timeout_ms >= cfg.pipeline.embed_timeout_ms {
			return Err(Error::invalid(
				"providers.embedding.timeout_ms",
				"must be less than pipeline.embed_timeout_ms when fallback is enabled.",
			));
		}
	}

	Ok(())
}

fn validate_generation(cfg: &Config) -> Result<()> {
	let generation = &cfg.providers.generation;

	if generation.kind != GenerationKind::Http {
		return Ok(());
	}

	for (key, value) in [
		("providers.generation.provider_id", &generation.provider_id),
		("providers.generation.api_base", &generation.api_base),
		("providers.generation.api_key", &generation.api_key),
		("providers.generation.model", &generation.model),
	] {
		if value.trim().is_empty() {
			return Err(Error::invalid(key, "must be non-empty when kind is http."));
		}
	}

	if !generation.temperature.is_finite() || !(0.0..=2.0).contains(&generation.temperature) {
		return Err(Error::invalid(
			"providers.generation.temperature",
			"must be a finite number in the range 0.0-2.0.",
		));
	}
	if generation.timeout_ms == 0 {
		return Err(Error::invalid("providers.generation.timeout_ms", "must be greater than zero."));
	}

	// Every attempt plus the backoff between them must fit in the composing deadline.
	let pipeline = &cfg.pipeline;
	let attempts = u64::from(pipeline.generation_max_attempts);
	let budget = generation
		.timeout_ms
		.saturating_mul(attempts)
		.saturating_add(pipeline.max_backoff_ms.saturating_mul(attempts.saturating_sub(1)));

	if budget >= pipeline.generation_timeout_ms {
		return Err(Error::invalid(
			"providers.generation.timeout_ms",
			format!(
				"must leave room for {attempts} attempts and backoff within \
				 pipeline.generation_timeout_ms ({budget} >= {}).",
				pipeline.generation_timeout_ms
			),
		));
	}

	Ok(())
}

fn validate_access(access: &Access) -> Result<()> {
	for (key, labels) in [
		("access.customer", &access.customer),
		("access.engineer", &access.engineer),
		("access.admin", &access.admin),
	] {
		if let Some(label) = labels.iter().find(|label| !PARTITION_LABELS.contains(&label.as_str()))
		{
			return Err(Error::invalid(
				key,
				format!(
					"contains unknown partition {label:?}; expected customer_kb, engineer_kb or \
					 admin_kb."
				),
			));
		}
		if !labels.iter().any(|label| label == "customer_kb") {
			return Err(Error::invalid(key, "must include customer_kb."));
		}
	}

	if access.customer.iter().any(|label| label != "customer_kb") {
		return Err(Error::invalid("access.customer", "may only include customer_kb."));
	}
	if access.engineer.iter().any(|label| label == "admin_kb") {
		return Err(Error::invalid("access.engineer", "must not include admin_kb."));
	}

	Ok(())
}

fn validate_retrieval(cfg: &Config) -> Result<()> {
	let retrieval = &cfg.retrieval;

	if retrieval.top_k == 0 {
		return Err(Error::invalid("retrieval.top_k", "must be greater than zero."));
	}
	if retrieval.max_top_k < retrieval.top_k {
		return Err(Error::invalid("retrieval.max_top_k", "must be at least retrieval.top_k."));
	}
	if retrieval.max_query_chars == 0 {
		return Err(Error::invalid("retrieval.max_query_chars", "must be greater than zero."));
	}

	Ok(())
}

fn validate_composer(cfg: &Config) -> Result<()> {
	let composer = &cfg.composer;

	for (key, value) in [
		("composer.corroboration_threshold", composer.corroboration_threshold),
		("composer.top_score_weight", composer.top_score_weight),
	] {
		if !value.is_finite() || !(0.0..=1.0).contains(&value) {
			return Err(Error::invalid(key, "must be a finite number in the range 0.0-1.0."));
		}
	}

	if !composer.half_saturation.is_finite() || composer.half_saturation <= 0.0 {
		return Err(Error::invalid(
			"composer.half_saturation",
			"must be a finite number greater than zero.",
		));
	}
	if composer.max_passage_chars == 0 {
		return Err(Error::invalid("composer.max_passage_chars", "must be greater than zero."));
	}

	Ok(())
}

fn validate_pipeline(cfg: &Config) -> Result<()> {
	let pipeline = &cfg.pipeline;

	for (key, value) in [
		("pipeline.embed_timeout_ms", pipeline.embed_timeout_ms),
		("pipeline.search_timeout_ms", pipeline.search_timeout_ms),
		("pipeline.generation_timeout_ms", pipeline.generation_timeout_ms),
		("pipeline.history_timeout_ms", pipeline.history_timeout_ms),
	] {
		if value == 0 {
			return Err(Error::invalid(key, "must be greater than zero."));
		}
	}

	if pipeline.index_max_attempts == 0 {
		return Err(Error::invalid("pipeline.index_max_attempts", "must be greater than zero."));
	}
	if !(1..=2).contains(&pipeline.generation_max_attempts) {
		return Err(Error::invalid("pipeline.generation_max_attempts", "must be 1 or 2."));
	}
	if pipeline.max_backoff_ms < pipeline.base_backoff_ms {
		return Err(Error::invalid(
			"pipeline.max_backoff_ms",
			"must be at least pipeline.base_backoff_ms.",
		));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for path in [&mut cfg.storage.corpus_path, &mut cfg.storage.history_path] {
		if path.as_deref().map(|value| value.trim().is_empty()).unwrap_or(false) {
			*path = None;
		}
	}

	for labels in [&mut cfg.access.customer, &mut cfg.access.engineer, &mut cfg.access.admin] {
		for label in labels.iter_mut() {
			*label = label.trim().to_ascii_lowercase();

			// Older deployments call the admin tier the master knowledge base.
			if label == "master_kb" {
				*label = "admin_kb".to_string();
			}
		}

		labels.sort();
		labels.dedup();
	}

	cfg.providers.embedding.api_base =
		cfg.providers.embedding.api_base.trim_end_matches('/').to_string();
	cfg.providers.generation.api_base =
		cfg.providers.generation.api_base.trim_end_matches('/').to_string();
}
