use std::sync::LazyLock;

use regex::Regex;

use sage_config::Composer;
use sage_domain::{Answer, Query, RetrievalResult, Role, ScoredPassage};

use crate::{Error, Result, SageService, pipeline};

static CITATION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").ok());

impl SageService {
	/// Builds the answer for `query` from ranked passages. The role flavors both the
	/// generator prompt and the empty-result text.
	pub async fn compose(
		&self,
		query: &Query,
		role: Role,
		result: &RetrievalResult,
	) -> Result<Answer> {
		if result.is_empty() {
			return Ok(Answer {
				query_id: query.id,
				text: no_information_text(role).to_string(),
				citations: Vec::new(),
				confidence: 0.0,
			});
		}

		let composer = &self.cfg.composer;
		let passages = passage_texts(result, composer.max_passage_chars as usize);
		let text = self.generate_with_retry(query, role, &passages).await?;
		let citations = extract_citations(&text, &result.hits);

		Ok(Answer { query_id: query.id, text, citations, confidence: confidence(composer, result) })
	}

	async fn generate_with_retry(
		&self,
		query: &Query,
		role: Role,
		passages: &[String],
	) -> Result<String> {
		let cfg = &self.cfg.providers.generation;
		let max_attempts = self.cfg.pipeline.generation_max_attempts.max(1);
		let mut last_error = String::new();

		for attempt in 1..=max_attempts {
			match self.providers.generation.generate(cfg, role, &query.text, passages).await {
				Ok(text) => return Ok(text),
				Err(err) => {
					tracing::warn!(
						query_id = %query.id,
						attempt,
						error = %err,
						"Generation attempt failed."
					);

					last_error = err.to_string();

					if attempt < max_attempts {
						let delay = pipeline::backoff_for_attempt(&self.cfg.pipeline, attempt);

						tokio::time::sleep(delay).await;
					}
				},
			}
		}

		Err(Error::GenerationUnavailable { message: last_error })
	}
}

pub fn no_information_text(role: Role) -> &'static str {
	match role {
		Role::Customer =>
			"Sorry, I could not find anything about this in our guides. Please contact support \
			 for further help.",
		Role::Engineer =>
			"No relevant information was found in the customer or engineering knowledge bases.",
		Role::Admin => "No relevant information was found in any knowledge base.",
	}
}

/// `top * (w + (1 - w) * n / (n + h))`, clamped to [0, 1].
///
/// `top` is the best similarity clamped to [0, 1], `n` counts hits at or above the
/// corroboration threshold, `w` is the top-score weight and `h` the half-saturation count.
/// Non-decreasing in both `top` and `n`.
pub fn confidence(composer: &Composer, result: &RetrievalResult) -> f32 {
	let Some(top) = result.top_score() else {
		return 0.0;
	};
	let top = top.clamp(0.0, 1.0);
	let n = result.hits.iter().filter(|hit| hit.score >= composer.corroboration_threshold).count()
		as f32;
	let w = composer.top_score_weight;
	let corroboration = n / (n + composer.half_saturation);

	(top * (w + (1.0 - w) * corroboration)).clamp(0.0, 1.0)
}

/// Passage ids in order of first `[n]` reference. Out-of-range references are ignored; text
/// that references nothing cites every passage in rank order.
pub fn extract_citations(text: &str, hits: &[ScoredPassage]) -> Vec<String> {
	let mut citations: Vec<String> = Vec::new();

	if let Some(re) = CITATION.as_ref() {
		for caps in re.captures_iter(text) {
			let Some(index) = caps.get(1).and_then(|m| m.as_str().parse::<usize>().ok()) else {
				continue;
			};
			let Some(hit) = index.checked_sub(1).and_then(|i| hits.get(i)) else {
				continue;
			};

			if !citations.contains(&hit.passage.id) {
				citations.push(hit.passage.id.clone());
			}
		}
	}

	if citations.is_empty() {
		return hits.iter().map(|hit| hit.passage.id.clone()).collect();
	}

	citations
}

pub(crate) fn passage_texts(result: &RetrievalResult, max_chars: usize) -> Vec<String> {
	result.hits.iter().map(|hit| truncate_chars(&hit.passage.text, max_chars).to_string()).collect()
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
	match text.char_indices().nth(max_chars) {
		Some((end, _)) => &text[..end],
		None => text,
	}
}
