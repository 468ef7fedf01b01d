use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};
use sage_config::GenerationProviderConfig;
use sage_domain::Role;

/// Asks an OpenAI-compatible chat endpoint to answer `query` from `passages`. The model is
/// told to cite passages as `[n]`, 1-based in the order given.
pub async fn generate(
	cfg: &GenerationProviderConfig,
	role: Role,
	query: &str,
	passages: &[String],
) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": build_messages(role, query, passages),
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_generation_response(json)
}

pub fn role_instructions(role: Role) -> &'static str {
	match role {
		Role::Customer =>
			"You are a helpful maintenance assistant for equipment operators. Answer in plain, \
			 simple language, avoid internal part numbers and engineering jargon, and recommend \
			 contacting support for anything that needs a technician.",
		Role::Engineer =>
			"You are a technical maintenance expert. Give precise troubleshooting steps, keep \
			 technical terminology, part numbers, tolerances and error codes as written in the \
			 sources.",
		Role::Admin =>
			"You are a maintenance expert with access to all technical and administrative \
			 documentation. Give complete answers, including configuration and escalation \
			 details where the sources provide them.",
	}
}

pub fn build_messages(role: Role, query: &str, passages: &[String]) -> Vec<Value> {
	let mut context = String::new();

	for (index, passage) in passages.iter().enumerate() {
		context.push_str(&format!("[{}] {}\n\n", index + 1, passage.trim()));
	}

	let user = format!(
		"Context passages:\n\n{context}Question: {query}\n\nAnswer only from the context \
		 passages. Cite every passage you rely on with its bracketed number, for example [1]. \
		 If the passages do not answer the question, say so."
	);

	vec![
		serde_json::json!({ "role": "system", "content": role_instructions(role) }),
		serde_json::json!({ "role": "user", "content": user }),
	]
}

fn parse_generation_response(json: Value) -> Result<String> {
	let content = json
		.get("choices")
		.and_then(Value::as_array)
		.and_then(|choices| choices.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|message| message.get("content"))
		.and_then(Value::as_str)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Generation response is missing message content.".to_string(),
		})?;

	if content.trim().is_empty() {
		return Err(Error::InvalidResponse {
			message: "Generation response content is empty.".to_string(),
		});
	}

	Ok(content.trim().to_string())
}
