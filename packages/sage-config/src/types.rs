use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	#[serde(default)]
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub access: Access,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub composer: Composer,
	#[serde(default)]
	pub pipeline: Pipeline,
	#[serde(default)]
	pub security: Security,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Storage {
	/// JSON Lines file of passages loaded into the index at startup.
	pub corpus_path: Option<String>,
	/// JSON Lines file that receives one history entry per completed query. History is kept
	/// in memory when unset.
	pub history_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generation: GenerationProviderConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingKind {
	Http,
	Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
	Http,
	Extractive,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub kind: EmbeddingKind,
	#[serde(default)]
	pub provider_id: String,
	#[serde(default)]
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	#[serde(default)]
	pub path: String,
	#[serde(default)]
	pub model: String,
	#[serde(default = "default_dimensions")]
	pub dimensions: u32,
	#[serde(default = "default_embedding_timeout_ms")]
	pub timeout_ms: u64,
	/// Serve hash-based vectors when the model is unavailable instead of failing the query.
	#[serde(default = "default_true")]
	pub fallback: bool,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationProviderConfig {
	pub kind: GenerationKind,
	#[serde(default)]
	pub provider_id: String,
	#[serde(default)]
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	#[serde(default)]
	pub path: String,
	#[serde(default)]
	pub model: String,
	#[serde(default = "default_temperature")]
	pub temperature: f32,
	#[serde(default = "default_generation_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Partition names each role may read. Values are partition labels such as "customer_kb".
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Access {
	pub customer: Vec<String>,
	pub engineer: Vec<String>,
	pub admin: Vec<String>,
}
impl Default for Access {
	fn default() -> Self {
		Self {
			customer: vec!["customer_kb".to_string()],
			engineer: vec!["customer_kb".to_string(), "engineer_kb".to_string()],
			admin: vec![
				"customer_kb".to_string(),
				"engineer_kb".to_string(),
				"admin_kb".to_string(),
			],
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub top_k: u32,
	pub max_top_k: u32,
	pub max_query_chars: u32,
	pub preview_chars: u32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self { top_k: 5, max_top_k: 50, max_query_chars: 2_000, preview_chars: 150 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Composer {
	/// Similarity a passage needs to count as corroborating evidence.
	pub corroboration_threshold: f32,
	/// Share of the confidence carried by the top similarity alone.
	pub top_score_weight: f32,
	/// Corroborating passage count at which the corroboration term reaches one half.
	pub half_saturation: f32,
	pub max_passage_chars: u32,
}
impl Default for Composer {
	fn default() -> Self {
		Self {
			corroboration_threshold: 0.5,
			top_score_weight: 0.7,
			half_saturation: 2.0,
			max_passage_chars: 5_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pipeline {
	pub embed_timeout_ms: u64,
	pub search_timeout_ms: u64,
	pub generation_timeout_ms: u64,
	pub history_timeout_ms: u64,
	pub index_max_attempts: u32,
	pub generation_max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
}
impl Default for Pipeline {
	fn default() -> Self {
		Self {
			embed_timeout_ms: 10_000,
			search_timeout_ms: 2_000,
			generation_timeout_ms: 60_000,
			history_timeout_ms: 2_000,
			index_max_attempts: 3,
			generation_max_attempts: 2,
			base_backoff_ms: 50,
			max_backoff_ms: 1_000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Security {
	pub bind_localhost_only: bool,
}
impl Default for Security {
	fn default() -> Self {
		Self { bind_localhost_only: true }
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_dimensions() -> u32 {
	384
}

fn default_embedding_timeout_ms() -> u64 {
	5_000
}

fn default_generation_timeout_ms() -> u64 {
	25_000
}

fn default_temperature() -> f32 {
	0.2
}

fn default_true() -> bool {
	true
}
