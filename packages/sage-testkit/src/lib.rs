mod error;

pub use error::{Error, Result};

use std::{
	fs,
	path::{Path, PathBuf},
};

use tempfile::TempDir;

use sage_config::Config;
use sage_domain::{Partition, Passage};

/// Vector width used by the offline test configuration.
pub const TEST_DIMENSIONS: usize = 16;

const TEST_CONFIG: &str = r#"
[service]
http_bind  = "127.0.0.1:0"
admin_bind = "127.0.0.1:0"
log_level  = "warn"

[providers.embedding]
kind       = "hash"
dimensions = 16

[providers.generation]
kind = "extractive"

[pipeline]
embed_timeout_ms      = 1000
search_timeout_ms     = 1000
generation_timeout_ms = 1000
history_timeout_ms    = 1000
base_backoff_ms       = 1
max_backoff_ms        = 5
"#;

/// A validated config with the hash embedder and extractive generator, so nothing leaves the
/// process.
pub fn test_config() -> Result<Config> {
	Ok(sage_config::parse(TEST_CONFIG)?)
}

/// Unit vector along `axis`.
pub fn unit_vector(dimensions: usize, axis: usize) -> Vec<f32> {
	let mut vector = vec![0.0; dimensions];

	vector[axis % dimensions] = 1.0;

	vector
}

/// Unit vector in the plane of `axis` and `axis + 1`, whose cosine with `unit_vector(axis)`
/// is exactly `similarity`.
pub fn vector_with_similarity(dimensions: usize, axis: usize, similarity: f32) -> Vec<f32> {
	let similarity = similarity.clamp(-1.0, 1.0);
	let mut vector = vec![0.0; dimensions];

	vector[axis % dimensions] = similarity;
	vector[(axis + 1) % dimensions] = (1.0 - similarity * similarity).sqrt();

	vector
}

pub fn passage(
	id: &str,
	document_id: &str,
	partition: Partition,
	text: &str,
	embedding: Vec<f32>,
) -> Passage {
	Passage {
		id: id.to_string(),
		document_id: document_id.to_string(),
		partition,
		text: text.to_string(),
		embedding,
	}
}

/// Scratch directory under the system temp dir, removed on drop.
pub struct TestDir {
	root: TempDir,
}
impl TestDir {
	pub fn new() -> Result<Self> {
		let root = tempfile::Builder::new().prefix("sage_test_").tempdir()?;

		Ok(Self { root })
	}

	pub fn path(&self) -> &Path {
		self.root.path()
	}

	pub fn join(&self, name: &str) -> PathBuf {
		self.root.path().join(name)
	}

	/// Writes `contents` to `name` inside the directory and returns the full path.
	pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
		let path = self.join(name);

		fs::write(&path, contents)?;

		Ok(path)
	}
}
