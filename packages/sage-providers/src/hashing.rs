//! Deterministic feature-hashing embeddings.
//!
//! Used as the degraded fallback when the embedding model is unreachable, and as a
//! self-contained provider for offline deployments. Each lowercased word lands in a bucket
//! chosen by its BLAKE3 digest with a digest-derived sign, so texts sharing vocabulary end up
//! close under cosine similarity. The output is L2-normalized.

use unicode_segmentation::UnicodeSegmentation;

/// Identifies the hashing scheme. Bump when the bucket layout changes.
pub const HASH_MODEL_ID: &str = "blake3-feature-hash-v1";

pub fn hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
	let mut vector = vec![0.0_f32; dimensions];

	if dimensions == 0 {
		return vector;
	}

	let mut words = 0_usize;

	for word in text.unicode_words() {
		let token = word.to_lowercase();
		let digest = blake3::hash(token.as_bytes());
		let bytes = digest.as_bytes();
		let mut head = [0_u8; 8];

		head.copy_from_slice(&bytes[..8]);

		let bucket = (u64::from_le_bytes(head) % dimensions as u64) as usize;
		let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

		vector[bucket] += sign;
		words += 1;
	}

	if words == 0 || vector.iter().all(|value| *value == 0.0) {
		fill_from_bytes(text.as_bytes(), &mut vector);
	}

	normalize(&mut vector);

	vector
}

fn fill_from_bytes(raw: &[u8], vector: &mut [f32]) {
	let mut hasher = blake3::Hasher::new();

	hasher.update(HASH_MODEL_ID.as_bytes());
	hasher.update(raw);

	let mut reader = hasher.finalize_xof();
	let mut chunk = [0_u8; 4];

	for slot in vector.iter_mut() {
		reader.fill(&mut chunk);

		let unit = u32::from_le_bytes(chunk) as f64 / u32::MAX as f64;

		*slot = (unit * 2.0 - 1.0) as f32;
	}
}

fn normalize(vector: &mut [f32]) {
	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm <= f32::EPSILON {
		return;
	}

	for value in vector.iter_mut() {
		*value /= norm;
	}
}
