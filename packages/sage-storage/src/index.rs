use std::{
	cmp::Ordering,
	collections::{BTreeMap, BTreeSet},
	future,
	sync::{Arc, Mutex, PoisonError, RwLock},
};

use ahash::AHashMap;
use serde::Serialize;

use crate::{Error, Result};
use sage_domain::{BoxFuture, Partition, PartitionSet, Passage, RetrievalResult, ScoredPassage};

/// Passage storage with partition-filtered nearest-neighbor search.
///
/// Implementations must never return a passage whose partition is outside `allowed`, and a
/// batch write or document removal must become visible to searches all at once.
pub trait PassageIndex
where
	Self: Send + Sync,
{
	/// Adds or replaces passages by id. Returns the number written.
	fn upsert<'a>(&'a self, passages: Vec<Passage>) -> BoxFuture<'a, Result<usize>>;

	/// Removes every passage of `document_id`. Returns the number removed.
	fn remove_document<'a>(&'a self, document_id: &'a str) -> BoxFuture<'a, Result<usize>>;

	fn search<'a>(
		&'a self,
		vector: &'a [f32],
		allowed: &'a PartitionSet,
		k: usize,
	) -> BoxFuture<'a, Result<RetrievalResult>>;

	fn stats<'a>(&'a self) -> BoxFuture<'a, Result<IndexStats>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
	pub passages: usize,
	pub documents: usize,
	pub by_partition: BTreeMap<Partition, usize>,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
	passages: BTreeMap<String, Arc<Passage>>,
	documents: AHashMap<String, BTreeSet<String>>,
}
impl Snapshot {
	fn insert(&mut self, passage: Passage) {
		let passage = Arc::new(passage);

		if let Some(previous) = self.passages.insert(passage.id.clone(), passage.clone())
			&& previous.document_id != passage.document_id
		{
			self.detach(&previous.document_id, &previous.id);
		}

		self.documents
			.entry(passage.document_id.clone())
			.or_default()
			.insert(passage.id.clone());
	}

	fn detach(&mut self, document_id: &str, passage_id: &str) {
		if let Some(ids) = self.documents.get_mut(document_id) {
			ids.remove(passage_id);

			if ids.is_empty() {
				self.documents.remove(document_id);
			}
		}
	}
}

/// In-process index built on copy-on-write snapshots.
///
/// Searches clone the current `Arc<Snapshot>` under a read lock held only for the clone and
/// rank without any lock. Writers are serialized by `writer`, build the next snapshot
/// off-lock, and publish it with a single pointer swap, so readers never wait on a write in
/// progress and never see one half applied.
pub struct MemoryIndex {
	dimensions: usize,
	current: RwLock<Arc<Snapshot>>,
	writer: Mutex<()>,
}
impl MemoryIndex {
	pub fn new(dimensions: usize) -> Self {
		Self {
			dimensions,
			current: RwLock::new(Arc::new(Snapshot::default())),
			writer: Mutex::new(()),
		}
	}

	pub fn dimensions(&self) -> usize {
		self.dimensions
	}

	fn snapshot(&self) -> Arc<Snapshot> {
		self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
	}

	fn publish(&self, next: Snapshot) {
		*self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
	}

	fn validate(&self, passage: &Passage) -> Result<()> {
		let invalid = |message: String| Error::InvalidPassage { id: passage.id.clone(), message };

		if passage.id.trim().is_empty() {
			return Err(invalid("id must be non-empty.".to_string()));
		}
		if passage.document_id.trim().is_empty() {
			return Err(invalid("document_id must be non-empty.".to_string()));
		}
		if passage.embedding.len() != self.dimensions {
			return Err(invalid(format!(
				"embedding has {} dimensions, index expects {}.",
				passage.embedding.len(),
				self.dimensions
			)));
		}
		if passage.embedding.iter().any(|value| !value.is_finite()) {
			return Err(invalid("embedding contains non-finite values.".to_string()));
		}
		if passage.embedding.iter().all(|value| *value == 0.0) {
			return Err(invalid("embedding must not be the zero vector.".to_string()));
		}

		Ok(())
	}

	fn apply_upsert(&self, passages: Vec<Passage>) -> Result<usize> {
		for passage in &passages {
			self.validate(passage)?;
		}

		let count = passages.len();

		if count == 0 {
			return Ok(0);
		}

		let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
		let mut next = Snapshot::clone(&self.snapshot());

		for passage in passages {
			next.insert(passage);
		}

		self.publish(next);

		tracing::debug!(count, "Passages upserted.");

		Ok(count)
	}

	fn apply_remove(&self, document_id: &str) -> usize {
		let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
		let current = self.snapshot();
		let Some(ids) = current.documents.get(document_id) else {
			return 0;
		};
		let mut next = Snapshot::clone(&current);

		for id in ids {
			next.passages.remove(id);
		}

		next.documents.remove(document_id);

		let removed = ids.len();

		self.publish(next);

		tracing::debug!(document_id, removed, "Document removed from index.");

		removed
	}

	fn rank(&self, vector: &[f32], allowed: &PartitionSet, k: usize) -> RetrievalResult {
		if k == 0 || allowed.is_empty() {
			return RetrievalResult::default();
		}

		let snapshot = self.snapshot();
		let mut hits: Vec<ScoredPassage> = snapshot
			.passages
			.values()
			.filter(|passage| allowed.contains(&passage.partition))
			.filter_map(|passage| {
				cosine_similarity(vector, &passage.embedding)
					.map(|score| ScoredPassage { passage: passage.clone(), score })
			})
			.collect();

		if hits.len() > k {
			hits.select_nth_unstable_by(k - 1, compare_hits);
			hits.truncate(k);
		}

		hits.sort_by(compare_hits);

		RetrievalResult { hits }
	}

	fn collect_stats(&self) -> IndexStats {
		let snapshot = self.snapshot();
		let mut by_partition = BTreeMap::new();

		for passage in snapshot.passages.values() {
			*by_partition.entry(passage.partition).or_insert(0) += 1;
		}

		IndexStats {
			passages: snapshot.passages.len(),
			documents: snapshot.documents.len(),
			by_partition,
		}
	}
}
impl PassageIndex for MemoryIndex {
	fn upsert<'a>(&'a self, passages: Vec<Passage>) -> BoxFuture<'a, Result<usize>> {
		Box::pin(future::ready(self.apply_upsert(passages)))
	}

	fn remove_document<'a>(&'a self, document_id: &'a str) -> BoxFuture<'a, Result<usize>> {
		Box::pin(future::ready(Ok(self.apply_remove(document_id))))
	}

	fn search<'a>(
		&'a self,
		vector: &'a [f32],
		allowed: &'a PartitionSet,
		k: usize,
	) -> BoxFuture<'a, Result<RetrievalResult>> {
		Box::pin(future::ready(Ok(self.rank(vector, allowed, k))))
	}

	fn stats<'a>(&'a self) -> BoxFuture<'a, Result<IndexStats>> {
		Box::pin(future::ready(Ok(self.collect_stats())))
	}
}

/// Cosine similarity in [-1, 1]. `None` when either side is empty, the lengths differ, or a
/// norm is zero.
pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> Option<f32> {
	if lhs.is_empty() || lhs.len() != rhs.len() {
		return None;
	}

	let mut dot = 0.0_f32;
	let mut lhs_norm = 0.0_f32;
	let mut rhs_norm = 0.0_f32;

	for (l, r) in lhs.iter().zip(rhs) {
		dot += l * r;
		lhs_norm += l * l;
		rhs_norm += r * r;
	}

	if lhs_norm <= f32::EPSILON || rhs_norm <= f32::EPSILON {
		return None;
	}

	Some((dot / (lhs_norm.sqrt() * rhs_norm.sqrt())).clamp(-1.0, 1.0))
}

// Best score first, then passage id ascending.
fn compare_hits(lhs: &ScoredPassage, rhs: &ScoredPassage) -> Ordering {
	rhs.score.total_cmp(&lhs.score).then_with(|| lhs.passage.id.cmp(&rhs.passage.id))
}
