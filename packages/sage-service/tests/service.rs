use std::{
	collections::HashMap,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use sage_config::{Config, EmbeddingProviderConfig, GenerationKind, GenerationProviderConfig};
use sage_domain::{
	AccessRule, BoxFuture, EmbeddingSource, HistoryEntry, Partition, PartitionSet, Passage,
	PassageInput, RetrievalResult, Role, ScoredPassage,
};
use sage_providers::extractive;
use sage_service::{
	EmbeddingProvider, Error, GenerationProvider, HistoryRequest, IngestRequest, Providers,
	QueryRequest, SageService, SearchRequest, Stage,
};
use sage_storage::{HistoryStore, IndexStats, MemoryHistory, MemoryIndex, PassageIndex};
use sage_testkit::{TEST_DIMENSIONS, passage, test_config, unit_vector, vector_with_similarity};

const DIM: usize = TEST_DIMENSIONS;
const QUERY: &str = "machine won't start";

#[derive(Clone, Copy, Default, PartialEq)]
enum EmbedMode {
	#[default]
	Ok,
	Fail,
	Hang,
}

#[derive(Default)]
struct StubEmbedding {
	vectors: HashMap<String, Vec<f32>>,
	mode: EmbedMode,
	calls: AtomicUsize,
}
impl StubEmbedding {
	fn with_query(mode: EmbedMode) -> Self {
		let mut vectors = HashMap::new();

		vectors.insert(QUERY.to_string(), unit_vector(DIM, 0));

		Self { vectors, mode, calls: AtomicUsize::new(0) }
	}
}
impl EmbeddingProvider for StubEmbedding {
	fn embed<'a>(
		&'a self,
		_: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, sage_providers::Result<Vec<Vec<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			match self.mode {
				EmbedMode::Ok => Ok(texts
					.iter()
					.map(|text| {
						self.vectors.get(text).cloned().unwrap_or_else(|| unit_vector(DIM, 7))
					})
					.collect::<Vec<_>>()),
				EmbedMode::Fail => Err(sage_providers::Error::Unavailable {
					message: "embedding model offline".to_string(),
				}),
				EmbedMode::Hang => {
					tokio::time::sleep(Duration::from_secs(30)).await;

					Ok(Vec::new())
				},
			}
		})
	}
}

#[derive(Default)]
struct StubGeneration {
	failures: AtomicUsize,
	calls: AtomicUsize,
	/// Wait out the provider timeout and then fail, like a request that never answers.
	stall: bool,
}
impl StubGeneration {
	fn failing(times: usize) -> Self {
		Self { failures: AtomicUsize::new(times), ..Default::default() }
	}

	fn stalled() -> Self {
		Self { stall: true, ..Default::default() }
	}

	fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl GenerationProvider for StubGeneration {
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		role: Role,
		query: &'a str,
		passages: &'a [String],
	) -> BoxFuture<'a, sage_providers::Result<String>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let failed = self
			.failures
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok();

		Box::pin(async move {
			if self.stall {
				tokio::time::sleep(Duration::from_millis(cfg.timeout_ms)).await;

				return Err(sage_providers::Error::Unavailable {
					message: "chat request timed out".to_string(),
				});
			}
			if failed {
				return Err(sage_providers::Error::Unavailable {
					message: "chat model overloaded".to_string(),
				});
			}

			Ok(extractive::compose(role, query, passages))
		})
	}
}

/// Fails the first `failures` searches, then delegates.
struct FlakyIndex {
	inner: MemoryIndex,
	failures: AtomicUsize,
	searches: AtomicUsize,
}
impl PassageIndex for FlakyIndex {
	fn upsert<'a>(&'a self, passages: Vec<Passage>) -> BoxFuture<'a, sage_storage::Result<usize>> {
		self.inner.upsert(passages)
	}

	fn remove_document<'a>(
		&'a self,
		document_id: &'a str,
	) -> BoxFuture<'a, sage_storage::Result<usize>> {
		self.inner.remove_document(document_id)
	}

	fn search<'a>(
		&'a self,
		vector: &'a [f32],
		allowed: &'a PartitionSet,
		k: usize,
	) -> BoxFuture<'a, sage_storage::Result<RetrievalResult>> {
		self.searches.fetch_add(1, Ordering::SeqCst);

		let failed = self
			.failures
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok();

		if failed {
			return Box::pin(async {
				Err(sage_storage::Error::IndexUnavailable { message: "shard offline".to_string() })
			});
		}

		self.inner.search(vector, allowed, k)
	}

	fn stats<'a>(&'a self) -> BoxFuture<'a, sage_storage::Result<IndexStats>> {
		self.inner.stats()
	}
}

/// Ignores the partition filter.
struct LeakyIndex;
impl PassageIndex for LeakyIndex {
	fn upsert<'a>(&'a self, passages: Vec<Passage>) -> BoxFuture<'a, sage_storage::Result<usize>> {
		Box::pin(async move { Ok(passages.len()) })
	}

	fn remove_document<'a>(&'a self, _: &'a str) -> BoxFuture<'a, sage_storage::Result<usize>> {
		Box::pin(async { Ok(0) })
	}

	fn search<'a>(
		&'a self,
		_: &'a [f32],
		_: &'a PartitionSet,
		_: usize,
	) -> BoxFuture<'a, sage_storage::Result<RetrievalResult>> {
		let leaked = passage(
			"admin-1",
			"d-admin",
			Partition::AdminKb,
			"Root password rotation.",
			unit_vector(DIM, 0),
		);
		let hit = ScoredPassage { passage: Arc::new(leaked), score: 1.0 };

		Box::pin(async move { Ok(RetrievalResult { hits: vec![hit] }) })
	}

	fn stats<'a>(&'a self) -> BoxFuture<'a, sage_storage::Result<IndexStats>> {
		Box::pin(async { Ok(IndexStats::default()) })
	}
}

/// Never answers a search.
struct StuckIndex;
impl PassageIndex for StuckIndex {
	fn upsert<'a>(&'a self, passages: Vec<Passage>) -> BoxFuture<'a, sage_storage::Result<usize>> {
		Box::pin(async move { Ok(passages.len()) })
	}

	fn remove_document<'a>(&'a self, _: &'a str) -> BoxFuture<'a, sage_storage::Result<usize>> {
		Box::pin(async { Ok(0) })
	}

	fn search<'a>(
		&'a self,
		_: &'a [f32],
		_: &'a PartitionSet,
		_: usize,
	) -> BoxFuture<'a, sage_storage::Result<RetrievalResult>> {
		Box::pin(async {
			tokio::time::sleep(Duration::from_secs(30)).await;

			Ok(RetrievalResult::default())
		})
	}

	fn stats<'a>(&'a self) -> BoxFuture<'a, sage_storage::Result<IndexStats>> {
		Box::pin(async { Ok(IndexStats::default()) })
	}
}

struct FailingHistory;
impl HistoryStore for FailingHistory {
	fn record<'a>(&'a self, _: &'a HistoryEntry) -> BoxFuture<'a, sage_storage::Result<()>> {
		Box::pin(async {
			Err(sage_storage::Error::HistoryUnavailable { message: "disk full".to_string() })
		})
	}

	fn list<'a>(
		&'a self,
		_: usize,
		_: usize,
	) -> BoxFuture<'a, sage_storage::Result<Vec<HistoryEntry>>> {
		Box::pin(async { Ok(Vec::new()) })
	}
}

struct Harness {
	service: SageService,
	history: Arc<MemoryHistory>,
	embedding: Arc<StubEmbedding>,
	generation: Arc<StubGeneration>,
}

fn config() -> Config {
	test_config().expect("Failed to build test config.")
}

fn maintenance_passages() -> Vec<Passage> {
	vec![
		passage(
			"cust-1",
			"operator-guide",
			Partition::CustomerKb,
			"Check that the emergency stop is released. Then press reset.",
			vector_with_similarity(DIM, 0, 0.6),
		),
		passage(
			"eng-1",
			"service-manual",
			Partition::EngineerKb,
			"Measure 24V on terminal X1:3 and inspect contactor K1.",
			vector_with_similarity(DIM, 0, 0.9),
		),
		passage(
			"eng-2",
			"service-manual",
			Partition::EngineerKb,
			"Spindle bearing preload table.",
			unit_vector(DIM, 5),
		),
		passage(
			"admin-1",
			"escalation-runbook",
			Partition::AdminKb,
			"Escalate repeated start failures to the plant reliability lead.",
			unit_vector(DIM, 0),
		),
	]
}

async fn harness_with(
	cfg: Config,
	index: Arc<dyn PassageIndex>,
	embedding: StubEmbedding,
	generation: StubGeneration,
) -> Harness {
	let history = Arc::new(MemoryHistory::new());
	let embedding = Arc::new(embedding);
	let generation = Arc::new(generation);
	let providers = Providers::new(embedding.clone(), generation.clone());
	let service =
		SageService::with_providers(cfg, AccessRule::default(), index, history.clone(), providers);

	Harness { service, history, embedding, generation }
}

async fn seeded_harness() -> Harness {
	seeded_harness_with(config(), StubGeneration::default()).await
}

async fn seeded_harness_with(cfg: Config, generation: StubGeneration) -> Harness {
	let index = Arc::new(MemoryIndex::new(DIM));

	index.upsert(maintenance_passages()).await.expect("Failed to seed index.");

	harness_with(cfg, index, StubEmbedding::with_query(EmbedMode::Ok), generation).await
}

fn ask(role: &str) -> QueryRequest {
	QueryRequest { text: QUERY.to_string(), role: role.to_string() }
}

#[tokio::test]
async fn customer_answer_cites_only_customer_passages() {
	let h = seeded_harness().await;
	let response = h.service.process_query(ask("customer")).await.expect("Query failed.");

	assert_eq!(response.answer.citations, vec!["cust-1".to_string()]);
	assert!(response.sources.iter().all(|source| source.partition == Partition::CustomerKb));
	assert_eq!(response.metadata.partitions, vec![Partition::CustomerKb]);
	assert_eq!(response.metadata.embedding, EmbeddingSource::Model);
	assert!(!response.metadata.degraded);
	assert!(response.answer.confidence > 0.0 && response.answer.confidence <= 1.0);
	assert!(!response.answer.text.contains("24V"));
	assert_eq!(h.history.len(), 1);
}

#[tokio::test]
async fn engineer_top_citation_is_the_closer_engineering_passage() {
	let h = seeded_harness().await;
	let response = h.service.process_query(ask("Engineer")).await.expect("Query failed.");

	assert_eq!(response.answer.citations.first().map(String::as_str), Some("eng-1"));
	assert!(response.answer.citations.contains(&"cust-1".to_string()));
	assert!(!response.answer.citations.contains(&"admin-1".to_string()));
	assert_eq!(response.sources[0].passage_id, "eng-1");
	assert!(response.sources.windows(2).all(|pair| pair[0].score >= pair[1].score));
}

#[tokio::test]
async fn every_role_sees_only_its_tiers() {
	let h = seeded_harness().await;

	for role in Role::ALL {
		let allowed = AccessRule::default().allowed_partitions(role).expect("role").clone();
		let response = h
			.service
			.search(SearchRequest {
				text: QUERY.to_string(),
				role: role.to_string(),
				top_k: Some(50),
			})
			.await
			.expect("Search failed.");

		assert!(!response.hits.is_empty());
		assert!(
			response.hits.iter().all(|hit| allowed.contains(&hit.partition)),
			"{role} saw a forbidden partition"
		);
		assert_eq!(response.partitions, allowed.iter().copied().collect::<Vec<_>>());
	}
}

#[tokio::test]
async fn admin_reads_every_tier() {
	let h = seeded_harness().await;
	let response = h.service.process_query(ask("admin")).await.expect("Query failed.");

	assert_eq!(response.answer.citations.first().map(String::as_str), Some("admin-1"));
	assert_eq!(response.metadata.partitions, Partition::ALL.to_vec());
}

#[tokio::test]
async fn empty_index_reports_no_information() {
	let h = harness_with(
		config(),
		Arc::new(MemoryIndex::new(DIM)),
		StubEmbedding::with_query(EmbedMode::Ok),
		StubGeneration::default(),
	)
	.await;
	let response = h.service.process_query(ask("customer")).await.expect("Query failed.");

	assert!(response.answer.text.contains("could not find"));
	assert_eq!(response.answer.confidence, 0.0);
	assert!(response.answer.citations.is_empty());
	assert!(response.sources.is_empty());
	assert_eq!(h.generation.calls(), 0);
	assert_eq!(h.history.len(), 1);
}

#[tokio::test]
async fn unknown_role_fails_before_any_work() {
	let h = seeded_harness().await;
	let failure = h.service.process_query(ask("Guest")).await.expect_err("Guest must be rejected.");

	assert!(matches!(failure.error, Error::UnknownRole { ref role } if role == "Guest"));
	assert_eq!(failure.stage, Stage::Received);
	assert_eq!(failure.code(), "UNKNOWN_ROLE");
	assert_eq!(h.embedding.calls.load(Ordering::SeqCst), 0);
	assert!(h.history.is_empty());
}

#[tokio::test]
async fn substituted_rule_set_without_a_role_rejects_it() {
	let index = Arc::new(MemoryIndex::new(DIM));
	let rules = AccessRule::new(
		[(Role::Customer, PartitionSet::from([Partition::CustomerKb]))].into_iter().collect(),
	)
	.expect("Valid rule set.");
	let providers = Providers::new(
		Arc::new(StubEmbedding::with_query(EmbedMode::Ok)),
		Arc::new(StubGeneration::default()),
	);
	let service = SageService::with_providers(
		config(),
		rules,
		index,
		Arc::new(MemoryHistory::new()),
		providers,
	);
	let failure =
		service.process_query(ask("engineer")).await.expect_err("Engineer has no rule here.");

	assert!(matches!(failure.error, Error::UnknownRole { .. }));
}

#[tokio::test]
async fn blank_and_oversized_queries_are_invalid() {
	let h = seeded_harness().await;
	let blank = QueryRequest { text: "   ".to_string(), role: "customer".to_string() };
	let huge = QueryRequest { text: "x".repeat(2001), role: "customer".to_string() };

	for req in [blank, huge] {
		let failure = h.service.process_query(req).await.expect_err("Expected invalid request.");

		assert_eq!(failure.code(), "INVALID_REQUEST");
		assert_eq!(failure.stage, Stage::Received);
	}

	assert!(h.history.is_empty());
}

#[tokio::test]
async fn unavailable_embedder_falls_back_and_flags_metadata() {
	let index = Arc::new(MemoryIndex::new(DIM));

	index.upsert(maintenance_passages()).await.expect("Failed to seed index.");

	let h = harness_with(
		config(),
		index,
		StubEmbedding::with_query(EmbedMode::Fail),
		StubGeneration::default(),
	)
	.await;
	let response = h.service.process_query(ask("engineer")).await.expect("Query failed.");
	let recorded = h.history.list(1, 0).await.expect("list failed");

	assert_eq!(response.metadata.embedding, EmbeddingSource::Fallback);
	assert!(response.metadata.degraded);
	assert_eq!(recorded[0].embedding, EmbeddingSource::Fallback);
}

#[tokio::test]
async fn disabled_fallback_fails_the_embedding_stage() {
	let mut cfg = config();

	cfg.providers.embedding.fallback = false;

	let h = harness_with(
		cfg,
		Arc::new(MemoryIndex::new(DIM)),
		StubEmbedding::with_query(EmbedMode::Fail),
		StubGeneration::default(),
	)
	.await;
	let failure = h.service.process_query(ask("engineer")).await.expect_err("Expected failure.");

	assert!(matches!(failure.error, Error::EmbeddingUnavailable { .. }));
	assert_eq!(failure.stage, Stage::Embedding);
	assert!(h.history.is_empty());
}

#[tokio::test]
async fn stuck_embedder_times_out() {
	let mut cfg = config();

	cfg.pipeline.embed_timeout_ms = 50;

	let h = harness_with(
		cfg,
		Arc::new(MemoryIndex::new(DIM)),
		StubEmbedding::with_query(EmbedMode::Hang),
		StubGeneration::default(),
	)
	.await;
	let failure = h.service.process_query(ask("customer")).await.expect_err("Expected timeout.");

	assert!(matches!(failure.error, Error::Timeout { stage: Stage::Embedding, timeout_ms: 50 }));
	assert_eq!(failure.code(), "TIMEOUT");
}

#[tokio::test]
async fn transient_index_failures_are_retried() {
	let index = Arc::new(FlakyIndex {
		inner: MemoryIndex::new(DIM),
		failures: AtomicUsize::new(2),
		searches: AtomicUsize::new(0),
	});

	index.upsert(maintenance_passages()).await.expect("Failed to seed index.");

	let h = harness_with(
		config(),
		index.clone(),
		StubEmbedding::with_query(EmbedMode::Ok),
		StubGeneration::default(),
	)
	.await;
	let response = h.service.process_query(ask("customer")).await.expect("Query failed.");

	assert_eq!(response.answer.citations, vec!["cust-1".to_string()]);
	assert_eq!(index.searches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn persistent_index_failure_is_index_unavailable() {
	let index = Arc::new(FlakyIndex {
		inner: MemoryIndex::new(DIM),
		failures: AtomicUsize::new(usize::MAX),
		searches: AtomicUsize::new(0),
	});
	let h = harness_with(
		config(),
		index.clone(),
		StubEmbedding::with_query(EmbedMode::Ok),
		StubGeneration::default(),
	)
	.await;
	let failure = h.service.process_query(ask("customer")).await.expect_err("Expected failure.");

	assert!(matches!(failure.error, Error::IndexUnavailable { attempts: 3, .. }));
	assert_eq!(failure.stage, Stage::Retrieving);
	assert_eq!(index.searches.load(Ordering::SeqCst), 3);
	assert!(h.history.is_empty());
}

#[tokio::test]
async fn generation_is_retried_once() {
	let index = Arc::new(MemoryIndex::new(DIM));

	index.upsert(maintenance_passages()).await.expect("Failed to seed index.");

	let h = harness_with(
		config(),
		index,
		StubEmbedding::with_query(EmbedMode::Ok),
		StubGeneration::failing(1),
	)
	.await;
	let response = h.service.process_query(ask("engineer")).await.expect("Query failed.");

	assert!(!response.answer.text.is_empty());
	assert_eq!(h.generation.calls(), 2);
}

#[tokio::test]
async fn generation_failure_after_retry_fails_the_query() {
	let index = Arc::new(MemoryIndex::new(DIM));

	index.upsert(maintenance_passages()).await.expect("Failed to seed index.");

	let h = harness_with(
		config(),
		index,
		StubEmbedding::with_query(EmbedMode::Ok),
		StubGeneration::failing(5),
	)
	.await;
	let failure = h.service.process_query(ask("engineer")).await.expect_err("Expected failure.");

	assert!(matches!(failure.error, Error::GenerationUnavailable { .. }));
	assert_eq!(failure.stage, Stage::Composing);
	assert_eq!(h.generation.calls(), 2);
	assert!(h.history.is_empty());
}

#[tokio::test]
async fn stalled_generator_exhausts_retries_within_the_deadline() {
	let mut cfg = config();

	cfg.providers.generation.kind = GenerationKind::Http;
	cfg.providers.generation.provider_id = "local".to_string();
	cfg.providers.generation.api_base = "http://127.0.0.1:9001".to_string();
	cfg.providers.generation.api_key = "test-key".to_string();
	cfg.providers.generation.model = "maintenance-chat".to_string();
	cfg.providers.generation.timeout_ms = 200;
	cfg.pipeline.generation_timeout_ms = 600;

	sage_config::validate(&cfg).expect("Retry budget must fit the deadline.");

	let h = seeded_harness_with(cfg, StubGeneration::stalled()).await;
	let failure = h.service.process_query(ask("engineer")).await.expect_err("Expected failure.");

	assert_eq!(failure.code(), "GENERATION_UNAVAILABLE");
	assert_eq!(failure.stage, Stage::Composing);
	assert_eq!(h.generation.calls(), 2);
	assert!(h.history.is_empty());
}

#[tokio::test]
async fn stuck_generator_times_out_the_composing_stage() {
	let mut cfg = config();

	cfg.pipeline.generation_timeout_ms = 50;

	let h = seeded_harness_with(cfg, StubGeneration::stalled()).await;
	let failure = h.service.process_query(ask("customer")).await.expect_err("Expected timeout.");

	assert!(matches!(failure.error, Error::Timeout { stage: Stage::Composing, timeout_ms: 50 }));
	assert_eq!(failure.stage, Stage::Composing);
	assert!(h.history.is_empty());
}

#[tokio::test]
async fn stuck_index_times_out_the_retrieving_stage() {
	let mut cfg = config();

	cfg.pipeline.search_timeout_ms = 50;

	let h = harness_with(
		cfg,
		Arc::new(StuckIndex),
		StubEmbedding::with_query(EmbedMode::Ok),
		StubGeneration::default(),
	)
	.await;
	let failure = h.service.process_query(ask("engineer")).await.expect_err("Expected timeout.");

	assert!(matches!(failure.error, Error::Timeout { stage: Stage::Retrieving, timeout_ms: 50 }));
	assert_eq!(failure.code(), "TIMEOUT");
	assert_eq!(h.generation.calls(), 0);
	assert!(h.history.is_empty());
}

#[tokio::test]
async fn cancelled_query_records_nothing() {
	let h = seeded_harness_with(config(), StubGeneration::stalled()).await;
	let outcome =
		tokio::time::timeout(Duration::from_millis(100), h.service.process_query(ask("engineer")))
			.await;

	assert!(outcome.is_err(), "The query should still be composing when dropped.");
	assert_eq!(h.generation.calls(), 1);
	assert!(h.history.is_empty());
}

#[tokio::test]
async fn history_failure_fails_the_query() {
	let index = Arc::new(MemoryIndex::new(DIM));

	index.upsert(maintenance_passages()).await.expect("Failed to seed index.");

	let providers = Providers::new(
		Arc::new(StubEmbedding::with_query(EmbedMode::Ok)),
		Arc::new(StubGeneration::default()),
	);
	let service = SageService::with_providers(
		config(),
		AccessRule::default(),
		index,
		Arc::new(FailingHistory),
		providers,
	);
	let failure = service.process_query(ask("customer")).await.expect_err("Expected failure.");

	assert!(matches!(failure.error, Error::HistoryUnavailable { .. }));
	assert_eq!(failure.stage, Stage::Composing);
}

#[tokio::test]
async fn forbidden_hit_from_the_index_is_an_access_violation() {
	let h = harness_with(
		config(),
		Arc::new(LeakyIndex),
		StubEmbedding::with_query(EmbedMode::Ok),
		StubGeneration::default(),
	)
	.await;
	let failure = h.service.process_query(ask("customer")).await.expect_err("Expected violation.");

	assert!(matches!(failure.error, Error::AccessViolation { .. }));
	assert_eq!(failure.stage, Stage::Retrieving);
	assert_eq!(h.generation.calls(), 0);
	assert!(h.history.is_empty());
}

#[tokio::test]
async fn ingested_passage_is_found_by_its_own_text() {
	let service = SageService::new(
		config(),
		AccessRule::default(),
		Arc::new(MemoryIndex::new(DIM)),
		Arc::new(MemoryHistory::new()),
	);
	let text = "Hydraulic pump overheating: check the oil cooler fan and filter.";
	let ingested = service
		.ingest(IngestRequest {
			passages: vec![
				PassageInput {
					id: "hyd-1".to_string(),
					document_id: "hydraulics".to_string(),
					partition: Partition::EngineerKb,
					text: text.to_string(),
					embedding: None,
				},
				PassageInput {
					id: "inv-1".to_string(),
					document_id: "billing".to_string(),
					partition: Partition::CustomerKb,
					text: "Invoices are sent at the end of each month.".to_string(),
					embedding: None,
				},
			],
		})
		.await
		.expect("Ingest failed.");
	let search =
		|role: &str| SearchRequest { text: text.to_string(), role: role.to_string(), top_k: None };
	let first = service.search(search("engineer")).await.expect("Search failed.");
	let second = service.search(search("engineer")).await.expect("Search failed.");

	assert_eq!(ingested.upserted, 2);
	assert_eq!(ingested.embedded, 2);
	assert_eq!(first.hits[0].passage_id, "hyd-1");
	assert!((first.hits[0].score - 1.0).abs() < 1e-4);
	assert_eq!(first.embedding, EmbeddingSource::Model);
	assert_eq!(first.hits, second.hits);
}

#[tokio::test]
async fn ingest_never_stores_fallback_vectors() {
	let index = Arc::new(MemoryIndex::new(DIM));
	let h = harness_with(
		config(),
		index.clone(),
		StubEmbedding::with_query(EmbedMode::Fail),
		StubGeneration::default(),
	)
	.await;
	let err = h
		.service
		.ingest(IngestRequest {
			passages: vec![PassageInput {
				id: "p".to_string(),
				document_id: "d".to_string(),
				partition: Partition::CustomerKb,
				text: "Reset the breaker.".to_string(),
				embedding: None,
			}],
		})
		.await
		.expect_err("Expected embedding failure.");

	assert!(matches!(err, Error::EmbeddingUnavailable { .. }));
	assert_eq!(index.stats().await.expect("stats").passages, 0);
}

#[tokio::test]
async fn ingest_rejects_wrong_dimension_vectors() {
	let h = seeded_harness().await;
	let err = h
		.service
		.ingest(IngestRequest {
			passages: vec![PassageInput {
				id: "p".to_string(),
				document_id: "d".to_string(),
				partition: Partition::CustomerKb,
				text: "Reset the breaker.".to_string(),
				embedding: Some(vec![1.0, 0.0]),
			}],
		})
		.await
		.expect_err("Expected invalid passage.");

	assert_eq!(err.code(), "INVALID_PASSAGE");
}

#[tokio::test]
async fn removed_document_is_invisible_to_later_searches() {
	let h = seeded_harness().await;
	let removed = h.service.remove_document("service-manual").await.expect("Remove failed.");
	let response = h
		.service
		.search(SearchRequest {
			text: QUERY.to_string(),
			role: "engineer".to_string(),
			top_k: Some(50),
		})
		.await
		.expect("Search failed.");
	let stats = h.service.stats().await.expect("Stats failed.");

	assert_eq!(removed.removed, 2);
	assert!(response.hits.iter().all(|hit| hit.document_id != "service-manual"));
	assert_eq!(stats.passages, 2);
	assert_eq!(stats.by_partition.get(&Partition::EngineerKb), None);
}

#[tokio::test]
async fn search_top_k_is_validated_and_capped() {
	let h = seeded_harness().await;
	let zero = h
		.service
		.search(SearchRequest {
			text: QUERY.to_string(),
			role: "admin".to_string(),
			top_k: Some(0),
		})
		.await
		.expect_err("Expected invalid top_k.");
	let capped = h
		.service
		.search(SearchRequest {
			text: QUERY.to_string(),
			role: "admin".to_string(),
			top_k: Some(1_000),
		})
		.await
		.expect("Search failed.");

	assert_eq!(zero.code(), "INVALID_REQUEST");
	assert_eq!(capped.hits.len(), 4);
}

#[tokio::test]
async fn history_lists_newest_first_with_bounded_pages() {
	let h = seeded_harness().await;

	for role in ["customer", "engineer", "admin"] {
		h.service.process_query(ask(role)).await.expect("Query failed.");
	}

	let page = h
		.service
		.history(HistoryRequest { limit: Some(2), offset: None })
		.await
		.expect("History failed.");
	let roles: Vec<Role> = page.items.iter().map(|entry| entry.query.role).collect();
	let invalid = h
		.service
		.history(HistoryRequest { limit: Some(0), offset: None })
		.await
		.expect_err("Expected invalid limit.");

	assert_eq!(roles, vec![Role::Admin, Role::Engineer]);
	assert_eq!(invalid.code(), "INVALID_REQUEST");
	assert!(h.service.history(HistoryRequest { limit: Some(101), offset: None }).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queries_each_record_one_entry() {
	let h = seeded_harness().await;
	let service = Arc::new(h.service);
	let mut tasks = Vec::new();

	for i in 0..16 {
		let service = service.clone();
		let role = Role::ALL[i % 3].to_string();

		tasks.push(tokio::spawn(async move { service.process_query(ask(&role)).await }));
	}

	for task in tasks {
		task.await.expect("task panicked").expect("Query failed.");
	}

	assert_eq!(h.history.len(), 16);
}
