//! Per-query state machine.
//!
//! `Received -> Embedding -> Retrieving -> Composing -> Completed`, or `Failed` from any
//! non-terminal stage. A `QueryPipeline` only moves forward one stage at a time and is
//! consumed by `complete`; failures are reported as a `QueryFailure` naming the stage the
//! query was in.

use std::{
	fmt,
	future::Future,
	time::{Duration, Instant},
};

use serde::Serialize;
use uuid::Uuid;

use crate::{Error, QueryFailure, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Received,
	Embedding,
	Retrieving,
	Composing,
	Completed,
}
impl Stage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Received => "received",
			Self::Embedding => "embedding",
			Self::Retrieving => "retrieving",
			Self::Composing => "composing",
			Self::Completed => "completed",
		}
	}

	pub fn next(self) -> Option<Self> {
		match self {
			Self::Received => Some(Self::Embedding),
			Self::Embedding => Some(Self::Retrieving),
			Self::Retrieving => Some(Self::Composing),
			Self::Composing => Some(Self::Completed),
			Self::Completed => None,
		}
	}
}
impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

pub struct QueryPipeline {
	query_id: Uuid,
	role: String,
	stage: Stage,
	started: Instant,
}
impl QueryPipeline {
	pub fn start(query_id: Uuid, role: &str) -> Self {
		tracing::debug!(%query_id, role, stage = %Stage::Received, "Query received.");

		Self { query_id, role: role.to_string(), stage: Stage::Received, started: Instant::now() }
	}

	pub fn query_id(&self) -> Uuid {
		self.query_id
	}

	pub fn stage(&self) -> Stage {
		self.stage
	}

	pub fn elapsed_ms(&self) -> u64 {
		self.started.elapsed().as_millis() as u64
	}

	/// Moves to the next stage. Skipping a stage or advancing into `Completed` is a
	/// programming error; use `complete` for the final transition.
	pub fn advance(&mut self, next: Stage) {
		debug_assert_eq!(self.stage.next(), Some(next), "Stages must advance one at a time.");
		debug_assert_ne!(next, Stage::Completed);

		self.stage = next;

		tracing::debug!(
			query_id = %self.query_id,
			role = %self.role,
			stage = %self.stage,
			elapsed_ms = self.elapsed_ms(),
			"Query stage started."
		);
	}

	/// Terminal transition. Returns the total elapsed milliseconds.
	pub fn complete(mut self) -> u64 {
		debug_assert_eq!(self.stage, Stage::Composing);

		self.stage = Stage::Completed;

		let elapsed_ms = self.elapsed_ms();

		tracing::info!(
			query_id = %self.query_id,
			role = %self.role,
			stage = %self.stage,
			elapsed_ms,
			"Query completed."
		);

		elapsed_ms
	}

	pub fn fail(&self, error: Error) -> QueryFailure {
		let elapsed_ms = self.elapsed_ms();

		match &error {
			Error::AccessViolation { .. } => tracing::error!(
				query_id = %self.query_id,
				role = %self.role,
				stage = %self.stage,
				elapsed_ms,
				error = %error,
				"Query failed."
			),
			_ => tracing::warn!(
				query_id = %self.query_id,
				role = %self.role,
				stage = %self.stage,
				elapsed_ms,
				code = error.code(),
				error = %error,
				"Query failed."
			),
		}

		QueryFailure { query_id: self.query_id, stage: self.stage, error }
	}
}

/// Runs `fut` under a stage deadline. Expiry drops the future and yields `Timeout`.
pub(crate) async fn with_deadline<T, F>(stage: Stage, timeout_ms: u64, fut: F) -> Result<T>
where
	F: Future<Output = Result<T>>,
{
	tokio::time::timeout(Duration::from_millis(timeout_ms), fut)
		.await
		.map_err(|_| Error::Timeout { stage, timeout_ms })?
}

/// Exponential backoff before retry `attempt + 1`, capped at `max_backoff_ms`.
pub(crate) fn backoff_for_attempt(pipeline: &sage_config::Pipeline, attempt: u32) -> Duration {
	let exp = attempt.max(1).saturating_sub(1).min(6);
	let base = pipeline.base_backoff_ms.saturating_mul(1 << exp);

	Duration::from_millis(base.min(pipeline.max_backoff_ms))
}
