pub mod model;
pub mod role;
pub mod tier;

mod error;

pub use error::{Error, Result};
pub use model::{
	Answer, Embedding, EmbeddingSource, HistoryEntry, Passage, PassageInput, Query,
	RetrievalResult, ScoredPassage,
};
pub use role::{Partition, PartitionSet, Role};
pub use tier::AccessRule;

use std::{future::Future, pin::Pin};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
