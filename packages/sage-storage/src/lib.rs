pub mod corpus;
pub mod history;
pub mod index;

mod error;

pub use error::{Error, Result};
pub use history::{HistoryStore, JsonlHistory, MemoryHistory};
pub use index::{IndexStats, MemoryIndex, PassageIndex, cosine_similarity};
