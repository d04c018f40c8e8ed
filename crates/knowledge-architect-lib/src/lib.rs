//! Library entry point for the Knowledge Architect retrieval core.
//!
//! Three operations make up the public surface:
//!
//! - [`load_index`]: scan a vault's embedding store into an [`EmbeddingIndex`]
//! - [`find_similar`]: rank notes by cosine similarity to a target note
//! - [`read_content`]: read a note's raw text with path-safety validation
//!
//! Everything returns plain data; prompt assembly, model calls and template
//! rendering live in the CLI crate.
//
// Public modules
pub mod content;
pub mod error;
pub mod index;
pub mod model;
pub mod rank;
pub mod store;
pub mod utils;

// Re‑export primary types for ergonomic use.
pub use content::read_content;
pub use error::{ContentError, RankError, StoreError};
pub use index::{EmbeddingIndex, IndexBuilder, LoadStats};
pub use model::{
    embedding_record::{EmbeddingRecord, NoteEntry, RecordKind},
    note_text::{note_title, NoteTextHandle},
};
pub use rank::{find_similar, Granularity, SimilarMatch, SimilarityResult};
pub use store::{index_from_str, load_index, LoaderConfig, DEFAULT_STORE_DIR};
