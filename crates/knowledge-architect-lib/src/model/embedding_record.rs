//! Embedding records and the note entries that anchor them.

use serde::{Deserialize, Serialize};

use crate::rank::vector::l2_norm;

/// Granularity of an embedded unit of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Note,
    Block,
}

/// One embedded unit of content: a whole note or a heading-delimited block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Relative note path, or path plus `#heading` marker for blocks.
    pub key: String,
    pub vector: Vec<f32>,
    /// Precomputed L2 norm of `vector` for fast cosine similarity computation.
    /// This is computed once during loading and reused during queries.
    pub norm: f32,
    pub kind: RecordKind,
    /// Key of the owning note for `Block` records.
    pub parent_key: Option<String>,
}

impl EmbeddingRecord {
    pub fn note(key: impl Into<String>, vector: Vec<f32>) -> Self {
        Self::new(key.into(), vector, RecordKind::Note, None)
    }

    pub fn block(key: impl Into<String>, parent_key: impl Into<String>, vector: Vec<f32>) -> Self {
        Self::new(
            key.into(),
            vector,
            RecordKind::Block,
            Some(parent_key.into()),
        )
    }

    fn new(key: String, vector: Vec<f32>, kind: RecordKind, parent_key: Option<String>) -> Self {
        let norm = l2_norm(&vector);
        Self {
            key,
            vector,
            norm,
            kind,
            parent_key,
        }
    }

    pub fn dim(&self) -> usize {
        self.vector.len()
    }
}

/// A note as it exists structurally in the store.
///
/// A note may carry no vector of its own when only its blocks were embedded;
/// it still anchors those blocks.
#[derive(Debug, Clone)]
pub struct NoteEntry {
    pub key: String,
    pub record: Option<EmbeddingRecord>,
    /// Keys of blocks owned by this note, in scan order.
    pub block_keys: Vec<String>,
}

impl NoteEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            record: None,
            block_keys: Vec::new(),
        }
    }

    pub fn vector(&self) -> Option<&[f32]> {
        self.record.as_ref().map(|r| r.vector.as_slice())
    }
}
