//! Typed errors for the three library operations.
//!
//! Malformed individual records never surface here; the loader recovers from
//! them locally and reports them through [`crate::index::LoadStats`].

use std::path::PathBuf;

use thiserror::Error;

use crate::index::LoadStats;

/// Failures of [`crate::store::load_index`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The embedding store directory does not exist under the vault root.
    #[error("embedding store not found at {}", .0.display())]
    StoreNotFound(PathBuf),

    /// The store exists but yielded zero usable vectors.
    #[error(
        "no valid embedding records in {} ({} files scanned, {} fragments skipped)",
        .path.display(),
        .stats.files_scanned,
        .stats.fragments_skipped
    )]
    NoValidRecords { path: PathBuf, stats: LoadStats },

    /// The store directory itself could not be enumerated.
    #[error("reading embedding store {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of [`crate::rank::find_similar`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RankError {
    #[error("'{0}' is not present in the embedding index")]
    UnknownKey(String),

    #[error("'{0}' has no usable embedding at note or block level")]
    NoEmbedding(String),
}

/// Failures of [`crate::content::read_content`].
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("note '{path}' could not be read")]
    NoteNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("note path '{0}' resolves outside the vault")]
    PathTraversal(String),
}
