//! Embedding store loader.
//!
//! Scans the plugin's store directory under the vault root, parses every
//! store file with the tolerant [`stream::FragmentReader`], interprets the
//! fragments with [`schema::interpret`] and builds an [`EmbeddingIndex`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::index::{EmbeddingIndex, IndexBuilder};
use crate::model::embedding_record::RecordKind;

pub mod schema;
pub mod stream;

use schema::Interpreted;
use stream::{Fragment, FragmentReader};

/// Store directory the Smart Connections plugin writes, relative to the vault root.
pub const DEFAULT_STORE_DIR: &str = ".smart-env/multi";

/// Where and how to read the embedding store.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Store directory, relative to the vault root (absolute paths are used as is).
    pub store_dir: PathBuf,
    /// File extensions (without dot) treated as store files.
    pub extensions: Vec<String>,
    /// Embedding model to read when entries carry several.
    pub embedding_model: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            extensions: vec!["ajson".to_string(), "json".to_string()],
            embedding_model: None,
        }
    }
}

/// Load the embedding index for the vault at `vault_root`.
///
/// # Errors
///
/// - [`StoreError::StoreNotFound`] if the store directory is absent.
/// - [`StoreError::Io`] if the directory cannot be listed.
/// - [`StoreError::NoValidRecords`] if nothing usable was found after
///   skipping malformed content.
pub fn load_index(vault_root: &Path, config: &LoaderConfig) -> Result<EmbeddingIndex, StoreError> {
    let store = vault_root.join(&config.store_dir);
    if !store.is_dir() {
        return Err(StoreError::StoreNotFound(store));
    }

    let files = list_store_files(&store, &config.extensions)?;
    let mut builder = EmbeddingIndex::builder();
    let mut fragments = Vec::new();
    for path in &files {
        let text = match fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable store file");
                builder.stats.fragments_skipped += 1;
                continue;
            }
        };
        builder.stats.files_scanned += 1;
        debug!(path = %path.display(), bytes = text.len(), "scanning store file");
        fragments.extend(read_fragments(&mut builder, &text));
    }
    ingest(&mut builder, fragments, config.embedding_model.as_deref());

    let index = builder.finish();
    info!(
        notes = index.note_count(),
        blocks = index.block_count(),
        model = ?index.embedding_model(),
        files = index.stats().files_scanned,
        skipped = index.stats().fragments_skipped,
        orphaned = index.stats().orphaned_blocks,
        "loaded embedding index"
    );

    if index.is_empty() {
        return Err(StoreError::NoValidRecords {
            path: store,
            stats: *index.stats(),
        });
    }
    Ok(index)
}

/// Build an index from the text of a single store file.
///
/// Useful for in-memory stores; unlike [`load_index`] an index without any
/// usable vector is returned as is.
pub fn index_from_str(text: &str, config: &LoaderConfig) -> EmbeddingIndex {
    let mut builder = EmbeddingIndex::builder();
    let fragments = read_fragments(&mut builder, text);
    ingest(&mut builder, fragments, config.embedding_model.as_deref());
    builder.finish()
}

fn read_fragments(builder: &mut IndexBuilder, text: &str) -> Vec<Fragment> {
    let mut reader = FragmentReader::new(text);
    let fragments: Vec<Fragment> = reader.by_ref().collect();
    builder.stats.fragments_parsed += fragments.len();
    builder.stats.fragments_skipped += reader.skipped();
    fragments
}

/// Interpret every fragment of the store against one embedding model.
///
/// The configured model wins; otherwise the model most records carry is used
/// for the whole store so vectors of different models are never mixed.
fn ingest(builder: &mut IndexBuilder, fragments: Vec<Fragment>, configured: Option<&str>) {
    let model = configured
        .map(str::to_string)
        .or_else(|| schema::dominant_model(&fragments));
    debug!(model = ?model, configured = configured.is_some(), "embedding model selected");

    for fragment in fragments {
        for record in schema::interpret(fragment, model.as_deref()) {
            apply(builder, record);
        }
    }
    builder.model = model;
}

fn apply(builder: &mut IndexBuilder, record: Interpreted) {
    match record {
        Interpreted::Note(note) => {
            builder.add_note(&note.key, note.vector);
            for block in note.blocks {
                builder.add_block(&block.key, &note.key, block.vector);
            }
            builder.stats.records_skipped += note.skipped_blocks;
        }
        Interpreted::Block {
            key,
            parent_key,
            vector,
        } => {
            builder.add_block(&key, &parent_key, vector);
        }
        Interpreted::Delete { key, block } => {
            let kind = if block {
                RecordKind::Block
            } else {
                RecordKind::Note
            };
            builder.remove(&key, kind);
        }
        Interpreted::Unusable(reason) => {
            builder.stats.records_skipped += 1;
            debug!(reason, "skipping unusable store record");
        }
    }
}

/// Store files directly under `dir`, sorted by file name for a deterministic scan order.
fn list_store_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, StoreError> {
    let io_err = |source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_file() {
            continue;
        }
        let accepted = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
        if accepted {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_tracks_counters() {
        let text = concat!(
            "\"smart_sources:a.md\": {\"path\": \"a.md\", \"embeddings\": {\"m\": {\"vec\": [1, 0]}}},\n",
            "\"smart_blocks:a.md#One\": {\"embeddings\": {\"m\": {\"vec\": [0, 1, 0]}}},\n",
            "\"smart_blocks:zzz.md#Two\": {\"vec\": [1, 1, 1]},\n",
            "42\n",
            "\"smart_sources:b.md\": {\"path\": \"b.md\"},\n",
            "\"smart_sources:b.md\": null,\n",
        );
        let index = index_from_str(text, &LoaderConfig::default());

        assert_eq!(index.note_count(), 1);
        assert_eq!(index.block_count(), 1);
        let stats = index.stats();
        assert_eq!(stats.fragments_parsed, 6);
        assert_eq!(stats.fragments_skipped, 0);
        assert_eq!(stats.records_skipped, 1);
        assert_eq!(stats.orphaned_blocks, 1);
        assert_eq!(stats.deleted_records, 1);
        assert_eq!(stats.missing_vectors, 1);
    }

    #[test]
    fn one_embedding_model_is_used_for_the_whole_store() {
        let text = concat!(
            "{\"key\": \"a.md\", \"embeddings\": {\"old-model\": {\"vec\": [1, 0]}, \"z-new\": {\"vec\": [0, 1]}}}\n",
            "{\"key\": \"b.md\", \"embeddings\": {\"z-new\": {\"vec\": [1, 0]}}}\n",
            "{\"key\": \"c.md\", \"embeddings\": {\"old-model\": {\"vec\": [1, 0, 0]}}}\n",
        );
        let index = index_from_str(text, &LoaderConfig::default());

        assert_eq!(index.embedding_model(), Some("z-new"));
        assert_eq!(index.note("a.md").unwrap().vector(), Some(&[0.0, 1.0][..]));
        assert!(index.note("c.md").unwrap().record.is_none());
        assert_eq!(index.stats().missing_vectors, 1);
        assert_eq!(index.stats().dimension_mismatches, 0);

        let pinned = LoaderConfig {
            embedding_model: Some("old-model".into()),
            ..LoaderConfig::default()
        };
        let index = index_from_str(text, &pinned);
        assert_eq!(index.embedding_model(), Some("old-model"));
        assert!(index.note("b.md").unwrap().record.is_none());
    }

    #[test]
    fn default_config_targets_plugin_directory() {
        let cfg = LoaderConfig::default();
        assert_eq!(cfg.store_dir, PathBuf::from(".smart-env/multi"));
        assert!(cfg.extensions.iter().any(|e| e == "ajson"));
    }
}
