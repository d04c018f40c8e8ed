//! In-memory embedding index built once from the store.
//!
//! The index is an explicitly constructed value: build it with
//! [`IndexBuilder`] (or [`crate::store::load_index`]) and pass it by reference
//! to the ranker. Several indices can coexist, which keeps tests independent.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::embedding_record::{EmbeddingRecord, NoteEntry, RecordKind};

/// Diagnostic counters collected while loading a store.
///
/// Every malformed input is recovered locally and counted here; none of
/// these conditions abort a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub files_scanned: usize,
    pub fragments_parsed: usize,
    /// Fragments that failed to parse and were resynchronized past.
    pub fragments_skipped: usize,
    /// Parsed fragments with no usable shape (not an object, no key).
    pub records_skipped: usize,
    pub missing_vectors: usize,
    pub dimension_mismatches: usize,
    pub orphaned_blocks: usize,
    pub deleted_records: usize,
}

/// Read-only note and block embeddings keyed by relative path.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    notes: Vec<NoteEntry>,
    note_slots: HashMap<String, usize>,
    blocks: Vec<EmbeddingRecord>,
    block_slots: HashMap<String, usize>,
    note_dim: Option<usize>,
    block_dim: Option<usize>,
    model: Option<String>,
    stats: LoadStats,
}

impl EmbeddingIndex {
    pub fn builder() -> IndexBuilder {
        IndexBuilder::default()
    }

    /// All notes in first-seen scan order, including those without a vector.
    pub fn notes(&self) -> &[NoteEntry] {
        &self.notes
    }

    /// All blocks in first-seen scan order. Every block has a resolvable parent.
    pub fn blocks(&self) -> &[EmbeddingRecord] {
        &self.blocks
    }

    pub fn note(&self, key: &str) -> Option<&NoteEntry> {
        self.note_slots.get(key).map(|&i| &self.notes[i])
    }

    pub fn block(&self, key: &str) -> Option<&EmbeddingRecord> {
        self.block_slots.get(key).map(|&i| &self.blocks[i])
    }

    /// Blocks owned by `note_key`, in scan order.
    pub fn blocks_of<'a>(&'a self, note_key: &str) -> impl Iterator<Item = &'a EmbeddingRecord> {
        self.note(note_key)
            .map(|n| n.block_keys.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(move |k| self.block(k))
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of records carrying a usable vector, across both kinds.
    pub fn vector_count(&self) -> usize {
        self.notes.iter().filter(|n| n.record.is_some()).count() + self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector_count() == 0
    }

    pub fn note_dim(&self) -> Option<usize> {
        self.note_dim
    }

    pub fn block_dim(&self) -> Option<usize> {
        self.block_dim
    }

    /// Embedding model the per-model vectors were read from, if any record had one.
    pub fn embedding_model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    /// Map user input onto a stored note key.
    ///
    /// Backslashes are normalized to `/`; an exact match wins, otherwise the
    /// first note (in scan order) matching case-insensitively is returned.
    pub fn resolve_key(&self, input: &str) -> Option<&str> {
        let wanted = input.trim().replace('\\', "/");
        if let Some(note) = self.note(&wanted) {
            return Some(note.key.as_str());
        }
        self.notes
            .iter()
            .find(|n| n.key.eq_ignore_ascii_case(&wanted))
            .map(|n| n.key.as_str())
    }
}

/// Incremental constructor for [`EmbeddingIndex`].
///
/// Records are upserted: a later record for an existing key replaces the
/// vector in place and keeps the first-seen position. The dimension of each
/// kind-view is settled in [`finish`](Self::finish): the most common length
/// wins (ties go to the length seen first) and other vectors are dropped.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    notes: Vec<Option<NoteEntry>>,
    note_slots: HashMap<String, usize>,
    blocks: Vec<Option<EmbeddingRecord>>,
    block_slots: HashMap<String, usize>,
    pub(crate) model: Option<String>,
    pub(crate) stats: LoadStats,
}

impl IndexBuilder {
    /// Register a note, with its vector when it has one.
    ///
    /// A missing vector never erases a vector recorded earlier for the same key.
    pub fn add_note(&mut self, key: &str, vector: Option<Vec<f32>>) -> &mut Self {
        let slot = match self.note_slots.get(key) {
            Some(&slot) => slot,
            None => {
                self.notes.push(Some(NoteEntry::new(key)));
                self.note_slots.insert(key.to_string(), self.notes.len() - 1);
                self.notes.len() - 1
            }
        };

        let Some(vector) = vector else {
            self.stats.missing_vectors += 1;
            return self;
        };
        if let Some(entry) = self.notes[slot].as_mut() {
            entry.record = Some(EmbeddingRecord::note(key, vector));
        }
        self
    }

    /// Register a block owned by `parent_key`. Blocks without a vector are omitted.
    pub fn add_block(
        &mut self,
        key: &str,
        parent_key: &str,
        vector: Option<Vec<f32>>,
    ) -> &mut Self {
        let Some(vector) = vector else {
            self.stats.missing_vectors += 1;
            return self;
        };

        let record = EmbeddingRecord::block(key, parent_key, vector);
        match self.block_slots.get(key) {
            Some(&slot) => self.blocks[slot] = Some(record),
            None => {
                self.blocks.push(Some(record));
                self.block_slots.insert(key.to_string(), self.blocks.len() - 1);
            }
        }
        self
    }

    /// Drop a previously registered note or block.
    pub fn remove(&mut self, key: &str, kind: RecordKind) -> &mut Self {
        let removed = match kind {
            RecordKind::Note => self
                .note_slots
                .remove(key)
                .and_then(|slot| self.notes[slot].take())
                .is_some(),
            RecordKind::Block => self
                .block_slots
                .remove(key)
                .and_then(|slot| self.blocks[slot].take())
                .is_some(),
        };
        if removed {
            self.stats.deleted_records += 1;
        }
        self
    }

    /// Freeze the builder: settle dimensions, link blocks to their notes and
    /// drop orphans.
    pub fn finish(self) -> EmbeddingIndex {
        let mut stats = self.stats;

        let mut notes: Vec<NoteEntry> = self.notes.into_iter().flatten().collect();
        let note_dim = dominant_dim(notes.iter().filter_map(|n| n.vector()).map(<[f32]>::len));
        for note in &mut notes {
            let dim = note.vector().map(<[f32]>::len);
            if dim.is_some() && dim != note_dim {
                debug!(
                    key = %note.key,
                    ?dim,
                    expected = ?note_dim,
                    "dropping note vector with mismatched dimension"
                );
                note.record = None;
                stats.dimension_mismatches += 1;
            }
        }
        let note_slots: HashMap<String, usize> = notes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.key.clone(), i))
            .collect();

        let live_blocks: Vec<EmbeddingRecord> = self.blocks.into_iter().flatten().collect();
        let block_dim = dominant_dim(live_blocks.iter().map(|b| b.vector.len()));

        let mut blocks = Vec::new();
        let mut block_slots = HashMap::new();
        for block in live_blocks {
            if Some(block.vector.len()) != block_dim {
                debug!(
                    key = %block.key,
                    dim = block.vector.len(),
                    expected = ?block_dim,
                    "dropping block vector with mismatched dimension"
                );
                stats.dimension_mismatches += 1;
                continue;
            }
            let parent = block.parent_key.as_deref().unwrap_or_default();
            match note_slots.get(parent) {
                Some(&slot) => {
                    notes[slot].block_keys.push(block.key.clone());
                    block_slots.insert(block.key.clone(), blocks.len());
                    blocks.push(block);
                }
                None => {
                    stats.orphaned_blocks += 1;
                    debug!(key = %block.key, parent, "dropping block without a parent note");
                }
            }
        }

        if stats.dimension_mismatches > 0 {
            warn!(
                dropped = stats.dimension_mismatches,
                ?note_dim,
                ?block_dim,
                "dropped vectors whose dimension differs from the rest of the store"
            );
        }

        EmbeddingIndex {
            notes,
            note_slots,
            blocks,
            block_slots,
            note_dim,
            block_dim,
            model: self.model,
            stats,
        }
    }
}

/// Most common vector length, ties going to the length seen first.
fn dominant_dim(dims: impl Iterator<Item = usize>) -> Option<usize> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for dim in dims {
        match counts.iter_mut().find(|(d, _)| *d == dim) {
            Some((_, n)) => *n += 1,
            None => counts.push((dim, 1)),
        }
    }
    counts
        .into_iter()
        .reduce(|best, next| if next.1 > best.1 { next } else { best })
        .map(|(dim, _)| dim)
}
