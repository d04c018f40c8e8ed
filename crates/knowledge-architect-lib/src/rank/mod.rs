//! Similarity ranking over an [`EmbeddingIndex`].
//!
//! Given a target note, the ranker resolves a query vector (note vector or
//! the mean of the note's block vectors), scores every other record of the
//! same granularity by cosine similarity and returns the top-k notes.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RankError;
use crate::index::EmbeddingIndex;

pub mod vector;

use vector::{cosine_with_norms, l2_norm, mean_vector};

/// Which kind-view the query is compared against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Note,
    Block,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "note" | "notes" => Ok(Self::Note),
            "block" | "blocks" => Ok(Self::Block),
            other => Err(format!("unknown granularity '{other}' (expected note|block)")),
        }
    }
}

/// One ranked note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarMatch {
    pub key: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Ranked notes, best first, together with the granularity actually used.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub granularity: Granularity,
    pub matches: Vec<SimilarMatch>,
}

impl SimilarityResult {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimilarMatch> {
        self.matches.iter()
    }

    /// `(key, score)` pairs in rank order.
    pub fn pairs(&self) -> Vec<(&str, f32)> {
        self.matches
            .iter()
            .map(|m| (m.key.as_str(), m.score))
            .collect()
    }
}

/// Resolved query: the vector, the view it lives in and the note it belongs to.
struct Query<'a> {
    vector: Cow<'a, [f32]>,
    granularity: Granularity,
    owner: &'a str,
}

/// Find the `top_k` notes most similar to `target_key`.
///
/// # Arguments
///
/// * `index` - loaded embedding index
/// * `target_key` - note key, or block key to query with a single block
/// * `top_k` - maximum number of results
/// * `prefer` - preferred query granularity; the other one is used as fallback
///
/// # Returns
///
/// Matches sorted by descending score with ties kept in scan order. The
/// target note and its own blocks never appear. Fewer than `top_k` results
/// are returned when the corpus is smaller.
///
/// # Errors
///
/// - [`RankError::UnknownKey`] if neither a note nor a block has `target_key`.
/// - [`RankError::NoEmbedding`] if the note has no vector at any granularity.
pub fn find_similar(
    index: &EmbeddingIndex,
    target_key: &str,
    top_k: usize,
    prefer: Granularity,
) -> Result<SimilarityResult, RankError> {
    let query = resolve_query(index, target_key, prefer)?;
    let norm_q = l2_norm(&query.vector);

    let mut matches = match query.granularity {
        Granularity::Note => score_notes(index, &query, norm_q),
        Granularity::Block => score_blocks(index, &query, norm_q),
    };

    // `sort_by` is stable, so equal scores keep their first-seen order.
    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    matches.truncate(top_k);

    debug!(
        note = target_key,
        granularity = %query.granularity,
        results = matches.len(),
        "ranked similar notes"
    );

    Ok(SimilarityResult {
        granularity: query.granularity,
        matches,
    })
}

fn resolve_query<'a>(
    index: &'a EmbeddingIndex,
    target_key: &str,
    prefer: Granularity,
) -> Result<Query<'a>, RankError> {
    if let Some(note) = index.note(target_key) {
        let own = || {
            note.vector()
                .map(|v| (Cow::Borrowed(v), Granularity::Note))
        };
        let blocks = || {
            let vectors: Vec<&[f32]> = index
                .blocks_of(&note.key)
                .map(|b| b.vector.as_slice())
                .collect();
            mean_vector(&vectors).map(|m| (Cow::Owned(m), Granularity::Block))
        };

        let resolved = match prefer {
            Granularity::Note => own().or_else(blocks),
            Granularity::Block => blocks().or_else(own),
        };
        let (vector, granularity) =
            resolved.ok_or_else(|| RankError::NoEmbedding(target_key.to_string()))?;
        return Ok(Query {
            vector,
            granularity,
            owner: &note.key,
        });
    }

    if let Some(block) = index.block(target_key) {
        return Ok(Query {
            vector: Cow::Borrowed(block.vector.as_slice()),
            granularity: Granularity::Block,
            owner: block.parent_key.as_deref().unwrap_or(&block.key),
        });
    }

    Err(RankError::UnknownKey(target_key.to_string()))
}

fn score_notes(index: &EmbeddingIndex, query: &Query<'_>, norm_q: f32) -> Vec<SimilarMatch> {
    index
        .notes()
        .iter()
        .filter(|n| n.key != query.owner)
        .filter_map(|n| n.record.as_ref())
        .map(|r| SimilarMatch {
            key: r.key.clone(),
            score: cosine_with_norms(&query.vector, norm_q, &r.vector, r.norm),
        })
        .collect()
}

/// Score every foreign block and keep the best block score per parent note.
fn score_blocks(index: &EmbeddingIndex, query: &Query<'_>, norm_q: f32) -> Vec<SimilarMatch> {
    let mut matches: Vec<SimilarMatch> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for block in index.blocks() {
        let Some(parent) = block.parent_key.as_deref() else {
            continue;
        };
        if parent == query.owner {
            continue;
        }
        let score = cosine_with_norms(&query.vector, norm_q, &block.vector, block.norm);
        match slots.get(parent) {
            Some(&slot) => {
                let best = &mut matches[slot].score;
                *best = best.max(score);
            }
            None => {
                slots.insert(parent, matches.len());
                matches.push(SimilarMatch {
                    key: parent.to_string(),
                    score,
                });
            }
        }
    }
    matches
}
