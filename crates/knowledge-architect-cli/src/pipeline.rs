//! The `generate` flow: target note -> neighbours -> prompt -> model -> MOC.
//!
//! Persisting the result is left to the caller so the flow can be dry-run and
//! tested without touching the save directory.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use tracing::{debug, info};

use knowledge_architect::{find_similar, note_title, read_content, EmbeddingIndex, Granularity};

use crate::console::{self, Activity};
use crate::gemini::TextGenerator;
use crate::moc::{render_moc, FrontMatter, MocContext, MocDraft, RenderedMoc};
use crate::prompt::{build_moc_prompt, RelatedNote};

/// Inputs shared by every MOC generated in one run.
pub(crate) struct MocJob<'a> {
    pub(crate) vault: &'a Path,
    pub(crate) index: &'a EmbeddingIndex,
    pub(crate) template: &'a str,
    pub(crate) top_k: usize,
    pub(crate) granularity: Granularity,
    pub(crate) now: NaiveDateTime,
}

#[derive(Debug)]
pub(crate) enum MocOutcome {
    Rendered(RenderedMoc),
    /// The ranker returned nothing for the target.
    NoConnections,
    /// Neighbours were found but none of their files could be read.
    NoReadableConnections,
}

/// Run the generation flow for the note the user named as `target_input`.
///
/// # Errors
///
/// Returns an error when the note is not in the index, its content cannot be
/// read, ranking fails, the model call fails or its answer is not a JSON object.
pub(crate) fn build_moc(
    job: &MocJob<'_>,
    target_input: &str,
    generator: &dyn TextGenerator,
) -> Result<MocOutcome> {
    let target = job.index.resolve_key(target_input).ok_or_else(|| {
        anyhow!(
            "note '{}' not found in the embedding store; please ensure it is indexed",
            target_input
        )
    })?;
    let target_note = read_content(job.vault, target)
        .with_context(|| format!("reading content of target note '{target}'"))?;

    console::finding_connections(target);
    let ranked = find_similar(job.index, target, job.top_k, job.granularity)
        .with_context(|| format!("ranking notes similar to '{target}'"))?;
    if ranked.is_empty() {
        return Ok(MocOutcome::NoConnections);
    }
    debug!(note = target, granularity = %ranked.granularity, "ranked neighbours");

    console::connections_header();
    let mut related = Vec::with_capacity(ranked.len());
    for m in ranked.iter() {
        match read_content(job.vault, &m.key) {
            Ok(note) => {
                console::connection(&note.title(), m.score);
                related.push(RelatedNote {
                    path: m.key.clone(),
                    content: note.content,
                });
            }
            Err(err) => {
                debug!(key = %m.key, error = %err, "skipping unreadable neighbour");
                console::connection_skipped(&note_title(&m.key));
            }
        }
    }
    if related.is_empty() {
        return Ok(MocOutcome::NoReadableConnections);
    }

    let front_matter = FrontMatter::extract(&target_note.content);
    let prompt = build_moc_prompt(target, &target_note.content, &related);

    let activity = Activity::start("Generating Map of Content with Gemini");
    let answer = match generator.generate(&prompt) {
        Ok(answer) => {
            activity.finish("Content generated.");
            answer
        }
        Err(err) => {
            activity.abandon();
            return Err(err).context("the AI model returned an error");
        }
    };

    let draft = MocDraft::from_json(&answer)
        .with_context(|| format!("the AI model returned invalid or unparsable data: {answer}"))?;

    let ctx = MocContext {
        target_path: target,
        related: &related,
        front_matter: &front_matter,
        now: job.now,
    };
    let moc = render_moc(job.template, &draft, &ctx);
    info!(title = %moc.title, links = related.len(), "rendered MOC");
    Ok(MocOutcome::Rendered(moc))
}
