//! Note content accessor.
//!
//! Resolves a vault-relative note path to its raw text. Paths come from user
//! input and config, so they are validated to stay inside the vault both
//! lexically and after symlink resolution.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::ContentError;
use crate::model::note_text::NoteTextHandle;

/// Read the raw text of the note at `relative_path` under `vault_root`.
///
/// # Errors
///
/// - [`ContentError::PathTraversal`] if the path is absolute or resolves
///   outside `vault_root`.
/// - [`ContentError::NoteNotFound`] if the file is missing, unreadable or
///   not valid UTF-8.
pub fn read_content(
    vault_root: &Path,
    relative_path: &str,
) -> Result<NoteTextHandle, ContentError> {
    let normalized = relative_path.trim().replace('\\', "/");
    let relative = confine(&normalized)?;

    let not_found = |source: Option<std::io::Error>| ContentError::NoteNotFound {
        path: normalized.clone(),
        source,
    };

    let root = vault_root.canonicalize().map_err(|e| not_found(Some(e)))?;
    let resolved = root
        .join(&relative)
        .canonicalize()
        .map_err(|e| not_found(Some(e)))?;
    if !resolved.starts_with(&root) {
        return Err(ContentError::PathTraversal(normalized.clone()));
    }

    let bytes = fs::read(&resolved).map_err(|e| not_found(Some(e)))?;
    let content = String::from_utf8(bytes).map_err(|_| not_found(None))?;
    debug!(path = %normalized, bytes = content.len(), "read note content");

    Ok(NoteTextHandle {
        relative_path: normalized,
        content,
    })
}

/// Lexically normalize `relative`, rejecting anything that leaves the root.
fn confine(relative: &str) -> Result<PathBuf, ContentError> {
    let mut clean = PathBuf::new();
    let mut depth = 0usize;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                clean.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(ContentError::PathTraversal(relative.to_string()));
                }
                clean.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ContentError::PathTraversal(relative.to_string()));
            }
        }
    }
    if depth == 0 {
        return Err(ContentError::NoteNotFound {
            path: relative.to_string(),
            source: None,
        });
    }
    Ok(clean)
}
