use std::path::Path;

use serde::{Deserialize, Serialize};

/// Raw text of one vault note, fetched on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteTextHandle {
    pub relative_path: String,
    pub content: String,
}

impl NoteTextHandle {
    /// File stem of the note, as used inside `[[wikilinks]]`.
    pub fn title(&self) -> String {
        note_title(&self.relative_path)
    }
}

/// File stem of a relative note path with the `.md` suffix removed.
pub fn note_title(relative_path: &str) -> String {
    let normalized = relative_path.replace('\\', "/");
    let name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&normalized);
    name.strip_suffix(".md").unwrap_or(name).to_string()
}
