//! Prompt assembly for MOC generation.

use std::fmt::Write as _;

use knowledge_architect::note_title;

/// A ranked neighbour of the target note whose content could be read.
#[derive(Debug, Clone)]
pub(crate) struct RelatedNote {
    pub(crate) path: String,
    pub(crate) content: String,
}

impl RelatedNote {
    pub(crate) fn title(&self) -> String {
        note_title(&self.path)
    }
}

/// Build the instruction prompt asking for a JSON-encoded MOC draft.
pub(crate) fn build_moc_prompt(
    target_path: &str,
    target_content: &str,
    related: &[RelatedNote],
) -> String {
    let target_title = note_title(target_path);

    let mut context = String::new();
    let mut wikilinks = String::new();
    for note in related {
        let title = note.title();
        let _ = write!(context, "\n### {title}\n```\n{}\n```", note.content);
        let _ = writeln!(wikilinks, "- `[[{title}]]`");
    }

    format!(
        r#"You are a Zettelkasten and knowledge management expert specializing in UPSC exam preparation. Your task is to generate the title and body for a "Map of Content" (MOC) note.

A new note titled "{target_title}" was just created. Its content is as follows:

```
{target_content}
```

Based on its semantic content, it is highly related to the following existing notes. Their content is provided below:
{context}

Synthesize the core themes, interconnections, and significance of the new note and its related notes. Your output should be a JSON object with the following keys:
1.  `title`: A concise and descriptive title for the MOC.
2.  `core_idea`: A brief, insightful paragraph explaining the overarching concept that connects all these notes.
3.  `key_details`: A more detailed explanation, organized into bullet points or short paragraphs, covering the key facets and relationships derived from the notes. This should go beyond a simple summary and delve into the deeper implications and relationships, suitable for UPSC level understanding.
4.  `body`: (Optional) Any additional comprehensive and analytical explanation that doesn't fit into `core_idea` or `key_details`.
5.  `flowchart_or_cause_effect`: (Optional) A simple flowchart or cause-and-effect chain in Mermaid syntax to visually represent the key relationships.
6.  `gs_paper`: The relevant GS Paper (e.g., GS1, GS2, GS3, GS4, Essay).
7.  `linked_pyqs`: (Optional) A list of relevant previous year questions (PYQs).
8.  `key_terms`: A list of key terms and concepts.
9.  `use_in_essay`: (Optional) A relevant essay idea or theme.
10. `note_type`: (Optional) The type of note (e.g., concept, theme, event, rebellion).
11. `source_type`: (Optional) The source type (e.g., Book, CA, YT, Class).
12. `revision_stage`: (Optional) The revision stage (e.g., SR1-SR5).
13. `has_diagram`: (Optional) Boolean indicating if a diagram is present.

Do NOT include any YAML front matter or extra text outside the JSON object.

Here are the wikilinks to include in the `key_details` or `body` sections:
{wikilinks}"#
    )
}
