//! Map of Content rendering.
//!
//! - `MocDraft`: the model's JSON answer, read with tolerant field types
//! - `FrontMatter`: `key: value` pairs from the target note's YAML header
//! - `render_moc`: fills `{{placeholder}}` tokens of the user's template
//!
//! Placeholders are substituted in a single pass, so text produced by the
//! model is never re-scanned for further tokens. Unknown placeholders are left
//! untouched.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDateTime};
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use knowledge_architect::note_title;

use crate::prompt::RelatedNote;

const DEFAULT_REVISION_STAGE: &str = "SR1";
const SECOND_REVIEW_AFTER_DAYS: i64 = 7;

/// Fields of the generated MOC, normalized to plain strings and lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct MocDraft {
    pub(crate) title: Option<String>,
    pub(crate) core_idea: String,
    pub(crate) key_details: String,
    pub(crate) body: String,
    pub(crate) flowchart_or_cause_effect: String,
    pub(crate) gs_paper: String,
    pub(crate) linked_pyqs: Vec<String>,
    pub(crate) key_terms: Vec<String>,
    pub(crate) use_in_essay: String,
    pub(crate) note_type: String,
    pub(crate) source_type: String,
    pub(crate) revision_stage: String,
    pub(crate) has_diagram: bool,
}

impl MocDraft {
    /// Parse the model's answer. The top-level value must be a JSON object.
    pub(crate) fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(strip_code_fence(text))
            .context("model output is not valid JSON")?;
        let Value::Object(obj) = value else {
            bail!("model output is not a JSON object");
        };
        Ok(Self::from_object(&obj))
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        let text = |field: &str| obj.get(field).map(joined_text).unwrap_or_default();
        let list = |field: &str| obj.get(field).map(string_list).unwrap_or_default();

        Self {
            title: obj
                .get("title")
                .map(joined_text)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            core_idea: text("core_idea"),
            key_details: obj.get("key_details").map(key_details_text).unwrap_or_default(),
            body: text("body"),
            flowchart_or_cause_effect: text("flowchart_or_cause_effect"),
            gs_paper: text("gs_paper"),
            linked_pyqs: list("linked_pyqs"),
            key_terms: list("key_terms"),
            use_in_essay: text("use_in_essay"),
            note_type: text("note_type"),
            source_type: text("source_type"),
            revision_stage: match obj.get("revision_stage") {
                None | Some(Value::Null) => DEFAULT_REVISION_STAGE.to_string(),
                Some(v) => joined_text(v),
            },
            has_diagram: obj.get("has_diagram").is_some_and(truthy),
        }
    }
}

/// Models sometimes wrap JSON mode output in a Markdown fence anyway.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Strings as is, lists joined line by line.
fn joined_text(value: &Value) -> String {
    match value {
        Value::Array(items) => items.iter().map(scalar_text).collect::<Vec<_>>().join("\n"),
        other => scalar_text(other),
    }
}

/// `{heading, content}` items become `### heading` sections.
fn key_details_text(value: &Value) -> String {
    let Value::Array(items) = value else {
        return scalar_text(value);
    };
    items
        .iter()
        .map(|item| match (item.get("heading"), item.get("content")) {
            (Some(heading), Some(content)) => {
                format!("### {}\n\n{}", scalar_text(heading), joined_text(content))
            }
            _ => scalar_text(item),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(scalar_text)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::Null => Vec::new(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        other => vec![scalar_text(other)],
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

/// A front matter value: a scalar or a `[a, b]` flow list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FrontValue {
    Text(String),
    List(Vec<String>),
}

/// Flat `key: value` view of a note's YAML front matter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FrontMatter(BTreeMap<String, FrontValue>);

static FRONT_MATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A---[ \t]*\r?\n(.*?)\r?\n---[ \t]*(?:\r?\n|\z)").unwrap()
});
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Za-z0-9_-]+)\}\}").unwrap());

impl FrontMatter {
    /// Parse the leading `---` block of `content`; no block yields an empty map.
    ///
    /// This is a line scanner, not a YAML parser: nested structures and
    /// multi-line values are ignored.
    pub(crate) fn extract(content: &str) -> Self {
        let Some(caps) = FRONT_MATTER_RE.captures(content) else {
            return Self::default();
        };
        let mut fields = BTreeMap::new();
        for line in caps[1].lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let value = value.trim();
            let parsed = match value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
                Some(inner) => FrontValue::List(
                    inner
                        .split(',')
                        .map(|item| item.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
                        .filter(|item| !item.is_empty())
                        .collect(),
                ),
                None => FrontValue::Text(value.trim_matches(|c| c == '"' || c == '\'').to_string()),
            };
            fields.insert(key.to_string(), parsed);
        }
        Self(fields)
    }

    pub(crate) fn get(&self, key: &str) -> Option<&FrontValue> {
        self.0.get(key)
    }

    pub(crate) fn text(&self, key: &str) -> String {
        match self.get(key) {
            Some(FrontValue::Text(s)) => s.clone(),
            Some(FrontValue::List(items)) => items.join(", "),
            None => String::new(),
        }
    }

    /// List value for `key`; a scalar becomes a one-element list.
    pub(crate) fn list(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            FrontValue::List(items) => Some(items.clone()),
            FrontValue::Text(s) if s.is_empty() => None,
            FrontValue::Text(s) => Some(vec![s.clone()]),
        }
    }
}

/// Everything besides the draft that goes into a rendered MOC.
pub(crate) struct MocContext<'a> {
    pub(crate) target_path: &'a str,
    pub(crate) related: &'a [RelatedNote],
    pub(crate) front_matter: &'a FrontMatter,
    pub(crate) now: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RenderedMoc {
    pub(crate) title: String,
    pub(crate) file_name: String,
    pub(crate) content: String,
}

/// Fill `template` with the draft and its context.
pub(crate) fn render_moc(template: &str, draft: &MocDraft, ctx: &MocContext<'_>) -> RenderedMoc {
    let target_title = note_title(ctx.target_path);
    let title = draft
        .title
        .clone()
        .unwrap_or_else(|| format!("Map of Content - {target_title}"));

    let today = ctx.now.format("%Y-%m-%d").to_string();
    let sr2_due = (ctx.now + Duration::days(SECOND_REVIEW_AFTER_DAYS))
        .format("%Y-%m-%d")
        .to_string();
    let gs_tags = ctx
        .front_matter
        .list("gs-tags")
        .unwrap_or_else(|| vec!["MOC".to_string()]);

    let related_titles: Vec<String> = ctx.related.iter().map(RelatedNote::title).collect();
    let related_yaml = related_titles
        .iter()
        .map(|t| format!("- \"[[{t}]]\""))
        .collect::<Vec<_>>()
        .join("\n");
    let related_body = related_titles
        .iter()
        .map(|t| format!("- [[{t}]]"))
        .collect::<Vec<_>>()
        .join("\n");

    let values: HashMap<&str, String> = HashMap::from([
        ("id", format!("{}-MOC", ctx.now.format("%Y%m%d-%H%M%S"))),
        ("title", format!("\"{}\"", title.replace('"', "\\\""))),
        ("type", "MOC".to_string()),
        ("note_type", draft.note_type.clone()),
        ("source", format!("\n  - \"[[{target_title}]]\"")),
        ("source_type", draft.source_type.clone()),
        ("subject", ctx.front_matter.text("subject")),
        ("gs_paper", draft.gs_paper.clone()),
        ("gs-tags", json_list(&gs_tags)),
        ("keywords", json_list(&draft.key_terms)),
        ("linked_pyqs", json_list(&draft.linked_pyqs)),
        ("status", "draft".to_string()),
        ("maturity", "1".to_string()),
        ("priority", "medium".to_string()),
        ("link-density", "high".to_string()),
        ("granularity", "index".to_string()),
        ("answer_utility", "high".to_string()),
        ("use_in_essay", draft.use_in_essay.clone()),
        ("from_daily", today.clone()),
        ("revision_stage", draft.revision_stage.clone()),
        ("has_diagram", draft.has_diagram.to_string()),
        ("created", today.clone()),
        ("updated", today.clone()),
        ("sr1_date", today),
        ("sr2_due", sr2_due),
        ("related_links_yaml", related_yaml),
        ("related_links_body", related_body),
        ("core_idea", draft.core_idea.clone()),
        ("key_details", draft.key_details.clone()),
        ("moc_body", draft.body.clone()),
        ("flowchart_or_cause_effect", draft.flowchart_or_cause_effect.clone()),
    ]);

    let content = PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| match values.get(&caps[1]) {
            Some(v) => v.clone(),
            None => caps[0].to_string(),
        })
        .into_owned();

    RenderedMoc {
        file_name: moc_file_name(&title),
        title,
        content,
    }
}

fn json_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// File name for a MOC titled `title`.
pub(crate) fn moc_file_name(title: &str) -> String {
    let stem = title.replace(' ', "-").replace(':', "").replace('/', "-");
    format!("{stem}.md")
}

/// Write `moc` into `dir`, creating the directory when missing.
pub(crate) fn save_moc(dir: &Path, moc: &RenderedMoc) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating MOC directory {}", dir.display()))?;
    let path = dir.join(&moc.file_name);
    fs::write(&path, &moc.content).with_context(|| format!("writing MOC {}", path.display()))?;
    Ok(path)
}
