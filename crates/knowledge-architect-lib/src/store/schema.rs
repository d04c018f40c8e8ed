//! Interpretation of parsed store fragments into note and block records.
//!
//! No schema is enforced beyond "key: string, vector: array of numbers";
//! anything else is tolerated and reported as unusable instead of failing.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::stream::Fragment;

/// Key prefix the producing plugin uses for whole-note entries.
pub const SOURCE_PREFIX: &str = "smart_sources:";
/// Key prefix the producing plugin uses for block entries.
pub const BLOCK_PREFIX: &str = "smart_blocks:";

const VECTOR_FIELDS: [&str; 3] = ["vec", "vector", "embedding"];
const KEY_FIELDS: [&str; 2] = ["key", "path"];

/// Block nested inside a note object.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub key: String,
    pub vector: Option<Vec<f32>>,
}

/// Note object together with its nested blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNote {
    pub key: String,
    pub vector: Option<Vec<f32>>,
    pub blocks: Vec<RawBlock>,
    /// Nested block entries that carried an object but no usable key.
    pub skipped_blocks: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interpreted {
    Note(RawNote),
    Block {
        key: String,
        parent_key: String,
        vector: Option<Vec<f32>>,
    },
    /// A keyed `null` entry: the key was deleted after it was written.
    Delete { key: String, block: bool },
    Unusable(&'static str),
}

/// Embedding model carried by the most records across `fragments`.
///
/// Ties go to the first name in key order. Returns `None` when no record
/// carries a per-model `embeddings` map.
pub fn dominant_model(fragments: &[Fragment]) -> Option<String> {
    let mut counts = BTreeMap::new();
    for fragment in fragments {
        let (Fragment::Bare(value) | Fragment::Keyed { value, .. }) = fragment;
        count_models(value, &mut counts);
    }
    counts
        .into_iter()
        .fold(None, |best: Option<(String, usize)>, (name, n)| match best {
            Some((_, most)) if most >= n => best,
            _ => Some((name, n)),
        })
        .map(|(name, _)| name)
}

fn count_models(value: &Value, counts: &mut BTreeMap<String, usize>) {
    match value {
        Value::Object(obj) => {
            for (field, inner) in obj {
                match (field.as_str(), inner) {
                    ("embeddings", Value::Object(models)) => {
                        for name in models.keys() {
                            *counts.entry(name.clone()).or_default() += 1;
                        }
                    }
                    _ => count_models(inner, counts),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| count_models(item, counts)),
        _ => {}
    }
}

/// Turn one fragment into zero or more records.
///
/// `model` names the one embedding model read from per-model `embeddings`
/// maps. Records without it (or any record, when `model` is `None`) only
/// get a vector from a plain vector field.
pub fn interpret(fragment: Fragment, model: Option<&str>) -> Vec<Interpreted> {
    match fragment {
        Fragment::Bare(Value::Array(items)) => items
            .into_iter()
            .flat_map(|item| interpret(Fragment::Bare(item), model))
            .collect(),
        Fragment::Bare(Value::Object(obj)) => {
            let Some(key) = first_str(&obj, &KEY_FIELDS) else {
                return vec![Interpreted::Unusable("object without key")];
            };
            vec![interpret_object(key.to_string(), &obj, model)]
        }
        Fragment::Bare(_) => vec![Interpreted::Unusable("top-level value is not an object")],
        Fragment::Keyed { key, value } => interpret_keyed(key, value, model),
    }
}

fn interpret_keyed(raw_key: String, value: Value, model: Option<&str>) -> Vec<Interpreted> {
    let (key, forced_block) = if let Some(rest) = raw_key.strip_prefix(BLOCK_PREFIX) {
        (rest.to_string(), Some(true))
    } else if let Some(rest) = raw_key.strip_prefix(SOURCE_PREFIX) {
        (rest.to_string(), Some(false))
    } else {
        (raw_key, None)
    };
    if key.is_empty() {
        return vec![Interpreted::Unusable("empty entry key")];
    }
    let block = forced_block.unwrap_or_else(|| key.contains('#'));

    match value {
        Value::Null => vec![Interpreted::Delete { key, block }],
        Value::Object(obj) if block => {
            let parent_key = parent_of(&key).to_string();
            vec![Interpreted::Block {
                vector: extract_vector(&obj, model),
                key,
                parent_key,
            }]
        }
        Value::Object(obj) => vec![note_from_object(key, &obj, model)],
        _ => vec![Interpreted::Unusable("entry value is not an object")],
    }
}

/// Bare objects decide their kind from the key: a `#` marks a block.
fn interpret_object(key: String, obj: &Map<String, Value>, model: Option<&str>) -> Interpreted {
    if key.contains('#') {
        let parent_key = parent_of(&key).to_string();
        return Interpreted::Block {
            vector: extract_vector(obj, model),
            key,
            parent_key,
        };
    }
    note_from_object(key, obj, model)
}

fn note_from_object(key: String, obj: &Map<String, Value>, model: Option<&str>) -> Interpreted {
    let vector = extract_vector(obj, model);
    let (blocks, skipped_blocks) = extract_blocks(&key, obj, model);
    Interpreted::Note(RawNote {
        key,
        vector,
        blocks,
        skipped_blocks,
    })
}

fn extract_blocks(
    note_key: &str,
    obj: &Map<String, Value>,
    model: Option<&str>,
) -> (Vec<RawBlock>, usize) {
    let mut blocks = Vec::new();
    let mut skipped = 0;

    let mut push = |fallback_key: Option<&str>, entry: &Map<String, Value>| {
        match first_str(entry, &KEY_FIELDS).or(fallback_key) {
            Some(k) if !k.is_empty() => blocks.push(RawBlock {
                key: qualify(note_key, k),
                vector: extract_vector(entry, model),
            }),
            _ => skipped += 1,
        }
    };

    match obj.get("blocks") {
        Some(Value::Array(items)) => {
            for item in items {
                if let Value::Object(entry) = item {
                    push(None, entry);
                }
            }
        }
        Some(Value::Object(map)) => {
            for (k, v) in map {
                // Line ranges and other non-object values carry no embedding.
                if let Value::Object(entry) = v {
                    push(Some(k.as_str()), entry);
                }
            }
        }
        _ => {}
    }
    (blocks, skipped)
}

/// Pull a numeric vector from the first known vector field, falling back to
/// the chosen model's entry in the `embeddings` map.
fn extract_vector(obj: &Map<String, Value>, model: Option<&str>) -> Option<Vec<f32>> {
    if let Some(v) = VECTOR_FIELDS.iter().find_map(|f| obj.get(*f)) {
        return numeric_array(v);
    }
    let entry = obj.get("embeddings")?.as_object()?.get(model?)?;
    match entry {
        Value::Object(inner) => inner.get("vec").and_then(numeric_array),
        other => numeric_array(other),
    }
}

/// Empty arrays and arrays holding anything but numbers count as missing.
fn numeric_array(value: &Value) -> Option<Vec<f32>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|x| x.as_f64().map(|f| f as f32))
        .collect()
}

fn first_str<'a>(obj: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .find_map(|f| obj.get(*f).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Block keys given as a bare `#heading` are relative to their note.
fn qualify(note_key: &str, block_key: &str) -> String {
    if block_key.starts_with('#') {
        format!("{note_key}{block_key}")
    } else {
        block_key.to_string()
    }
}

/// Note key owning a block key: everything before the first `#`.
pub fn parent_of(block_key: &str) -> &str {
    block_key.split('#').next().unwrap_or(block_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single(fragment: Fragment) -> Interpreted {
        let mut out = interpret(fragment, Some("bge"));
        assert_eq!(out.len(), 1, "expected one record, got {out:?}");
        out.remove(0)
    }

    #[test]
    fn bare_note_with_nested_block_array() {
        let fragment = Fragment::Bare(json!({
            "key": "Notes/A.md",
            "vec": [1.0, 0.0],
            "blocks": [
                {"key": "#Intro", "vec": [0.5, 0.5]},
                {"key": "Notes/A.md#Body"},
                {"vec": [1.0, 1.0]}
            ]
        }));
        let Interpreted::Note(note) = single(fragment) else {
            panic!("expected a note");
        };
        assert_eq!(note.key, "Notes/A.md");
        assert_eq!(note.vector, Some(vec![1.0, 0.0]));
        assert_eq!(note.blocks.len(), 2);
        assert_eq!(note.blocks[0].key, "Notes/A.md#Intro");
        assert_eq!(note.blocks[1].vector, None);
        assert_eq!(note.skipped_blocks, 1);
    }

    #[test]
    fn block_map_ignores_line_ranges() {
        let fragment = Fragment::Bare(json!({
            "path": "b.md",
            "blocks": {
                "#Heading": [3, 10],
                "b.md#Other": {"embeddings": {"bge": {"vec": [0.1, 0.2]}}}
            }
        }));
        let Interpreted::Note(note) = single(fragment) else {
            panic!("expected a note");
        };
        assert_eq!(note.vector, None);
        assert_eq!(
            note.blocks,
            vec![RawBlock {
                key: "b.md#Other".into(),
                vector: Some(vec![0.1, 0.2]),
            }]
        );
    }

    #[test]
    fn keyed_prefixes_decide_kind() {
        let block = single(Fragment::Keyed {
            key: "smart_blocks:dir/c.md#H1#H2".into(),
            value: json!({"vec": [1, 2, 3]}),
        });
        assert_eq!(
            block,
            Interpreted::Block {
                key: "dir/c.md#H1#H2".into(),
                parent_key: "dir/c.md".into(),
                vector: Some(vec![1.0, 2.0, 3.0]),
            }
        );

        let deleted = single(Fragment::Keyed {
            key: "smart_sources:dir/c.md".into(),
            value: Value::Null,
        });
        assert_eq!(
            deleted,
            Interpreted::Delete {
                key: "dir/c.md".into(),
                block: false,
            }
        );
    }

    #[test]
    fn model_selection_picks_named_embedding() {
        let obj = json!({
            "embeddings": {
                "a-model": {"vec": [1.0]},
                "z-model": {"vec": [2.0]}
            }
        });
        let map = obj.as_object().unwrap();
        assert_eq!(extract_vector(map, Some("z-model")), Some(vec![2.0]));
        assert_eq!(extract_vector(map, Some("missing")), None);
        assert_eq!(extract_vector(map, None), None);
    }

    #[test]
    fn dominant_model_is_the_one_most_records_carry() {
        let fragments = vec![
            Fragment::Bare(json!({
                "key": "a.md",
                "embeddings": {"old-model": {"vec": [1]}, "z-new": {"vec": [1]}},
                "blocks": [{"key": "#h", "embeddings": {"z-new": {"vec": [1]}}}]
            })),
            Fragment::Keyed {
                key: "smart_sources:b.md".into(),
                value: json!({"embeddings": {"z-new": {"vec": [1]}}}),
            },
            Fragment::Keyed {
                key: "smart_sources:c.md".into(),
                value: Value::Null,
            },
        ];
        assert_eq!(dominant_model(&fragments).as_deref(), Some("z-new"));

        let tied = vec![
            Fragment::Bare(json!({"key": "a.md", "embeddings": {"m2": {"vec": [1]}}})),
            Fragment::Bare(json!({"key": "b.md", "embeddings": {"m1": {"vec": [1]}}})),
        ];
        assert_eq!(dominant_model(&tied).as_deref(), Some("m1"));
        assert_eq!(dominant_model(&[Fragment::Bare(json!({"key": "a.md", "vec": [1]}))]), None);
    }

    #[test]
    fn unusable_shapes_are_reported() {
        assert_eq!(
            single(Fragment::Bare(json!(42))),
            Interpreted::Unusable("top-level value is not an object")
        );
        assert_eq!(
            single(Fragment::Bare(json!({"vec": [1.0]}))),
            Interpreted::Unusable("object without key")
        );
        assert_eq!(
            single(Fragment::Keyed {
                key: "smart_sources:x.md".into(),
                value: json!([1, 2]),
            }),
            Interpreted::Unusable("entry value is not an object")
        );
    }

    #[test]
    fn non_numeric_vectors_count_as_missing() {
        let fragment = Fragment::Bare(json!({"key": "a.md", "vec": [1, "x"]}));
        let Interpreted::Note(note) = single(fragment) else {
            panic!("expected a note");
        };
        assert_eq!(note.vector, None);
    }
}
