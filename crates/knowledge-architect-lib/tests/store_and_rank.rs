use std::fs;
use std::path::Path;

use knowledge_architect::rank::vector::cosine_similarity;
use knowledge_architect::{
    find_similar, load_index, read_content, ContentError, EmbeddingIndex, Granularity,
    LoaderConfig, StoreError,
};
use tempfile::TempDir;

/// Create a vault with the default store directory and the given store files.
fn vault_with_store(files: &[(&str, &str)]) -> TempDir {
    let vault = TempDir::new().expect("temp vault");
    let store = vault.path().join(".smart-env/multi");
    fs::create_dir_all(&store).expect("store dir");
    for (name, body) in files {
        fs::write(store.join(name), body).expect("store file");
    }
    vault
}

fn load(vault: &Path) -> EmbeddingIndex {
    load_index(vault, &LoaderConfig::default()).expect("index loads")
}

#[test]
fn abc_scenario_from_separate_files() {
    let vault = vault_with_store(&[
        ("A.ajson", r#"{"key": "A", "vec": [1, 0]}"#),
        ("B.ajson", r#"{"key": "B", "vec": [1, 0]}"#),
        ("C.ajson", r#"{"key": "C", "vec": [0, 1]}"#),
    ]);
    let index = load(vault.path());

    let res = find_similar(&index, "A", 2, Granularity::Note).unwrap();
    assert_eq!(res.pairs(), vec![("B", 1.0), ("C", 0.0)]);
}

#[test]
fn malformed_fragments_are_skipped_without_failing() {
    let body = concat!(
        "{\"key\": \"broken.md\", \"vec\": [1.0,\n",
        "{\"key\": \"also-broken.md\" \"vec\": [0.0]}\n",
        "{\"key\": \"good.md\", \"vec\": [1.0, 0.0]}\n",
    );
    let vault = vault_with_store(&[("mixed.ajson", body)]);
    let index = load(vault.path());

    assert_eq!(index.note_count(), 1);
    assert!(index.note("good.md").is_some());
    assert_eq!(index.stats().fragments_skipped, 2);
    assert_eq!(index.stats().files_scanned, 1);
}

#[test]
fn append_onto_a_truncated_line_keeps_the_new_record() {
    let body = concat!(
        "\"smart_sources:a.md\": {\"vec\": [1,0",
        "\"smart_sources:b.md\": {\"vec\": [1, 0]},\n",
        "\"smart_sources:c.md\": {\"vec\": [0, 1]},\n",
    );
    let vault = vault_with_store(&[("torn.ajson", body)]);
    let index = load(vault.path());

    assert!(index.note("a.md").is_none());
    assert_eq!(index.note_count(), 2);
    assert_eq!(index.stats().fragments_skipped, 1);
    let res = find_similar(&index, "b.md", 1, Granularity::Note).unwrap();
    assert_eq!(res.pairs(), vec![("c.md", 0.0)]);
}

#[test]
fn notes_embedded_by_different_models_are_not_compared() {
    let body = concat!(
        r#"{"key": "a.md", "embeddings": {"old-model": {"vec": [1, 0]}, "z-new": {"vec": [0, 1]}}}"#,
        "\n",
        r#"{"key": "b.md", "embeddings": {"z-new": {"vec": [1, 0]}}}"#,
        "\n",
    );
    let vault = vault_with_store(&[("models.ajson", body)]);
    let index = load(vault.path());

    let res = find_similar(&index, "a.md", 5, Granularity::Note).unwrap();
    assert_eq!(res.pairs(), vec![("b.md", 0.0)]);
}

#[test]
fn single_note_with_single_block_has_no_candidates() {
    let body = concat!(
        r#"{"key": "solo.md", "vec": [0.2, 0.4], "#,
        r##""blocks": [{"key": "#Intro", "vec": [0.1, 0.9]}]}"##,
    );
    let vault = vault_with_store(&[("solo.ajson", body)]);
    let index = load(vault.path());

    for granularity in [Granularity::Note, Granularity::Block] {
        let res = find_similar(&index, "solo.md", 5, granularity).unwrap();
        assert!(res.is_empty(), "{granularity} ranking should be empty");
    }
}

#[test]
fn append_store_with_blocks_ranks_by_best_block() {
    let body = concat!(
        "\"smart_sources:Q.md\": {\"path\": \"Q.md\", \"blocks\": {\"#q\": [1, 4]}},\n",
        "\"smart_blocks:Q.md#q\": {\"embeddings\": {\"bge\": {\"vec\": [1.0, 0.0]}}},\n",
        "\"smart_sources:D.md\": {\"path\": \"D.md\"},\n",
        "\"smart_blocks:D.md#1\": {\"embeddings\": {\"bge\": {\"vec\": [0.9, 0.43588989]}}},\n",
        "\"smart_blocks:D.md#2\": {\"embeddings\": {\"bge\": {\"vec\": [0.95, 0.31224990]}}},\n",
        "\"smart_sources:F.md\": {\"path\": \"F.md\"},\n",
        "\"smart_blocks:F.md#1\": {\"embeddings\": {\"bge\": {\"vec\": [0.5, 0.8660254]}}},\n",
    );
    let vault = vault_with_store(&[("multi.ajson", body)]);
    let index = load(vault.path());

    let res = find_similar(&index, "Q.md", 5, Granularity::Block).unwrap();
    let keys: Vec<&str> = res.iter().map(|m| m.key.as_str()).collect();
    assert_eq!(keys, ["D.md", "F.md"]);
    assert!((res.matches[0].score - 0.95).abs() < 1e-4);
}

#[test]
fn ranking_properties_hold_on_a_mixed_store() {
    let body = concat!(
        "{\"key\": \"n1.md\", \"vec\": [1, 2, 3], \"blocks\": [{\"key\": \"#a\", \"vec\": [1, 0]}, {\"key\": \"#b\", \"vec\": [0, 1]}]}\n",
        "{\"key\": \"n2.md\", \"vec\": [3, 2, 1], \"blocks\": [{\"key\": \"#a\", \"vec\": [1, 1]}]}\n",
        "{\"key\": \"n3.md\", \"vec\": [0, 0, 0]}\n",
        "{\"key\": \"n4.md\", \"vec\": [-1, 0, 2], \"blocks\": [{\"key\": \"#z\", \"vec\": [0, 0]}]}\n",
    );
    let vault = vault_with_store(&[("all.json", body)]);
    let index = load(vault.path());
    let corpus = index.note_count();

    for note in index.notes() {
        for granularity in [Granularity::Note, Granularity::Block] {
            for top_k in [0, 1, 2, 10] {
                let res = find_similar(&index, &note.key, top_k, granularity).unwrap();
                assert!(res.len() <= top_k);
                assert!(res.len() < corpus);
                for m in res.iter() {
                    assert_ne!(m.key, note.key, "target returned as its own match");
                    assert!(!m.key.contains('#'), "block key leaked into results");
                    assert!((-1.0..=1.0).contains(&m.score));
                    assert!(!m.score.is_nan());
                }
            }
        }
    }

    let res = find_similar(&index, "n3.md", 10, Granularity::Note).unwrap();
    assert!(res.iter().all(|m| m.score == 0.0));

    let vectors: Vec<&[f32]> = index
        .notes()
        .iter()
        .filter_map(|n| n.vector())
        .chain(index.blocks().iter().map(|b| b.vector.as_slice()))
        .collect();
    for a in &vectors {
        for b in vectors.iter().filter(|b| b.len() == a.len()) {
            assert_eq!(cosine_similarity(a, b), cosine_similarity(b, a));
        }
    }
}

#[test]
fn missing_store_directory_is_reported() {
    let vault = TempDir::new().unwrap();
    let err = load_index(vault.path(), &LoaderConfig::default()).unwrap_err();
    assert!(matches!(err, StoreError::StoreNotFound(_)));
}

#[test]
fn store_without_usable_records_is_reported() {
    let vault = vault_with_store(&[
        ("junk.ajson", "not json at all\n{\"key\": \"a.md\"}\n"),
        ("ignored.txt", "{\"key\": \"b.md\", \"vec\": [1.0]}"),
    ]);
    let err = load_index(vault.path(), &LoaderConfig::default()).unwrap_err();
    match err {
        StoreError::NoValidRecords { stats, .. } => {
            assert_eq!(stats.files_scanned, 1);
            assert_eq!(stats.fragments_skipped, 1);
            assert_eq!(stats.missing_vectors, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn custom_store_dir_and_model_are_honoured() {
    let vault = TempDir::new().unwrap();
    let store = vault.path().join("embeddings");
    fs::create_dir_all(&store).unwrap();
    fs::write(
        store.join("a.json"),
        r#"{"key": "a.md", "embeddings": {"m1": {"vec": [1, 0]}, "m2": {"vec": [0, 1, 0]}}}"#,
    )
    .unwrap();

    let config = LoaderConfig {
        store_dir: "embeddings".into(),
        embedding_model: Some("m2".into()),
        ..LoaderConfig::default()
    };
    let index = load_index(vault.path(), &config).unwrap();
    assert_eq!(index.note_dim(), Some(3));
}

#[test]
fn content_is_read_and_traversal_rejected() {
    let vault = vault_with_store(&[("a.ajson", r#"{"key": "Notes/A.md", "vec": [1]}"#)]);
    fs::create_dir_all(vault.path().join("Notes")).unwrap();
    fs::write(vault.path().join("Notes/A.md"), "# A\nbody").unwrap();

    let note = read_content(vault.path(), "Notes/A.md").unwrap();
    assert_eq!(note.content, "# A\nbody");
    assert_eq!(note.title(), "A");

    let via_backslash = read_content(vault.path(), "Notes\\A.md").unwrap();
    assert_eq!(via_backslash.relative_path, "Notes/A.md");

    assert!(matches!(
        read_content(vault.path(), "../../etc/passwd"),
        Err(ContentError::PathTraversal(_))
    ));
    assert!(matches!(
        read_content(vault.path(), "Notes/missing.md"),
        Err(ContentError::NoteNotFound { .. })
    ));
    assert!(matches!(
        read_content(vault.path(), "Notes"),
        Err(ContentError::NoteNotFound { .. })
    ));
}

#[test]
fn non_utf8_note_is_not_readable_as_text() {
    let vault = TempDir::new().unwrap();
    fs::write(vault.path().join("bin.md"), [0xff_u8, 0xfe, 0x00]).unwrap();
    assert!(matches!(
        read_content(vault.path(), "bin.md"),
        Err(ContentError::NoteNotFound { .. })
    ));
}

#[cfg(unix)]
#[test]
fn symlink_escape_is_rejected() {
    let outside = TempDir::new().unwrap();
    fs::write(outside.path().join("secret.md"), "secret").unwrap();
    let vault = TempDir::new().unwrap();
    std::os::unix::fs::symlink(outside.path().join("secret.md"), vault.path().join("link.md"))
        .unwrap();

    assert!(matches!(
        read_content(vault.path(), "link.md"),
        Err(ContentError::PathTraversal(_))
    ));
}
