//! Index builder + query engine integration tests (§4.8-§4.9).

use repolens::domain::{chunk_id, file_id, Chunk, FileInfo};
use repolens::index::query::{query, QueryFilters};
use repolens::index::{build_index, IndexSources};
use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap};
use tempfile::tempdir;

fn file(repo: &str, relative_path: &str) -> FileInfo {
    FileInfo {
        repo: repo.to_string(),
        path: relative_path.into(),
        relative_path: relative_path.to_string(),
        size_bytes: 100,
        is_text: true,
        sha256: Some("a".repeat(64)),
        category: BTreeSet::new(),
        extension: relative_path.rsplit('.').next().unwrap_or("").to_string(),
        skip_reason: None,
        file_id: file_id(repo, relative_path),
    }
}

fn chunk(repo: &str, path: &str, start_line: usize, content: &str, layer: &str) -> (Chunk, String) {
    let content_sha256 = repolens::hash::hash_bytes(content.as_bytes());
    let id = chunk_id(path, start_line, &content_sha256);
    let chunk = Chunk {
        chunk_id: id.clone(),
        file_id: file_id(repo, path),
        path: path.to_string(),
        start_byte: 0,
        end_byte: content.len(),
        start_line,
        end_line: start_line + content.lines().count().max(1) - 1,
        content_sha256,
        size_bytes: content.len(),
        language: "rust".to_string(),
        section: "body".to_string(),
        layer: layer.to_string(),
        artifact_type: "source".to_string(),
        concepts: Vec::new(),
    };
    (chunk, content.to_string())
}

fn build_test_index() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("repo.index.sqlite");

    let files = vec![file("demo", "src/lib.rs"), file("demo", "tests/smoke.rs")];

    let (chunk_a, text_a) = chunk("demo", "src/lib.rs", 1, "fn widget_factory() -> Widget { Widget::new() }\n", "core");
    let (chunk_b, text_b) = chunk("demo", "tests/smoke.rs", 1, "fn test_widget_factory() { assert!(true); }\n", "test");

    let mut contents = HashMap::new();
    contents.insert(chunk_a.chunk_id.clone(), text_a);
    contents.insert(chunk_b.chunk_id.clone(), text_b);

    let sources = IndexSources { dump_index_path: dir.path().join("repo.dump-index.json"), chunk_index_path: dir.path().join("repo.chunks.jsonl") };

    build_index(&db_path, &[chunk_a, chunk_b], &files, &contents, &sources).unwrap();
    (dir, db_path)
}

#[test]
fn fts_query_finds_matching_chunk_and_reports_engine() {
    let (_dir, db_path) = build_test_index();
    let conn = Connection::open(&db_path).unwrap();

    let result = query(&conn, "widget_factory", 10, &QueryFilters::default()).unwrap();

    assert!(result.count >= 1);
    assert!(result.results.iter().any(|r| r.path == "src/lib.rs"));
    assert!(result.engine == "fts5" || result.engine == "fts5_nobm25");
    assert_eq!(result.query_mode, "fts");
}

#[test]
fn layer_filter_restricts_results_to_test_layer() {
    let (_dir, db_path) = build_test_index();
    let conn = Connection::open(&db_path).unwrap();

    let filters = QueryFilters { layer: Some("test".to_string()), ..QueryFilters::default() };
    let result = query(&conn, "widget_factory", 10, &filters).unwrap();

    assert!(result.results.iter().all(|r| r.layer == "test"));
    assert!(result.applied_filters.contains_key("layer"));
}

#[test]
fn ext_filter_normalizes_leading_dot() {
    let (_dir, db_path) = build_test_index();
    let conn = Connection::open(&db_path).unwrap();

    let with_dot = QueryFilters { ext: Some(".rs".to_string()), ..QueryFilters::default() };
    let without_dot = QueryFilters { ext: Some("rs".to_string()), ..QueryFilters::default() };

    let result_with = query(&conn, "", 10, &with_dot).unwrap();
    let result_without = query(&conn, "", 10, &without_dot).unwrap();

    assert_eq!(result_with.count, result_without.count);
    assert!(result_with.count > 0);
}

#[test]
fn empty_query_runs_metadata_mode_ordered_by_path() {
    let (_dir, db_path) = build_test_index();
    let conn = Connection::open(&db_path).unwrap();

    let result = query(&conn, "", 10, &QueryFilters::default()).unwrap();

    assert_eq!(result.query_mode, "metadata");
    assert_eq!(result.engine, "metadata");
    let paths: Vec<&str> = result.results.iter().map(|r| r.path.as_str()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
}

#[test]
fn path_filter_is_case_insensitive_substring_match() {
    let (_dir, db_path) = build_test_index();
    let conn = Connection::open(&db_path).unwrap();

    let filters = QueryFilters { path: Some("LIB.RS".to_string()), ..QueryFilters::default() };
    let result = query(&conn, "", 10, &filters).unwrap();

    assert!(result.results.iter().all(|r| r.path.to_ascii_lowercase().contains("lib.rs")));
    assert!(!result.results.is_empty());
}
