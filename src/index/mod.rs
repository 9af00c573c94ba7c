//! Index Builder (C8): SQLite schema (chunks + FTS5 + metadata) built from
//! the chunk stream and file list, with freshness metadata for the
//! staleness check (§4.8, §8 `verify_index`).
//!
//! Schema is grounded on the teacher's `cli/index.rs::ensure_schema`: WAL
//! mode, a `chunks` table, an FTS5 virtual table, and a metadata table —
//! generalized to the spec's `(chunks, chunks_fts, files, index_meta)` shape
//! and rebuilt wholesale per run rather than incrementally reindexed (§5:
//! the store is append-free once built, opened exclusively, one serial
//! transaction per run).

pub mod query;

use crate::domain::{Chunk, FileInfo};
use crate::error::Result;
use crate::hash::hash_file;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Stats surfaced after a build (§2 C8 "record stats").
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub chunks_indexed: usize,
    pub fts5_bm25: bool,
}

/// The artifacts an index build is derived from; their hashes are stamped
/// into `index_meta` so [`verify_index`] can detect staleness (§8).
pub struct IndexSources {
    pub dump_index_path: PathBuf,
    pub chunk_index_path: PathBuf,
}

/// Builds (or wholesale rebuilds) the SQLite index at `db_path` from a
/// chunk stream and its owning files. Opens the destination exclusively and
/// commits once in a single transaction (§5).
///
/// `contents` supplies each chunk's indexable text by `chunk_id` — the chunk
/// stream itself carries only `content_sha256`, never the bytes (§3 Chunk),
/// so the caller reads `chunk.path[chunk.start_byte..chunk.end_byte]` from
/// the source tree (or the canonical markdown) before calling this.
pub fn build_index(
    db_path: &Path,
    chunks: &[Chunk],
    files: &[FileInfo],
    contents: &HashMap<String, String>,
    sources: &IndexSources,
) -> Result<IndexStats> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if db_path.exists() {
        std::fs::remove_file(db_path)?;
    }

    let mut conn = Connection::open(db_path)?;
    ensure_schema(&conn)?;
    let fts5_bm25 = probe_bm25(&conn);

    let tx = conn.transaction()?;

    let repo_by_file_id: std::collections::HashMap<&str, &str> =
        files.iter().map(|f| (f.file_id.as_str(), f.repo.as_str())).collect();

    for file in files {
        if file.skip_reason.is_some() {
            continue;
        }
        tx.execute(
            "INSERT INTO files (file_id, repo_id, path, language, size_bytes, sha256)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file.file_id,
                file.repo,
                file.relative_path,
                file.category.iter().next().cloned().unwrap_or_default(),
                file.size_bytes as i64,
                file.sha256.clone().unwrap_or_default(),
            ],
        )?;
    }

    for chunk in chunks {
        let repo_id = repo_by_file_id.get(chunk.file_id.as_str()).copied().unwrap_or("");
        let content_text = contents.get(&chunk.chunk_id).cloned().unwrap_or_default();
        tx.execute(
            "INSERT INTO chunks
                (chunk_id, file_id, repo_id, path, start_byte, end_byte, start_line, end_line,
                 sha256, layer, section, artifact_type, language)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                chunk.chunk_id,
                chunk.file_id,
                repo_id,
                chunk.path,
                chunk.start_byte as i64,
                chunk.end_byte as i64,
                chunk.start_line as i64,
                chunk.end_line as i64,
                chunk.content_sha256,
                chunk.layer,
                chunk.section,
                chunk.artifact_type,
                chunk.language,
            ],
        )?;
        let path_tokens = chunk.path.replace(['/', '_', '-', '.'], " ");
        tx.execute(
            "INSERT INTO chunks_fts (chunk_id, content, path_tokens) VALUES (?1, ?2, ?3)",
            params![chunk.chunk_id, content_text, path_tokens],
        )?;
    }

    let dump_index_hash = hash_file(&sources.dump_index_path);
    let chunk_index_hash = hash_file(&sources.chunk_index_path);
    let meta: [(&str, String); 6] = [
        ("dump_index_path", sources.dump_index_path.to_string_lossy().to_string()),
        ("dump_index_sha256", dump_index_hash.sha256.unwrap_or_default()),
        ("chunk_index_path", sources.chunk_index_path.to_string_lossy().to_string()),
        ("chunk_index_sha256", chunk_index_hash.sha256.unwrap_or_default()),
        ("fts5_bm25", fts5_bm25.to_string()),
        ("built_at", chrono::Utc::now().to_rfc3339()),
    ];
    for (key, value) in meta {
        tx.execute("INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)", params![key, value])?;
    }

    let files_indexed: usize =
        tx.query_row("SELECT COUNT(*) FROM files", [], |row| row.get::<_, i64>(0))? as usize;
    let chunks_indexed: usize =
        tx.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get::<_, i64>(0))? as usize;

    tx.commit()?;

    Ok(IndexStats { files_indexed, chunks_indexed, fts5_bm25 })
}

fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;

        CREATE TABLE IF NOT EXISTS files (
            file_id TEXT PRIMARY KEY,
            repo_id TEXT NOT NULL,
            path TEXT NOT NULL,
            language TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            sha256 TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id TEXT PRIMARY KEY,
            file_id TEXT NOT NULL,
            repo_id TEXT NOT NULL,
            path TEXT NOT NULL,
            start_byte INTEGER NOT NULL,
            end_byte INTEGER NOT NULL,
            start_line INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            layer TEXT NOT NULL,
            section TEXT NOT NULL,
            artifact_type TEXT NOT NULL,
            language TEXT NOT NULL,
            FOREIGN KEY(file_id) REFERENCES files(file_id) ON DELETE CASCADE
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
            chunk_id UNINDEXED,
            content,
            path_tokens
        );

        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_repo_path ON chunks(repo_id, path, start_line);
        CREATE INDEX IF NOT EXISTS idx_chunks_layer ON chunks(layer);
        ",
    )?;
    Ok(())
}

/// Probes whether the linked SQLite build exposes `bm25()` (it is part of
/// the FTS5 extension; `rusqlite`'s `bundled`+`fts5` features should always
/// provide it, but a system-linked build might not) (§4.9 capability detection).
fn probe_bm25(conn: &Connection) -> bool {
    conn.prepare("SELECT bm25(chunks_fts) FROM chunks_fts WHERE chunks_fts MATCH 'x'").is_ok()
}

/// Line-level outcome counters from a tolerant chunk-JSONL parse (§4.8,
/// §7: a malformed line is skipped and counted, never fatal).
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestStats {
    pub total_lines: usize,
    pub empty_lines: usize,
    pub invalid_json_lines: usize,
    pub missing_chunk_id_lines: usize,
    pub ingested_chunks: usize,
}

/// Parses a chunk-JSONL stream line by line, skipping blank lines, lines
/// that don't parse as JSON, and lines missing a `chunk_id`, while counting
/// each skip category (§4.8 ingest tolerance).
pub fn parse_chunk_jsonl(jsonl: &str) -> (Vec<Chunk>, IngestStats) {
    let mut chunks = Vec::new();
    let mut stats = IngestStats::default();

    for line in jsonl.lines() {
        stats.total_lines += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            stats.empty_lines += 1;
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => {
                stats.invalid_json_lines += 1;
                continue;
            }
        };
        if value.get("chunk_id").and_then(|v| v.as_str()).unwrap_or_default().is_empty() {
            stats.missing_chunk_id_lines += 1;
            continue;
        }
        match serde_json::from_value::<Chunk>(value) {
            Ok(chunk) => {
                chunks.push(chunk);
                stats.ingested_chunks += 1;
            }
            Err(_) => stats.invalid_json_lines += 1,
        }
    }

    (chunks, stats)
}

/// Builds the index from a chunk-JSONL file on disk rather than an
/// already-parsed `Vec<Chunk>` (§4.8): reads and tolerantly parses the file,
/// stamps the ingest counters into `index_meta`, and warns on stderr if any
/// line was skipped (§7).
pub fn build_index_from_chunk_jsonl(
    db_path: &Path,
    chunk_jsonl_path: &Path,
    files: &[FileInfo],
    contents: &HashMap<String, String>,
    sources: &IndexSources,
) -> Result<(IndexStats, IngestStats)> {
    let jsonl = std::fs::read_to_string(chunk_jsonl_path)?;
    let (chunks, ingest_stats) = parse_chunk_jsonl(&jsonl);

    let stats = build_index(db_path, &chunks, files, contents, sources)?;

    let conn = Connection::open(db_path)?;
    let meta: [(&str, String); 4] = [
        ("ingest_total_lines", ingest_stats.total_lines.to_string()),
        ("ingest_invalid_json_lines", ingest_stats.invalid_json_lines.to_string()),
        ("ingest_missing_chunk_id_lines", ingest_stats.missing_chunk_id_lines.to_string()),
        ("ingest_ingested_chunks", ingest_stats.ingested_chunks.to_string()),
    ];
    for (key, value) in meta {
        conn.execute("INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)", params![key, value])?;
    }

    if ingest_stats.invalid_json_lines > 0 || ingest_stats.missing_chunk_id_lines > 0 {
        eprintln!(
            "Warning: skipped {} malformed and {} chunk_id-less line(s) while ingesting {}",
            ingest_stats.invalid_json_lines,
            ingest_stats.missing_chunk_id_lines,
            chunk_jsonl_path.display()
        );
    }

    Ok((stats, ingest_stats))
}

/// Re-checks the hashes stamped at build time against the current bytes of
/// the source artifacts (§8: `verify_index(build_index(D,C)) == true`,
/// `false` after altering a byte of either). Never mutates; read-only (§5).
pub fn verify_index(db_path: &Path) -> Result<bool> {
    if !db_path.exists() {
        return Ok(false);
    }
    let conn = Connection::open(db_path)?;
    let get = |key: &str| -> Result<Option<String>> {
        conn.query_row("SELECT value FROM index_meta WHERE key = ?1", params![key], |row| row.get(0))
            .map(Some)
            .or_else(|err| if matches!(err, rusqlite::Error::QueryReturnedNoRows) { Ok(None) } else { Err(err.into()) })
    };

    let Some(dump_path) = get("dump_index_path")? else { return Ok(false) };
    let Some(stored_dump_sha) = get("dump_index_sha256")? else { return Ok(false) };
    let Some(chunk_path) = get("chunk_index_path")? else { return Ok(false) };
    let Some(stored_chunk_sha) = get("chunk_index_sha256")? else { return Ok(false) };

    let current_dump = hash_file(Path::new(&dump_path));
    let current_chunk = hash_file(Path::new(&chunk_path));

    Ok(current_dump.sha256.as_deref() == Some(stored_dump_sha.as_str())
        && current_chunk.sha256.as_deref() == Some(stored_chunk_sha.as_str()))
}

/// Emits a `Warning:` line to stderr when [`verify_index`] reports staleness;
/// never fatal (§7: "Stale-index detection is always non-fatal; it only warns").
pub fn stale_check(db_path: &Path) -> Result<bool> {
    let fresh = verify_index(db_path)?;
    if !fresh {
        eprintln!("Warning: index at {} is stale relative to its source artifacts", db_path.display());
    }
    Ok(fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn file(repo: &str, path: &str) -> FileInfo {
        FileInfo {
            repo: repo.to_string(),
            path: PathBuf::from(path),
            relative_path: path.to_string(),
            size_bytes: 10,
            is_text: true,
            sha256: Some("a".repeat(64)),
            category: BTreeSet::from(["source".to_string()]),
            extension: ".rs".to_string(),
            skip_reason: None,
            file_id: crate::domain::file_id(repo, path),
        }
    }

    fn chunk(file_id: &str, path: &str) -> Chunk {
        Chunk {
            chunk_id: crate::domain::chunk_id(path, 1, &"b".repeat(64)),
            file_id: file_id.to_string(),
            path: path.to_string(),
            start_byte: 0,
            end_byte: 10,
            start_line: 1,
            end_line: 1,
            content_sha256: "b".repeat(64),
            size_bytes: 10,
            language: "rust".to_string(),
            section: "main".to_string(),
            layer: "core".to_string(),
            artifact_type: "code".to_string(),
            concepts: vec![],
        }
    }

    #[test]
    fn build_then_verify_round_trips_true_then_false_after_mutation() {
        let dir = tempdir().unwrap();
        let dump_path = dir.path().join("repo.dump_index.json");
        let chunk_path = dir.path().join("repo.chunk_index.jsonl");
        std::fs::write(&dump_path, b"{}").unwrap();
        std::fs::write(&chunk_path, b"{}\n").unwrap();

        let info = file("repo", "src/main.rs");
        let c = chunk(&info.file_id, "src/main.rs");

        let db_path = dir.path().join("repo.index.sqlite");
        let contents = HashMap::from([(c.chunk_id.clone(), "fn main() {}".to_string())]);
        build_index(
            &db_path,
            &[c],
            &[info],
            &contents,
            &IndexSources { dump_index_path: dump_path.clone(), chunk_index_path: chunk_path.clone() },
        )
        .unwrap();

        assert!(verify_index(&db_path).unwrap());

        std::fs::write(&dump_path, b"{\"mutated\":true}").unwrap();
        assert!(!verify_index(&db_path).unwrap());
    }

    #[test]
    fn build_index_reports_counts() {
        let dir = tempdir().unwrap();
        let dump_path = dir.path().join("repo.dump_index.json");
        let chunk_path = dir.path().join("repo.chunk_index.jsonl");
        std::fs::write(&dump_path, b"{}").unwrap();
        std::fs::write(&chunk_path, b"{}\n").unwrap();

        let info = file("repo", "src/main.rs");
        let c = chunk(&info.file_id, "src/main.rs");
        let db_path = dir.path().join("repo.index.sqlite");

        let contents = HashMap::from([(c.chunk_id.clone(), "fn main() {}".to_string())]);
        let stats = build_index(
            &db_path,
            &[c],
            &[info],
            &contents,
            &IndexSources { dump_index_path: dump_path, chunk_index_path: chunk_path },
        )
        .unwrap();

        assert_eq!(stats.files_indexed, 1);
        assert_eq!(stats.chunks_indexed, 1);
    }

    #[test]
    fn parse_chunk_jsonl_skips_malformed_lines_and_counts_them() {
        let good = chunk("FILE:f_abc", "src/main.rs");
        let good_line = serde_json::to_string(&good).unwrap();
        let jsonl = format!(
            "{good_line}\n\n{{not json}}\n{{\"path\":\"x\",\"missing\":\"chunk_id\"}}\n"
        );

        let (chunks, stats) = parse_chunk_jsonl(&jsonl);
        assert_eq!(chunks.len(), 1);
        assert_eq!(stats.total_lines, 4);
        assert_eq!(stats.empty_lines, 1);
        assert_eq!(stats.invalid_json_lines, 1);
        assert_eq!(stats.missing_chunk_id_lines, 1);
        assert_eq!(stats.ingested_chunks, 1);
    }

    #[test]
    fn build_index_from_chunk_jsonl_stamps_ingest_meta() {
        let dir = tempdir().unwrap();
        let dump_path = dir.path().join("repo.dump_index.json");
        let chunk_path = dir.path().join("repo.chunk_index.jsonl");
        std::fs::write(&dump_path, b"{}").unwrap();

        let info = file("repo", "src/main.rs");
        let c = chunk(&info.file_id, "src/main.rs");
        let good_line = serde_json::to_string(&c).unwrap();
        let jsonl = format!("{good_line}\n{{bad}}\n");
        std::fs::write(&chunk_path, jsonl.as_bytes()).unwrap();

        let db_path = dir.path().join("repo.index.sqlite");
        let contents = HashMap::from([(c.chunk_id.clone(), "fn main() {}".to_string())]);
        let (stats, ingest) = build_index_from_chunk_jsonl(
            &db_path,
            &chunk_path,
            &[info],
            &contents,
            &IndexSources { dump_index_path: dump_path, chunk_index_path: chunk_path.clone() },
        )
        .unwrap();

        assert_eq!(stats.chunks_indexed, 1);
        assert_eq!(ingest.invalid_json_lines, 1);

        let conn = Connection::open(&db_path).unwrap();
        let stored: String = conn
            .query_row("SELECT value FROM index_meta WHERE key = 'ingest_ingested_chunks'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, "1");
    }
}
