//! Query Engine (C9): BM25 + metadata filter composition, capability
//! detection, deterministic ordering (§4.9).
//!
//! `QueryMode` replaces the open "mode string" the teacher's `cli/query.rs`
//! branches on with a closed sum (§9 "duck typing & runtime reflection"):
//! `Fts{with_bm25}` or `Metadata`. An empty query string with at least one
//! filter runs in `Metadata` mode even when the index has working FTS5.

use crate::error::{RepolensError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structural filters applied in addition to (or instead of) full-text match.
///
/// `path` is a case-insensitive substring match; `ext` matches the suffix of
/// the normalized path with or without a leading dot (§4.9).
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub layer: Option<String>,
    pub repo_id: Option<String>,
    pub path: Option<String>,
    pub ext: Option<String>,
    pub artifact_type: Option<String>,
}

impl QueryFilters {
    fn applied_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.repo_id.is_some() {
            keys.push("repo");
        }
        if self.path.is_some() {
            keys.push("path");
        }
        if self.ext.is_some() {
            keys.push("ext");
        }
        if self.layer.is_some() {
            keys.push("layer");
        }
        if self.artifact_type.is_some() {
            keys.push("artifact_type");
        }
        keys
    }

    fn normalized_ext(&self) -> Option<String> {
        self.ext.as_ref().map(|e| {
            let trimmed = e.trim_start_matches('.');
            format!(".{}", trimmed.to_ascii_lowercase())
        })
    }
}

/// The engine's operating mode for one query (§9 closed sum replacing a mode
/// string).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Fts { with_bm25: bool },
    Metadata,
    /// A non-empty query was requested but the index has no `chunks_fts`
    /// table at all (§4.9: "If the FTS module is absent, fail with
    /// `engine_missing`") — distinct from `Fts{with_bm25:false}`, which
    /// covers an FTS5 table present without a working `bm25()`.
    EngineMissing,
}

impl QueryMode {
    fn label(self) -> &'static str {
        match self {
            QueryMode::Fts { .. } => "fts",
            QueryMode::Metadata => "metadata",
            QueryMode::EngineMissing => "fts",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResultRow {
    pub chunk_id: String,
    pub repo_id: String,
    pub path: String,
    pub range: String,
    pub score: f64,
    pub layer: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub sha256: String,
    pub why: QueryWhy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryWhy {
    pub query_terms: Vec<String>,
    pub applied_filter_keys: Vec<String>,
    pub rank_features: BTreeMap<String, f64>,
}

/// `query-result.v1` (§6 wire format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub k: usize,
    pub engine: String,
    pub query_mode: String,
    pub applied_filters: BTreeMap<String, String>,
    pub count: usize,
    pub results: Vec<QueryResultRow>,
}

/// Runs one query against an index built by [`super::build_index`].
///
/// Engine/mode selection (§4.9): a non-empty `query_text` with a live
/// `bm25()` runs `Fts{with_bm25:true}`; FTS5 present but `bm25()` missing
/// falls back to `Fts{with_bm25:false}` with a constant score; an empty
/// query (filters only) always runs `Metadata`, ordered
/// `(repo_id, path, start_line)`. FTS results order `(score ASC, repo_id
/// ASC, path ASC, start_line ASC)`.
pub fn query(conn: &Connection, query_text: &str, k: usize, filters: &QueryFilters) -> Result<QueryResult> {
    let mode = if query_text.trim().is_empty() {
        QueryMode::Metadata
    } else {
        match probe_fts(conn) {
            Ok(with_bm25) => QueryMode::Fts { with_bm25 },
            Err(RepolensError::FtsMissing) => QueryMode::EngineMissing,
            Err(err) => return Err(err),
        }
    };

    let applied_filters: BTreeMap<String, String> = [
        filters.repo_id.as_ref().map(|v| ("repo_id".to_string(), v.clone())),
        filters.path.as_ref().map(|v| ("path".to_string(), v.clone())),
        filters.ext.as_ref().map(|v| ("ext".to_string(), v.clone())),
        filters.layer.as_ref().map(|v| ("layer".to_string(), v.clone())),
        filters.artifact_type.as_ref().map(|v| ("artifact_type".to_string(), v.clone())),
    ]
    .into_iter()
    .flatten()
    .collect();

    if mode == QueryMode::EngineMissing {
        return Ok(QueryResult {
            query: query_text.to_string(),
            k,
            engine: "engine_missing".to_string(),
            query_mode: mode.label().to_string(),
            applied_filters,
            count: 0,
            results: Vec::new(),
        });
    }

    let rows = match mode {
        QueryMode::Fts { with_bm25 } => run_fts_query(conn, query_text, k, filters, with_bm25)?,
        QueryMode::Metadata => run_metadata_query(conn, k, filters)?,
        QueryMode::EngineMissing => unreachable!("handled above"),
    };

    let engine = match mode {
        QueryMode::Fts { with_bm25: true } => "fts5",
        QueryMode::Fts { with_bm25: false } => "fts5_nobm25",
        QueryMode::Metadata => "metadata",
        QueryMode::EngineMissing => unreachable!("handled above"),
    };

    Ok(QueryResult {
        query: query_text.to_string(),
        k,
        engine: engine.to_string(),
        query_mode: mode.label().to_string(),
        applied_filters,
        count: rows.len(),
        results: rows,
    })
}

fn probe_fts(conn: &Connection) -> Result<bool> {
    let table_exists: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
            [],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
    if !table_exists {
        return Err(RepolensError::FtsMissing);
    }
    let bm25_available = conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = 'fts5_bm25'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .map(|v| v == "true")
        .unwrap_or(false);
    Ok(bm25_available)
}

fn run_fts_query(
    conn: &Connection,
    query_text: &str,
    k: usize,
    filters: &QueryFilters,
    with_bm25: bool,
) -> Result<Vec<QueryResultRow>> {
    let (filter_sql, filter_terms) = build_filter_clause(filters);
    let score_expr = if with_bm25 { "bm25(chunks_fts)" } else { "0.0" };

    let sql = format!(
        "SELECT c.chunk_id, c.repo_id, c.path, c.start_line, c.end_line, c.layer, c.artifact_type,
                c.sha256, {score_expr} AS score
         FROM chunks_fts
         JOIN chunks c ON c.chunk_id = chunks_fts.chunk_id
         WHERE chunks_fts MATCH ?1 {filter_sql}
         ORDER BY score ASC, c.repo_id ASC, c.path ASC, c.start_line ASC
         LIMIT ?2"
    );

    let mut stmt = conn.prepare(&sql).map_err(|err| {
        if err.to_string().contains("fts5: syntax error") {
            RepolensError::FtsSyntax(err.to_string())
        } else {
            RepolensError::Sqlite(err)
        }
    })?;

    let k_param = k as i64;
    let bound: Vec<&dyn rusqlite::ToSql> = {
        let mut v: Vec<&dyn rusqlite::ToSql> = vec![&query_text];
        for term in &filter_terms {
            v.push(term);
        }
        v.push(&k_param);
        v
    };

    let query_terms: Vec<String> = query_text.split_whitespace().map(str::to_lowercase).collect();
    let applied_keys: Vec<String> = filters.applied_keys().into_iter().map(str::to_string).collect();

    let rows = stmt
        .query_map(bound.as_slice(), |row| {
            let start_line: i64 = row.get(3)?;
            let end_line: i64 = row.get(4)?;
            let score: f64 = row.get(8)?;
            let mut rank_features = BTreeMap::new();
            rank_features.insert(if with_bm25 { "bm25".to_string() } else { "metadata".to_string() }, score);
            Ok(QueryResultRow {
                chunk_id: row.get(0)?,
                repo_id: row.get(1)?,
                path: row.get(2)?,
                range: format!("{start_line}-{end_line}"),
                score,
                layer: row.get(5)?,
                artifact_type: row.get(6)?,
                sha256: row.get(7)?,
                why: QueryWhy {
                    query_terms: query_terms.clone(),
                    applied_filter_keys: applied_keys.clone(),
                    rank_features,
                },
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn run_metadata_query(conn: &Connection, k: usize, filters: &QueryFilters) -> Result<Vec<QueryResultRow>> {
    let (filter_sql, filter_terms) = build_filter_clause(filters);
    let sql = format!(
        "SELECT chunk_id, repo_id, path, start_line, end_line, layer, artifact_type, sha256
         FROM chunks
         WHERE 1=1 {filter_sql}
         ORDER BY repo_id ASC, path ASC, start_line ASC
         LIMIT ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let k_param = k as i64;
    let bound: Vec<&dyn rusqlite::ToSql> = {
        let mut v: Vec<&dyn rusqlite::ToSql> = Vec::new();
        for term in &filter_terms {
            v.push(term);
        }
        v.push(&k_param);
        v
    };

    let applied_keys: Vec<String> = filters.applied_keys().into_iter().map(str::to_string).collect();

    let rows = stmt
        .query_map(bound.as_slice(), |row| {
            let start_line: i64 = row.get(3)?;
            let end_line: i64 = row.get(4)?;
            Ok(QueryResultRow {
                chunk_id: row.get(0)?,
                repo_id: row.get(1)?,
                path: row.get(2)?,
                range: format!("{start_line}-{end_line}"),
                score: 0.0,
                layer: row.get(5)?,
                artifact_type: row.get(6)?,
                sha256: row.get(7)?,
                why: QueryWhy {
                    query_terms: Vec::new(),
                    applied_filter_keys: applied_keys.clone(),
                    rank_features: BTreeMap::from([("metadata".to_string(), 0.0)]),
                },
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Builds a `AND col = ?` clause per set filter, in a fixed order so the
/// parameter list built alongside it lines up positionally.
fn build_filter_clause(filters: &QueryFilters) -> (String, Vec<String>) {
    let mut clause = String::new();
    let mut terms = Vec::new();
    if let Some(repo_id) = &filters.repo_id {
        clause.push_str(" AND c.repo_id = ? ");
        terms.push(repo_id.clone());
    }
    if let Some(path) = &filters.path {
        clause.push_str(" AND LOWER(c.path) LIKE ? ");
        terms.push(format!("%{}%", path.to_ascii_lowercase()));
    }
    if let Some(ext) = filters.normalized_ext() {
        clause.push_str(" AND LOWER(c.path) LIKE ? ");
        terms.push(format!("%{ext}"));
    }
    if let Some(layer) = &filters.layer {
        clause.push_str(" AND c.layer = ? ");
        terms.push(layer.clone());
    }
    if let Some(artifact_type) = &filters.artifact_type {
        clause.push_str(" AND c.artifact_type = ? ");
        terms.push(artifact_type.clone());
    }
    (clause, terms)
}
