//! Eval Engine (C10): parses a gold-queries markdown file, runs each query
//! through the index, and reports Recall@k (§4.10).
//!
//! Grammar: each query is introduced by a numbered bold-quoted line
//! (`N. **"text"**`); subsequent bullet lines starting `Expected` carry
//! backticked path substrings, lines starting `Filter` carry backticked
//! `key=value` pairs. A hit is relevant iff any result's path contains any
//! expected substring.

use crate::index::query::{query, QueryFilters};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// One parsed gold query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoldQuery {
    pub text: String,
    pub expected_substrings: Vec<String>,
    pub filters: Vec<(String, String)>,
}

static QUERY_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^\s*\d+\.\s*\*\*"(.+)"\*\*"#).expect("valid header pattern"));
static BACKTICK_VALUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("valid backtick pattern"));

/// Parses every gold query out of a markdown document, in source order.
pub fn parse_gold_queries(markdown: &str) -> Vec<GoldQuery> {
    let mut queries = Vec::new();
    let mut current: Option<GoldQuery> = None;

    for line in markdown.lines() {
        if let Some(caps) = QUERY_HEADER.captures(line) {
            if let Some(prev) = current.take() {
                queries.push(prev);
            }
            current = Some(GoldQuery { text: caps[1].to_string(), ..GoldQuery::default() });
            continue;
        }

        let trimmed = line.trim_start_matches(['-', '*', ' ']);
        if let Some(rest) = trimmed.strip_prefix("Expected") {
            if let Some(query) = current.as_mut() {
                if let Some(caps) = BACKTICK_VALUE.captures(rest) {
                    query.expected_substrings.push(caps[1].to_string());
                }
            }
        } else if let Some(rest) = trimmed.strip_prefix("Filter") {
            if let Some(query) = current.as_mut() {
                if let Some(caps) = BACKTICK_VALUE.captures(rest) {
                    if let Some((key, value)) = caps[1].split_once('=') {
                        query.filters.push((key.trim().to_string(), value.trim().to_string()));
                    }
                }
            }
        }
    }
    if let Some(last) = current {
        queries.push(last);
    }
    queries
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalDetail {
    pub query: String,
    pub is_relevant: bool,
    pub hit_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Named `recall@k` (an implementer resolution of the spec's `recall@K`
/// placeholder — a literal field name keeps the schema stable across runs
/// with different `k`; see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalMetrics {
    #[serde(rename = "recall@k")]
    pub recall_at_k: f64,
    pub total_queries: usize,
    pub hits: usize,
}

/// `retrieval-eval.v1` (§6): pure JSON, no human-readable rows mixed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
    pub metrics: EvalMetrics,
    pub details: Vec<EvalDetail>,
}

/// Runs every gold query through the index at `k`, recording per-query
/// errors without aborting the batch (§4.10).
pub fn run_eval(conn: &Connection, queries: &[GoldQuery], k: usize) -> EvalResult {
    let mut details = Vec::with_capacity(queries.len());
    let mut hits = 0usize;

    for gold in queries {
        let filters = QueryFilters {
            layer: find_filter(&gold.filters, "layer"),
            repo_id: find_filter(&gold.filters, "repo_id"),
            path: find_filter(&gold.filters, "path"),
            ext: find_filter(&gold.filters, "ext"),
            artifact_type: find_filter(&gold.filters, "artifact_type"),
        };

        match query(conn, &gold.text, k, &filters) {
            Ok(result) => {
                let is_relevant = gold.expected_substrings.is_empty()
                    || result
                        .results
                        .iter()
                        .any(|row| gold.expected_substrings.iter().any(|sub| row.path.contains(sub.as_str())));
                if is_relevant {
                    hits += 1;
                }
                details.push(EvalDetail {
                    query: gold.text.clone(),
                    is_relevant,
                    hit_count: result.count,
                    error: None,
                });
            }
            Err(err) => {
                details.push(EvalDetail {
                    query: gold.text.clone(),
                    is_relevant: false,
                    hit_count: 0,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    let total_queries = queries.len();
    let recall_at_k = if total_queries == 0 { 0.0 } else { (hits as f64 / total_queries as f64) * 100.0 };

    EvalResult { metrics: EvalMetrics { recall_at_k, total_queries, hits }, details }
}

fn find_filter(filters: &[(String, String)], key: &str) -> Option<String> {
    filters.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_with_expectations_and_filter() {
        let markdown = "1. **\"login\"**\n   - Expected `auth.py`\n   - Filter `layer=core`\n\n2. **\"chunk\"**\n";
        let queries = parse_gold_queries(markdown);
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].text, "login");
        assert_eq!(queries[0].expected_substrings, vec!["auth.py".to_string()]);
        assert_eq!(queries[0].filters, vec![("layer".to_string(), "core".to_string())]);
        assert!(queries[1].expected_substrings.is_empty());
    }

    #[test]
    fn recall_is_percentage_of_relevant_hits() {
        let queries = vec![
            GoldQuery { text: "a".to_string(), expected_substrings: vec![], filters: vec![] },
            GoldQuery { text: "b".to_string(), expected_substrings: vec![], filters: vec![] },
        ];
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE index_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
             CREATE TABLE chunks (chunk_id TEXT, file_id TEXT, repo_id TEXT, path TEXT,
                 start_byte INT, end_byte INT, start_line INT, end_line INT, sha256 TEXT,
                 layer TEXT, section TEXT, artifact_type TEXT, language TEXT);
             CREATE VIRTUAL TABLE chunks_fts USING fts5(chunk_id UNINDEXED, content, path_tokens);",
        )
        .unwrap();

        let result = run_eval(&conn, &queries, 10);
        assert_eq!(result.metrics.total_queries, 2);
        assert_eq!(result.metrics.hits, 2);
        assert_eq!(result.metrics.recall_at_k, 100.0);
    }
}
