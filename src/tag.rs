//! Semantic Tagger (C4): derives `layer`, `section`, `artifact_type`, and
//! `concepts` as a pure function of `(repo-relative path, content)` (§4.4).

use once_cell::sync::Lazy;
use regex::Regex;

/// Layer classification precedence: `core > service > cli > adapters >
/// retrieval > test > docs > unknown`.
const LAYER_PRECEDENCE: &[(&str, &[&str])] = &[
    ("core", &["core", "domain", "kernel"]),
    ("service", &["service", "services", "api", "server"]),
    ("cli", &["cli", "bin", "cmd"]),
    ("adapters", &["adapters", "adapter", "infra", "infrastructure"]),
    ("retrieval", &["retrieval", "index", "search", "rank"]),
    ("test", &["test", "tests", "spec", "specs"]),
    ("docs", &["docs", "doc", "documentation"]),
];

/// Pure path -> layer classification.
pub fn layer_for(relative_path: &str) -> &'static str {
    let components: Vec<&str> = relative_path.to_ascii_lowercase().split('/').collect();
    for (layer, markers) in LAYER_PRECEDENCE {
        if components.iter().any(|c| markers.contains(c)) {
            return layer;
        }
    }
    "unknown"
}

/// File stem without common test prefixes/suffixes (§4.4 `section`).
pub fn section_for(relative_path: &str) -> String {
    let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
    let stem = file_name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file_name);
    stem.strip_prefix("test_")
        .or_else(|| stem.strip_suffix("_test"))
        .or_else(|| stem.strip_suffix(".test"))
        .unwrap_or(stem)
        .to_string()
}

/// `artifact_type ∈ {code, documentation, config, data}` from extension.
pub fn artifact_type_for(extension: &str) -> &'static str {
    match extension {
        ".md" | ".rst" | ".txt" | ".adoc" => "documentation",
        ".yaml" | ".yml" | ".toml" | ".json" | ".ini" | ".cfg" => "config",
        ".csv" | ".tsv" | ".sql" => "data",
        "" => "data",
        _ => "code",
    }
}

const CONCEPT_KEYWORDS: &[(&str, &str)] = &[
    ("bundle", "bundling"),
    ("chunk", "chunking"),
    ("query", "retrieval"),
    ("search", "retrieval"),
    ("index", "retrieval"),
    ("redact", "redaction"),
    ("secret", "redaction"),
    ("manifest", "bundling"),
    ("hash", "hashing"),
    ("delta", "diffing"),
    ("diff", "diffing"),
    ("verify", "verification"),
    ("schema", "schema"),
];

static SYMBOL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:def|fn|class)\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid symbol pattern"));

/// Small, stably-ordered multiset of concept keyword hits plus extracted
/// top-level symbol names (§4.4).
pub fn concepts_for(content: &str) -> Vec<String> {
    let lowered = content.to_ascii_lowercase();
    let mut concepts = Vec::new();

    for (keyword, concept) in CONCEPT_KEYWORDS {
        if lowered.contains(keyword) && !concepts.contains(&concept.to_string()) {
            concepts.push(concept.to_string());
        }
    }

    for capture in SYMBOL_PATTERN.captures_iter(content) {
        if let Some(name) = capture.get(1) {
            let symbol = name.as_str().to_string();
            if !concepts.contains(&symbol) {
                concepts.push(symbol);
            }
        }
    }

    concepts
}
