//! Run configuration (§3 RunConfig / §4.2 Scanner inputs / §4.3 Chunker params).
//!
//! Loaded from an optional TOML file and layered with CLI overrides exactly
//! the way the teacher's `config::{load_config, merge_cli_with_config,
//! CliOverrides}` does: an all-`Option<T>` overrides struct and a pure
//! `merge_cli_with_config(base, overrides) -> RunConfig` free function.

use crate::error::{RepolensError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// `sidecar.meta.output_mode`: whether the sqlite index is built alongside
/// the file-based artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    FilesOnly,
    Dual,
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Dual
    }
}

/// `sidecar.meta.profile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Agent,
    Human,
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Agent
    }
}

/// Full pipeline configuration, canonically hashed into `config_sha256`.
///
/// Field order is the JSON key order after canonical serialization
/// (`serde_json::to_value` then sorted-key re-emit in [`config_sha256`]),
/// not the struct's declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub source_repos: Vec<String>,
    pub output_dir: PathBuf,
    pub base_name: String,
    pub profile: Profile,
    pub output_mode: OutputMode,

    // Scanner (C2)
    pub include_hidden: bool,
    pub calculate_hash: bool,
    pub include_extensions: BTreeSet<String>,
    pub exclude_globs: BTreeSet<String>,
    pub max_file_bytes: u64,

    // Chunker (C3)
    pub min_chunk_bytes: usize,
    pub max_chunk_bytes: usize,
    pub min_chunk_lines: usize,
    pub max_chunk_lines: usize,

    // Redactor (C5)
    pub redact_secrets: bool,

    // Markdown emitter (C6)
    pub split_size_bytes: u64,

    // Sidecar (C7)
    pub max_bytes: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source_repos: Vec::new(),
            output_dir: PathBuf::from("."),
            base_name: "repo".to_string(),
            profile: Profile::default(),
            output_mode: OutputMode::default(),
            include_hidden: false,
            calculate_hash: true,
            include_extensions: BTreeSet::new(),
            exclude_globs: BTreeSet::new(),
            max_file_bytes: 10 * 1024 * 1024,
            min_chunk_bytes: 2048,
            max_chunk_bytes: 8192,
            min_chunk_lines: 200,
            max_chunk_lines: 400,
            redact_secrets: false,
            split_size_bytes: 0,
            max_bytes: u64::MAX,
        }
    }
}

/// Loads a [`RunConfig`] from a TOML file; missing files are not an error —
/// callers fall back to `RunConfig::default()` and layer CLI overrides on it.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let raw = std::fs::read_to_string(path)?;
    toml::from_str(&raw).map_err(|err| RepolensError::ConfigInvalid(err.to_string()))
}

/// All-`Option<T>` CLI override layer, mirroring the teacher's `CliOverrides`.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub source_repos: Option<Vec<String>>,
    pub output_dir: Option<PathBuf>,
    pub base_name: Option<String>,
    pub profile: Option<Profile>,
    pub output_mode: Option<OutputMode>,
    pub include_hidden: Option<bool>,
    pub calculate_hash: Option<bool>,
    pub include_extensions: Option<BTreeSet<String>>,
    pub exclude_globs: Option<BTreeSet<String>>,
    pub max_file_bytes: Option<u64>,
    pub min_chunk_bytes: Option<usize>,
    pub max_chunk_bytes: Option<usize>,
    pub min_chunk_lines: Option<usize>,
    pub max_chunk_lines: Option<usize>,
    pub redact_secrets: Option<bool>,
    pub split_size_bytes: Option<u64>,
    pub max_bytes: Option<u64>,
}

/// Applies CLI overrides on top of a loaded/default [`RunConfig`]; every
/// field present in `cli` replaces the base value, everything else is kept.
pub fn merge_cli_with_config(mut base: RunConfig, cli: CliOverrides) -> RunConfig {
    if let Some(v) = cli.source_repos {
        base.source_repos = v;
    }
    if let Some(v) = cli.output_dir {
        base.output_dir = v;
    }
    if let Some(v) = cli.base_name {
        base.base_name = v;
    }
    if let Some(v) = cli.profile {
        base.profile = v;
    }
    if let Some(v) = cli.output_mode {
        base.output_mode = v;
    }
    if let Some(v) = cli.include_hidden {
        base.include_hidden = v;
    }
    if let Some(v) = cli.calculate_hash {
        base.calculate_hash = v;
    }
    if let Some(v) = cli.include_extensions {
        base.include_extensions = v;
    }
    if let Some(v) = cli.exclude_globs {
        base.exclude_globs = v;
    }
    if let Some(v) = cli.max_file_bytes {
        base.max_file_bytes = v;
    }
    if let Some(v) = cli.min_chunk_bytes {
        base.min_chunk_bytes = v;
    }
    if let Some(v) = cli.max_chunk_bytes {
        base.max_chunk_bytes = v;
    }
    if let Some(v) = cli.min_chunk_lines {
        base.min_chunk_lines = v;
    }
    if let Some(v) = cli.max_chunk_lines {
        base.max_chunk_lines = v;
    }
    if let Some(v) = cli.redact_secrets {
        base.redact_secrets = v;
    }
    if let Some(v) = cli.split_size_bytes {
        base.split_size_bytes = v;
    }
    if let Some(v) = cli.max_bytes {
        base.max_bytes = v;
    }
    base
}

/// Canonical (sorted-key) JSON serialization of a [`RunConfig`], hashed into
/// `generator.config_sha256` (§3/§4.7: mandatory, must match `^[0-9a-f]{64}$`).
pub fn config_sha256(config: &RunConfig) -> Result<String> {
    let value = serde_json::to_value(config)?;
    let canonical = canonicalize(&value);
    Ok(crate::hash::hash_bytes(canonical.as_bytes()))
}

/// Recursively sorts object keys so the resulting JSON text is stable
/// regardless of struct field declaration order.
fn canonicalize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap(), canonicalize(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        serde_json::Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}
