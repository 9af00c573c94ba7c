//! Contract registry (C14)
//!
//! Enumerates artifact roles, their canonical dump-index aliases, and the
//! stable schema IDs the pipeline emits. Assembled once per run and passed
//! by value rather than kept as global state (see DESIGN.md).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of artifact roles a run can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    CanonicalMd,
    IndexSidecarJson,
    ChunkIndexJsonl,
    DumpIndexJson,
    SqliteIndex,
    RetrievalEvalJson,
    DerivedManifestJson,
    #[serde(alias = "delta_json")]
    PrDeltaJson,
    ArchitectureSummary,
    /// The bundle manifest's own self-entry (§8: "including the self-entry
    /// bundle.json"). Not named in the closed set of §3, which enumerates
    /// the artifacts a manifest *describes* but omits the manifest itself;
    /// added here so the self-referential fix-point in `emit::fixpoint` has
    /// a role to list itself under (see DESIGN.md).
    BundleManifestJson,
}

impl ArtifactRole {
    /// Canonical enum order used to order `BundleManifest.artifacts[]` (§5).
    pub const CANONICAL_ORDER: [ArtifactRole; 10] = [
        ArtifactRole::CanonicalMd,
        ArtifactRole::IndexSidecarJson,
        ArtifactRole::ChunkIndexJsonl,
        ArtifactRole::DumpIndexJson,
        ArtifactRole::DerivedManifestJson,
        ArtifactRole::ArchitectureSummary,
        ArtifactRole::SqliteIndex,
        ArtifactRole::RetrievalEvalJson,
        ArtifactRole::PrDeltaJson,
        ArtifactRole::BundleManifestJson,
    ];

    pub fn rank(self) -> usize {
        Self::CANONICAL_ORDER.iter().position(|r| *r == self).unwrap_or(usize::MAX)
    }

    /// Canonical dump-index alias key for this role (never the legacy form on write).
    pub fn dump_index_alias(self) -> &'static str {
        match self {
            ArtifactRole::CanonicalMd => "merge_md",
            ArtifactRole::IndexSidecarJson => "sidecar_json",
            ArtifactRole::ChunkIndexJsonl => "chunk_index",
            ArtifactRole::DumpIndexJson => "dump_index",
            ArtifactRole::SqliteIndex => "sqlite_index",
            ArtifactRole::RetrievalEvalJson => "retrieval_eval",
            ArtifactRole::DerivedManifestJson => "derived_manifest",
            ArtifactRole::PrDeltaJson => "pr_delta",
            ArtifactRole::ArchitectureSummary => "architecture_summary",
            ArtifactRole::BundleManifestJson => "bundle_manifest_json",
        }
    }

    /// Accepts either the canonical alias or a known legacy alias on read.
    /// Per spec §9 Open Questions: `chunk_index` vs `chunk_index_jsonl`.
    pub fn from_alias(alias: &str) -> Option<ArtifactRole> {
        Some(match alias {
            "merge_md" => ArtifactRole::CanonicalMd,
            "sidecar_json" => ArtifactRole::IndexSidecarJson,
            "chunk_index" | "chunk_index_jsonl" => ArtifactRole::ChunkIndexJsonl,
            "dump_index" => ArtifactRole::DumpIndexJson,
            "sqlite_index" => ArtifactRole::SqliteIndex,
            "retrieval_eval" => ArtifactRole::RetrievalEvalJson,
            "derived_manifest" => ArtifactRole::DerivedManifestJson,
            "pr_delta" | "delta_json" => ArtifactRole::PrDeltaJson,
            "architecture_summary" => ArtifactRole::ArchitectureSummary,
            "bundle_manifest_json" | "bundle_manifest" => ArtifactRole::BundleManifestJson,
            _ => return None,
        })
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ArtifactRole::CanonicalMd
            | ArtifactRole::ArchitectureSummary => "text/markdown",
            ArtifactRole::ChunkIndexJsonl => "application/x-ndjson",
            ArtifactRole::SqliteIndex => "application/vnd.sqlite3",
            _ => "application/json",
        }
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_value(self).unwrap_or_default();
        write!(f, "{}", json.as_str().unwrap_or("unknown"))
    }
}

/// Stable schema IDs emitted in `generator.schema_ids` / used by the verifier.
pub mod schema_id {
    pub const BUNDLE_MANIFEST_V1: &str = "bundle-manifest.v1";
    pub const PR_SCHAU_DELTA_V1: &str = "pr-schau-delta.v1";
    pub const RANGE_REF_V1: &str = "range-ref.v1";
    pub const QUERY_RESULT_V1: &str = "query-result.v1";
    pub const RETRIEVAL_EVAL_V1: &str = "retrieval-eval.v1";
    pub const DUMP_INDEX_V1: &str = "dump-index.v1";
    pub const ARCHITECTURE_SUMMARY_V1: &str = "architecture-summary.v1";
    pub const DERIVED_INDEX_V1: &str = "derived-index.v1";
    pub const REPOLENS_AGENT_V2: &str = "repolens-agent";
}

/// A contract registry assembled at start-of-run: the full set of schema IDs
/// this crate understands, by role. Passed by value to emitters/verifiers.
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    pub generator_name: &'static str,
    pub generator_version: &'static str,
}

impl Default for ContractRegistry {
    fn default() -> Self {
        Self { generator_name: "repolens", generator_version: env!("CARGO_PKG_VERSION") }
    }
}

impl ContractRegistry {
    pub fn schema_id_for(&self, role: ArtifactRole) -> &'static str {
        match role {
            ArtifactRole::CanonicalMd => "canonical-md.v1",
            ArtifactRole::IndexSidecarJson => schema_id::REPOLENS_AGENT_V2,
            ArtifactRole::ChunkIndexJsonl => "chunk-index.v1",
            ArtifactRole::DumpIndexJson => schema_id::DUMP_INDEX_V1,
            ArtifactRole::SqliteIndex => "sqlite-index.v1",
            ArtifactRole::RetrievalEvalJson => schema_id::RETRIEVAL_EVAL_V1,
            ArtifactRole::DerivedManifestJson => schema_id::DERIVED_INDEX_V1,
            ArtifactRole::PrDeltaJson => schema_id::PR_SCHAU_DELTA_V1,
            ArtifactRole::ArchitectureSummary => schema_id::ARCHITECTURE_SUMMARY_V1,
            ArtifactRole::BundleManifestJson => schema_id::BUNDLE_MANIFEST_V1,
        }
    }
}
