//! Core domain types (§3): `FileInfo`, `Chunk`, `BundleManifest`, `DumpIndex`,
//! the sidecar, delta entries, and range refs.
//!
//! Equivalent to the teacher's `domain::Config`/`FileInfo`/`Chunk`: the
//! types the rest of the crate is built around. All entities here are
//! immutable once emitted (§3 Lifecycle) — nothing in this module mutates
//! a value after construction beyond the fix-point rewrite in `emit::fixpoint`.

use crate::contracts::ArtifactRole;
use crate::hash::sha1_hex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Identity of one scanned source file (§3 FileInfo).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub repo: String,
    pub path: PathBuf,
    pub relative_path: String,
    pub size_bytes: u64,
    pub is_text: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default)]
    pub category: BTreeSet<String>,
    pub extension: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub file_id: String,
}

/// Derives the stable `FILE:f_<short-sha1(repo||relpath)>` identity (§3).
///
/// Does not depend on iteration order: a pure function of `(repo, relpath)`.
pub fn file_id(repo: &str, relative_path: &str) -> String {
    let digest = sha1_hex(format!("{repo}||{relative_path}").as_bytes());
    format!("FILE:f_{}", &digest[..12])
}

/// A contiguous byte range of exactly one file (§3 Chunk).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub file_id: String,
    pub path: String,
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub content_sha256: String,
    pub size_bytes: usize,
    pub language: String,
    pub section: String,
    pub layer: String,
    pub artifact_type: String,
    #[serde(default)]
    pub concepts: Vec<String>,
}

/// `chunk_id = sha1(path || str(start_line) || content_sha256)[:20]` (§3/§8).
pub fn chunk_id(path: &str, start_line: usize, content_sha256: &str) -> String {
    let digest = sha1_hex(format!("{path}{start_line}{content_sha256}").as_bytes());
    digest[..20].to_string()
}

/// Generator provenance stamped on every emitted artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generator {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub config_sha256: String,
}

/// Discriminant for [`ArtifactEntry`]; mirrors `interpretation.mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpretationMode {
    RoleOnly,
    Contract,
}

/// A contract reference attached to artifacts that carry a versioned schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractInfo {
    pub schema_id: String,
}

/// One manifest artifact entry.
///
/// Modeled as a closed sum (`RoleOnly` | `Contract`) per DESIGN notes §9,
/// with a hand-written `Serialize`/`Deserialize` so the wire shape stays a
/// flat object: `{role, path, content_type, bytes, sha256, interpretation, contract?}`.
#[derive(Debug, Clone)]
pub enum ArtifactEntry {
    RoleOnly(ArtifactEntryFields),
    Contract { fields: ArtifactEntryFields, contract: ContractInfo },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntryFields {
    pub role: ArtifactRole,
    pub path: String,
    pub content_type: String,
    pub bytes: u64,
    pub sha256: String,
}

impl ArtifactEntry {
    pub fn fields(&self) -> &ArtifactEntryFields {
        match self {
            ArtifactEntry::RoleOnly(f) => f,
            ArtifactEntry::Contract { fields, .. } => fields,
        }
    }

    pub fn mode(&self) -> InterpretationMode {
        match self {
            ArtifactEntry::RoleOnly(_) => InterpretationMode::RoleOnly,
            ArtifactEntry::Contract { .. } => InterpretationMode::Contract,
        }
    }
}

impl Serialize for ArtifactEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let fields = self.fields();
        let has_contract = matches!(self, ArtifactEntry::Contract { .. });
        let mut state =
            serializer.serialize_struct("ArtifactEntry", if has_contract { 7 } else { 6 })?;
        state.serialize_field("role", &fields.role)?;
        state.serialize_field("path", &fields.path)?;
        state.serialize_field("content_type", &fields.content_type)?;
        state.serialize_field("bytes", &fields.bytes)?;
        state.serialize_field("sha256", &fields.sha256)?;
        #[derive(Serialize)]
        struct Interp {
            mode: InterpretationMode,
        }
        state.serialize_field("interpretation", &Interp { mode: self.mode() })?;
        if let ArtifactEntry::Contract { contract, .. } = self {
            state.serialize_field("contract", contract)?;
        }
        state.end()
    }
}

impl<'de> Deserialize<'de> for ArtifactEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Interp {
            mode: InterpretationMode,
        }
        #[derive(Deserialize)]
        struct Raw {
            role: ArtifactRole,
            path: String,
            content_type: String,
            bytes: u64,
            sha256: String,
            interpretation: Interp,
            #[serde(default)]
            contract: Option<ContractInfo>,
        }
        let raw = Raw::deserialize(deserializer)?;
        let fields = ArtifactEntryFields {
            role: raw.role,
            path: raw.path,
            content_type: raw.content_type,
            bytes: raw.bytes,
            sha256: raw.sha256,
        };
        match (raw.interpretation.mode, raw.contract) {
            (InterpretationMode::RoleOnly, None) => Ok(ArtifactEntry::RoleOnly(fields)),
            (InterpretationMode::Contract, Some(contract)) => {
                Ok(ArtifactEntry::Contract { fields, contract })
            }
            _ => Err(serde::de::Error::custom(
                "interpretation.mode must be \"contract\" iff a contract field is present",
            )),
        }
    }
}

/// `{links: {canonical_dump_index_sha256}}` portion of the bundle manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestLinks {
    pub canonical_dump_index_sha256: String,
}

/// `{capabilities: {fts5_bm25}}` portion of the bundle manifest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ManifestCapabilities {
    pub fts5_bm25: bool,
}

/// The bundle manifest tying all other artifacts together (§3 BundleManifest).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub kind: String,
    pub version: u32,
    pub run_id: String,
    pub created_at: String,
    pub generator: Generator,
    pub artifacts: Vec<ArtifactEntry>,
    pub links: ManifestLinks,
    pub capabilities: ManifestCapabilities,
}

impl BundleManifest {
    pub const KIND: &'static str = "repolens.bundle.manifest";
    pub const VERSION: u32 = 1;
}

/// One entry of the dump-index's `artifacts` map (§3 DumpIndex).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpIndexEntry {
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
    pub content_type: String,
    pub role: ArtifactRole,
}

/// Lookup-by-alias map of emitted artifacts (§3 DumpIndex).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpIndex {
    pub contract: String,
    pub run_id: String,
    pub artifacts: std::collections::BTreeMap<String, DumpIndexEntry>,
}

impl DumpIndex {
    pub const CONTRACT: &'static str = "dump-index";

    /// Resolves a role to its on-disk relative path, if present.
    pub fn path_for_role(&self, role: ArtifactRole) -> Option<&str> {
        self.artifacts
            .values()
            .find(|entry| entry.role == role)
            .map(|entry| entry.path.as_str())
    }
}

/// Sidecar `meta.reading_policy` sub-object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingPolicy {
    pub canonical_content_artifact: String,
    pub navigation_artifacts: Vec<String>,
}

/// Sidecar `meta` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarMeta {
    pub contract: String,
    pub contract_version: String,
    pub profile: String,
    pub total_files: usize,
    pub features: Vec<String>,
    pub generator: Generator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index_contract: Option<String>,
    pub dump_index_contract: String,
    pub schema_ids: std::collections::BTreeMap<String, String>,
    pub reading_policy: ReadingPolicy,
    pub output_mode: String,
    pub include_hidden: bool,
    pub redact_secrets: bool,
    pub split_size_bytes: u64,
    pub max_bytes: u64,
    pub source_repos: Vec<String>,
}

/// One entry of the sidecar's `files[]` (§3 Sidecar).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarFileEntry {
    pub id: String,
    pub path: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub language: String,
    pub estimated_tokens: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_level_symbols: Vec<String>,
}

/// Sidecar `artifacts` block (basenames only, per-repo paths resolved by the
/// dump-index/manifest).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarArtifacts {
    pub chunk_index_basename: String,
    pub md_parts_basenames: Vec<String>,
}

/// The `repolens-agent` sidecar (§3 Sidecar).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sidecar {
    pub meta: SidecarMeta,
    pub files: Vec<SidecarFileEntry>,
    pub artifacts: SidecarArtifacts,
}

/// Per-file SHA-256 status in a delta entry (§3 Delta file entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sha256Status {
    Ok,
    Missing,
    Permission,
    IoError,
    Skipped,
}

/// File status within a two-snapshot delta (§3/§4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaStatus {
    Added,
    Changed,
    Removed,
}

/// One file entry of a `pr-schau-delta.v1` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaEntry {
    pub path: String,
    pub status: DeltaStatus,
    pub size_bytes: u64,
    pub sha256: Option<String>,
    pub sha256_status: Sha256Status,
}

/// A content-addressed pointer into a manifest artifact (§3 RangeRef).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeRef {
    pub artifact_role: ArtifactRole,
    pub repo_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_sha256: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_is_deterministic_and_order_independent() {
        let a = file_id("repo-a", "src/main.rs");
        let b = file_id("repo-a", "src/main.rs");
        assert_eq!(a, b);
        assert!(a.starts_with("FILE:f_"));
    }

    #[test]
    fn chunk_id_is_twenty_hex_chars() {
        let id = chunk_id("src/main.rs", 1, &"a".repeat(64));
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn artifact_entry_round_trips_role_only() {
        let entry = ArtifactEntry::RoleOnly(ArtifactEntryFields {
            role: ArtifactRole::CanonicalMd,
            path: "repo_merge.md".into(),
            content_type: "text/markdown".into(),
            bytes: 10,
            sha256: "a".repeat(64),
        });
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["interpretation"]["mode"], "role_only");
        assert!(json.get("contract").is_none());

        let back: ArtifactEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back.fields().path, "repo_merge.md");
    }

    #[test]
    fn artifact_entry_round_trips_contract() {
        let entry = ArtifactEntry::Contract {
            fields: ArtifactEntryFields {
                role: ArtifactRole::IndexSidecarJson,
                path: "repo.json".into(),
                content_type: "application/json".into(),
                bytes: 20,
                sha256: "b".repeat(64),
            },
            contract: ContractInfo { schema_id: "repolens-agent".into() },
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["interpretation"]["mode"], "contract");
        assert_eq!(json["contract"]["schema_id"], "repolens-agent");

        let back: ArtifactEntry = serde_json::from_value(json).unwrap();
        assert!(matches!(back, ArtifactEntry::Contract { .. }));
    }

    #[test]
    fn artifact_entry_rejects_mismatched_mode_and_contract() {
        let bad = serde_json::json!({
            "role": "canonical_md",
            "path": "x",
            "content_type": "text/markdown",
            "bytes": 1,
            "sha256": "a".repeat(64),
            "interpretation": {"mode": "contract"},
        });
        let result: Result<ArtifactEntry, _> = serde_json::from_value(bad);
        assert!(result.is_err());
    }
}
