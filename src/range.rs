//! Range Resolver (C11): turns a manifest path + [`RangeRef`] into the exact
//! bytes it points at, content-verified end to end (§4.11).
//!
//! Grounded on the same load-then-verify shape as [`crate::verify`]: both
//! read a manifest off disk and check hashes against the bytes it describes,
//! so a resolved range can never silently drift from what the manifest says
//! it is.

use crate::contracts::ArtifactRole;
use crate::domain::{BundleManifest, DumpIndex, RangeRef};
use crate::error::{RepolensError, Result};
use crate::hash::hash_bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Either manifest shape a range can be resolved against (§4.11 step 2).
pub enum ManifestShape {
    Bundle(BundleManifest),
    Dump(DumpIndex),
}

impl ManifestShape {
    fn path_for_role(&self, role: ArtifactRole) -> Option<String> {
        match self {
            ManifestShape::Bundle(manifest) => {
                manifest.artifacts.iter().find(|a| a.fields().role == role).map(|a| a.fields().path.clone())
            }
            ManifestShape::Dump(dump) => dump.path_for_role(role).map(str::to_string),
        }
    }

    fn run_id(&self) -> &str {
        match self {
            ManifestShape::Bundle(manifest) => &manifest.run_id,
            ManifestShape::Dump(dump) => &dump.run_id,
        }
    }

    fn config_sha256(&self) -> Option<&str> {
        match self {
            ManifestShape::Bundle(manifest) => Some(manifest.generator.config_sha256.as_str()),
            ManifestShape::Dump(_) => None,
        }
    }
}

/// Loads a manifest file, accepting either the bundle-manifest or dump-index
/// shape by probing the `kind`/`contract` discriminant (§4.11 step 2).
pub fn load_manifest(manifest_path: &Path) -> Result<ManifestShape> {
    let bytes = std::fs::read(manifest_path)?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;

    if value.get("kind").and_then(|v| v.as_str()) == Some(BundleManifest::KIND) {
        let manifest: BundleManifest = serde_json::from_value(value)?;
        Ok(ManifestShape::Bundle(manifest))
    } else if value.get("contract").and_then(|v| v.as_str()) == Some(DumpIndex::CONTRACT) {
        let dump: DumpIndex = serde_json::from_value(value)?;
        Ok(ManifestShape::Dump(dump))
    } else {
        Err(RepolensError::SchemaViolation(format!(
            "{} is neither a bundle manifest nor a dump index",
            manifest_path.display()
        )))
    }
}

/// Provenance stamped onto a resolved range (§4.11 step 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub run_id: String,
    pub artifact_role: ArtifactRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_sha256: Option<String>,
}

/// `range-ref.v1` resolution result (§4.11 step 7, §6 wire format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedRange {
    pub text: String,
    pub sha256: String,
    pub bytes: usize,
    pub lines: [usize; 2],
    pub provenance: Provenance,
}

/// Resolves one [`RangeRef`] against the manifest at `manifest_path`,
/// reading the artifact bytes relative to `artifact_root` (the manifest's
/// own directory — artifact paths are always basenames, §6) (§4.11).
pub fn resolve(manifest_path: &Path, artifact_root: &Path, reference: &RangeRef) -> Result<ResolvedRange> {
    let manifest = load_manifest(manifest_path)?;

    let resolved_path = manifest
        .path_for_role(reference.artifact_role)
        .ok_or_else(|| RepolensError::SchemaViolation(format!("manifest has no artifact for role {}", reference.artifact_role)))?;

    if let Some(expected) = &reference.file_path {
        if expected != &resolved_path {
            return Err(RepolensError::SchemaViolation(format!(
                "range_ref.file_path {expected:?} does not match manifest-resolved path {resolved_path:?}"
            )));
        }
    }

    let artifact_path: PathBuf = artifact_root.join(&resolved_path);
    let file_bytes = std::fs::read(&artifact_path)?;
    let file_size = file_bytes.len();

    if reference.start_byte > reference.end_byte || reference.end_byte > file_size {
        return Err(RepolensError::OutOfBounds(format!(
            "range [{}, {}) out of bounds for {} ({} bytes)",
            reference.start_byte, reference.end_byte, resolved_path, file_size
        )));
    }

    let slice = &file_bytes[reference.start_byte..reference.end_byte];
    let sha256 = hash_bytes(slice);

    if let Some(expected) = &reference.content_sha256 {
        if expected != &sha256 {
            return Err(RepolensError::HashMismatch { expected: expected.clone(), actual: sha256 });
        }
    }

    let text = String::from_utf8(slice.to_vec()).map_err(|_| {
        RepolensError::Decoding(format!("range [{}, {}) of {} is not valid UTF-8", reference.start_byte, reference.end_byte, resolved_path))
    })?;

    Ok(ResolvedRange {
        bytes: slice.len(),
        text,
        sha256,
        lines: [reference.start_line, reference.end_line],
        provenance: Provenance {
            run_id: manifest.run_id().to_string(),
            artifact_role: reference.artifact_role,
            config_sha256: manifest.config_sha256().map(str::to_string),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactEntry, ArtifactEntryFields, ContractInfo, Generator, ManifestCapabilities, ManifestLinks};
    use tempfile::tempdir;

    fn write_bundle(dir: &Path, content: &[u8], role: ArtifactRole, content_path: &str) -> PathBuf {
        std::fs::write(dir.join(content_path), content).unwrap();
        let entry = ArtifactEntry::RoleOnly(ArtifactEntryFields {
            role,
            path: content_path.to_string(),
            content_type: "text/markdown".to_string(),
            bytes: content.len() as u64,
            sha256: hash_bytes(content),
        });
        let manifest = BundleManifest {
            kind: BundleManifest::KIND.to_string(),
            version: BundleManifest::VERSION,
            run_id: "run-1".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            generator: Generator {
                name: "repolens".to_string(),
                version: "0.1.0".to_string(),
                platform: None,
                config_sha256: "a".repeat(64),
            },
            artifacts: vec![entry],
            links: ManifestLinks { canonical_dump_index_sha256: "b".repeat(64) },
            capabilities: ManifestCapabilities { fts5_bm25: true },
        };
        let manifest_path = dir.join("repo.bundle.manifest.json");
        std::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest).unwrap()).unwrap();
        manifest_path
    }

    #[test]
    fn resolves_exact_byte_range_with_matching_hash() {
        let dir = tempdir().unwrap();
        let content = b"Line 1\nLine 2\nLine 3\n";
        let manifest_path = write_bundle(dir.path(), content, ArtifactRole::CanonicalMd, "repo_merge.md");

        let reference = RangeRef {
            artifact_role: ArtifactRole::CanonicalMd,
            repo_id: "repo".to_string(),
            file_path: None,
            start_byte: 7,
            end_byte: 14,
            start_line: 2,
            end_line: 2,
            content_sha256: Some(hash_bytes(b"Line 2\n")),
        };

        let resolved = resolve(&manifest_path, dir.path(), &reference).unwrap();
        assert_eq!(resolved.text, "Line 2\n");
        assert_eq!(resolved.bytes, 7);
        assert_eq!(resolved.provenance.artifact_role, ArtifactRole::CanonicalMd);
        assert_eq!(resolved.provenance.run_id, "run-1");
    }

    #[test]
    fn rejects_out_of_bounds_range() {
        let dir = tempdir().unwrap();
        let content = b"short\n";
        let manifest_path = write_bundle(dir.path(), content, ArtifactRole::CanonicalMd, "repo_merge.md");

        let reference = RangeRef {
            artifact_role: ArtifactRole::CanonicalMd,
            repo_id: "repo".to_string(),
            file_path: None,
            start_byte: 0,
            end_byte: 1000,
            start_line: 1,
            end_line: 1,
            content_sha256: None,
        };

        let err = resolve(&manifest_path, dir.path(), &reference).unwrap_err();
        assert!(matches!(err, RepolensError::OutOfBounds(_)));
    }

    #[test]
    fn rejects_hash_mismatch() {
        let dir = tempdir().unwrap();
        let content = b"Line 1\nLine 2\n";
        let manifest_path = write_bundle(dir.path(), content, ArtifactRole::CanonicalMd, "repo_merge.md");

        let reference = RangeRef {
            artifact_role: ArtifactRole::CanonicalMd,
            repo_id: "repo".to_string(),
            file_path: None,
            start_byte: 0,
            end_byte: 6,
            start_line: 1,
            end_line: 1,
            content_sha256: Some("f".repeat(64)),
        };

        let err = resolve(&manifest_path, dir.path(), &reference).unwrap_err();
        assert!(matches!(err, RepolensError::HashMismatch { .. }));
    }

    #[test]
    fn rejects_file_path_mismatch() {
        let dir = tempdir().unwrap();
        let content = b"hello\n";
        let manifest_path = write_bundle(dir.path(), content, ArtifactRole::CanonicalMd, "repo_merge.md");

        let reference = RangeRef {
            artifact_role: ArtifactRole::CanonicalMd,
            repo_id: "repo".to_string(),
            file_path: Some("wrong_name.md".to_string()),
            start_byte: 0,
            end_byte: 5,
            start_line: 1,
            end_line: 1,
            content_sha256: None,
        };

        let err = resolve(&manifest_path, dir.path(), &reference).unwrap_err();
        assert!(matches!(err, RepolensError::SchemaViolation(_)));
    }
}
