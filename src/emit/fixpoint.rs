//! The bundle manifest's self-referential fix-point (§4.7, §9 "Cyclic
//! manifest dependency").
//!
//! `bundle.json` must list itself in `artifacts[]`. A self-entry whose
//! `sha256` is the true content hash of the very bytes it is embedded in is
//! a SHA-256 pre-image of the document over itself and is not computable:
//! embedding `H(S)` into `S` produces a different document `S'`, so
//! `H(S') != H(S)` and no amount of iterating closes that loop. Instead we
//! converge on `bytes` only — the self-entry's `bytes` field settles once
//! the document's serialized length stops changing between iterations,
//! which happens quickly because the only thing that can still grow the
//! document is the digit width of `bytes` itself (the `sha256` field is
//! always a fixed-width 64 hex chars, placeholder or real, so swapping one
//! in never changes the serialized length). The self-entry's `sha256` is
//! then set to the hash of the *canonical form* — the converged document
//! with its own `sha256` field held at the placeholder — which is
//! deterministic and reproducible but is not, and cannot be, the hash of
//! the final on-disk bytes. `bytes` is iterated up to `MAX_ITERATIONS`
//! times and must be byte-stable by the final pass (§4.7 option (b)).

use crate::contracts::{schema_id, ArtifactRole};
use crate::domain::{
    ArtifactEntry, ArtifactEntryFields, BundleManifest, ContractInfo, Generator, ManifestCapabilities,
    ManifestLinks,
};
use crate::error::{RepolensError, Result};
use crate::hash::hash_bytes;

const PLACEHOLDER_SHA256: &str = "0000000000000000000000000000000000000000000000000000000000000000";
const MAX_ITERATIONS: usize = 3;

fn self_entry(path: &str, bytes: u64, sha256: String) -> ArtifactEntry {
    ArtifactEntry::Contract {
        fields: ArtifactEntryFields {
            role: ArtifactRole::BundleManifestJson,
            path: path.to_string(),
            content_type: "application/json".to_string(),
            bytes,
            sha256,
        },
        contract: ContractInfo { schema_id: schema_id::BUNDLE_MANIFEST_V1.to_string() },
    }
}

fn build_with_self(
    run_id: &str,
    created_at: &str,
    generator: &Generator,
    other_artifacts: &[ArtifactEntry],
    links: &ManifestLinks,
    capabilities: ManifestCapabilities,
    entry: ArtifactEntry,
) -> std::result::Result<(BundleManifest, Vec<u8>), serde_json::Error> {
    let mut artifacts = other_artifacts.to_vec();
    artifacts.push(entry);

    let manifest = BundleManifest {
        kind: BundleManifest::KIND.to_string(),
        version: BundleManifest::VERSION,
        run_id: run_id.to_string(),
        created_at: created_at.to_string(),
        generator: generator.clone(),
        artifacts,
        links: links.clone(),
        capabilities,
    };
    let serialized = serde_json::to_vec_pretty(&manifest)?;
    Ok((manifest, serialized))
}

/// Builds the bundle manifest, including its own self-entry, by iterating
/// placeholder -> serialize -> rewrite `bytes` until the serialized length
/// stops changing (or `MAX_ITERATIONS` is reached), then stamping the
/// self-entry's `sha256` with the hash of that converged canonical form.
pub fn build_bundle_manifest(
    run_id: &str,
    created_at: &str,
    generator: Generator,
    self_path: &str,
    mut other_artifacts: Vec<ArtifactEntry>,
    links: ManifestLinks,
    capabilities: ManifestCapabilities,
) -> Result<(BundleManifest, Vec<u8>)> {
    other_artifacts.sort_by_key(|entry| entry.fields().role.rank());

    let mut guess_bytes: u64 = 0;
    let mut canonical: Option<(BundleManifest, Vec<u8>)> = None;

    for _ in 0..MAX_ITERATIONS {
        let entry = self_entry(self_path, guess_bytes, PLACEHOLDER_SHA256.to_string());
        let (manifest, serialized) =
            build_with_self(run_id, created_at, &generator, &other_artifacts, &links, capabilities, entry)?;
        let actual_bytes = serialized.len() as u64;

        if actual_bytes == guess_bytes {
            canonical = Some((manifest, serialized));
            break;
        }
        guess_bytes = actual_bytes;
    }

    let (_, canonical_serialized) = canonical.ok_or_else(|| {
        RepolensError::SchemaViolation(format!(
            "bundle manifest self-entry's byte length did not converge within {MAX_ITERATIONS} iterations"
        ))
    })?;

    let canonical_sha256 = hash_bytes(&canonical_serialized);
    let final_entry = self_entry(self_path, guess_bytes, canonical_sha256);
    let (final_manifest, final_serialized) =
        build_with_self(run_id, created_at, &generator, &other_artifacts, &links, capabilities, final_entry)?;

    debug_assert_eq!(final_serialized.len() as u64, guess_bytes, "swapping a 64-hex sha256 must not change length");

    Ok((final_manifest, final_serialized))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> Generator {
        Generator {
            name: "repolens".to_string(),
            version: "0.1.0".to_string(),
            platform: None,
            config_sha256: "a".repeat(64),
        }
    }

    #[test]
    fn placeholder_sha256_is_64_hex_chars() {
        assert_eq!(PLACEHOLDER_SHA256.len(), 64);
        assert!(PLACEHOLDER_SHA256.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn self_entry_bytes_matches_serialized_length() {
        let (manifest, bytes) = build_bundle_manifest(
            "run-1",
            "2026-01-01T00:00:00Z",
            generator(),
            "repo.bundle.manifest.json",
            Vec::new(),
            ManifestLinks { canonical_dump_index_sha256: "b".repeat(64) },
            ManifestCapabilities { fts5_bm25: true },
        )
        .unwrap();

        let self_entry =
            manifest.artifacts.iter().find(|a| a.fields().role == ArtifactRole::BundleManifestJson).unwrap();
        // The self-entry's `bytes` is the real serialized length of the
        // document it is embedded in. Its `sha256` is NOT the hash of
        // `bytes` (a true self-content-hash is infeasible, see module
        // docs) — it is the hash of the converged canonical form with the
        // self-entry's own `sha256` held at the placeholder, which is
        // deterministic but distinct from `hash_bytes(&bytes)`.
        assert_eq!(self_entry.fields().bytes, bytes.len() as u64);
        assert_eq!(self_entry.fields().sha256.len(), 64);
        assert!(self_entry.fields().sha256.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn self_entry_sha256_is_deterministic_across_identical_builds() {
        let build = || {
            build_bundle_manifest(
                "run-1",
                "2026-01-01T00:00:00Z",
                generator(),
                "repo.bundle.manifest.json",
                Vec::new(),
                ManifestLinks { canonical_dump_index_sha256: "b".repeat(64) },
                ManifestCapabilities { fts5_bm25: true },
            )
            .unwrap()
        };

        let (first, _) = build();
        let (second, _) = build();
        let role = ArtifactRole::BundleManifestJson;
        let first_self = first.artifacts.iter().find(|a| a.fields().role == role).unwrap();
        let second_self = second.artifacts.iter().find(|a| a.fields().role == role).unwrap();
        assert_eq!(first_self.fields().sha256, second_self.fields().sha256);
        assert_eq!(first_self.fields().bytes, second_self.fields().bytes);
    }

    #[test]
    fn artifacts_are_ordered_by_canonical_rank() {
        let other = vec![
            ArtifactEntry::RoleOnly(ArtifactEntryFields {
                role: ArtifactRole::ArchitectureSummary,
                path: "repo_architecture.md".into(),
                content_type: "text/markdown".into(),
                bytes: 1,
                sha256: "c".repeat(64),
            }),
            ArtifactEntry::RoleOnly(ArtifactEntryFields {
                role: ArtifactRole::CanonicalMd,
                path: "repo_merge.md".into(),
                content_type: "text/markdown".into(),
                bytes: 1,
                sha256: "d".repeat(64),
            }),
        ];

        let (manifest, _) = build_bundle_manifest(
            "run-1",
            "2026-01-01T00:00:00Z",
            generator(),
            "repo.bundle.manifest.json",
            other,
            ManifestLinks { canonical_dump_index_sha256: "b".repeat(64) },
            ManifestCapabilities { fts5_bm25: false },
        )
        .unwrap();

        assert_eq!(manifest.artifacts[0].fields().role, ArtifactRole::CanonicalMd);
        assert_eq!(manifest.artifacts[1].fields().role, ArtifactRole::ArchitectureSummary);
    }
}
