//! Delta/Review Generator (C12): a two-snapshot diff state machine over a
//! repository, emitted as a self-referential bundle, a `pr-schau-delta.v1`
//! document, and a zone-marked review markdown (§4.12).
//!
//! `review.md` is not part of the closed [`ArtifactRole`] set (it has no
//! stable schema, just prose over the delta) so it is written to disk
//! alongside `bundle.json`/`delta.json` but deliberately left out of the
//! bundle manifest's `artifacts[]` (see DESIGN.md).

use crate::contracts::{schema_id, ArtifactRole, ContractRegistry};
use crate::domain::{DeltaEntry, DeltaStatus, FileInfo, Generator, ManifestCapabilities, ManifestLinks, Sha256Status};
use crate::emit::{self, fixpoint};
use crate::error::Result;
use crate::hash::hash_file;
use crate::render;
use crate::scan::ScanResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Added/changed/removed counts for a [`DeltaDocument`] (§3 Delta).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeltaSummary {
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
}

/// `pr-schau-delta.v1` (§4.12, §6 wire format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaDocument {
    pub contract: String,
    pub run_id: String,
    pub generated_at: String,
    pub summary: DeltaSummary,
    pub files: Vec<DeltaEntry>,
}

/// Runs the per-file state machine over two scans of the same repo (§4.12):
/// files only in `old` are `removed`; only in `new` are `added`; in both
/// with a changed hash are `changed`; in both with an equal hash are
/// omitted entirely. Hashes are recomputed fresh against `new`'s files
/// rather than trusted from scan time, since a scan may have been run with
/// `calculate_hash=false`.
pub fn compute_delta(old: &ScanResult, new: &ScanResult, run_id: &str, generated_at: &str) -> DeltaDocument {
    let old_by_path: BTreeMap<&str, &FileInfo> =
        old.files.iter().map(|f| (f.relative_path.as_str(), f)).collect();
    let new_by_path: BTreeMap<&str, &FileInfo> =
        new.files.iter().map(|f| (f.relative_path.as_str(), f)).collect();

    let mut all_paths: Vec<&str> = old_by_path.keys().chain(new_by_path.keys()).copied().collect();
    all_paths.sort_unstable();
    all_paths.dedup();

    let mut summary = DeltaSummary::default();
    let mut files = Vec::new();

    for path in all_paths {
        match (old_by_path.get(path), new_by_path.get(path)) {
            (Some(old_file), None) => {
                summary.removed += 1;
                files.push(file_entry(path, DeltaStatus::Removed, old_file.size_bytes, None, Sha256Status::Skipped));
            }
            (None, Some(new_file)) => {
                let hash = hash_file(&new.root.join(path));
                summary.added += 1;
                files.push(file_entry(
                    path,
                    DeltaStatus::Added,
                    new_file.size_bytes,
                    hash.sha256.clone(),
                    hash_to_status(&hash),
                ));
            }
            (Some(_), Some(new_file)) => {
                let new_hash = hash_file(&new.root.join(path));
                let old_hash = hash_file(&old.root.join(path));
                if new_hash.sha256.is_some() && new_hash.sha256 == old_hash.sha256 {
                    continue;
                }
                summary.changed += 1;
                files.push(file_entry(
                    path,
                    DeltaStatus::Changed,
                    new_file.size_bytes,
                    new_hash.sha256.clone(),
                    hash_to_status(&new_hash),
                ));
            }
            (None, None) => unreachable!("path drawn from union of old and new keys"),
        }
    }

    DeltaDocument {
        contract: schema_id::PR_SCHAU_DELTA_V1.to_string(),
        run_id: run_id.to_string(),
        generated_at: generated_at.to_string(),
        summary,
        files,
    }
}

fn hash_to_status(hash: &crate::hash::FileHash) -> Sha256Status {
    match hash.status {
        crate::hash::HashStatus::Ok => Sha256Status::Ok,
        crate::hash::HashStatus::Missing => Sha256Status::Missing,
        crate::hash::HashStatus::Permission => Sha256Status::Permission,
        crate::hash::HashStatus::IoError => Sha256Status::IoError,
    }
}

fn file_entry(path: &str, status: DeltaStatus, size_bytes: u64, sha256: Option<String>, sha256_status: Sha256Status) -> DeltaEntry {
    DeltaEntry { path: path.to_string(), status, size_bytes, sha256, sha256_status }
}

/// Renders `review.md`: a `summary` zone plus one zone per non-empty status
/// bucket (§4.12 "mandatory zones (`summary`, plus others)").
pub fn render_review_markdown(delta: &DeltaDocument) -> String {
    let mut out = String::new();
    out.push_str("# PR Review\n\n");

    let summary_body = format!(
        "added={}\nchanged={}\nremoved={}",
        delta.summary.added, delta.summary.changed, delta.summary.removed
    );
    render::push_zone(&mut out, "summary", "summary", &summary_body);

    for status in [DeltaStatus::Added, DeltaStatus::Changed, DeltaStatus::Removed] {
        let matching: Vec<&DeltaEntry> = delta.files.iter().filter(|f| f.status == status).collect();
        if matching.is_empty() {
            continue;
        }
        let zone_id = status_label(status);
        let body = matching.iter().map(|f| format!("- {}", f.path)).collect::<Vec<_>>().join("\n");
        render::push_zone(&mut out, zone_id, zone_id, &body);
    }

    out
}

fn status_label(status: DeltaStatus) -> &'static str {
    match status {
        DeltaStatus::Added => "added",
        DeltaStatus::Changed => "changed",
        DeltaStatus::Removed => "removed",
    }
}

/// Output of one full delta run: every path written, for the caller to
/// report back (§4.12 output layout).
pub struct DeltaRunOutput {
    pub run_dir: PathBuf,
    pub bundle_manifest_path: PathBuf,
    pub delta_path: PathBuf,
    pub review_path: PathBuf,
    pub document: DeltaDocument,
}

/// Computes and writes a full delta run under
/// `<hub>/.repolens/pr-schau/<repo>/<ts-utc>/{bundle.json,delta.json,review.md}`
/// (§4.12 output layout).
#[allow(clippy::too_many_arguments)]
pub fn run_delta(
    hub: &Path,
    repo: &str,
    old: &ScanResult,
    new: &ScanResult,
    run_id: &str,
    generated_at: &str,
    ts_utc: &str,
    config_sha256: &str,
) -> Result<DeltaRunOutput> {
    let run_dir = hub.join(".repolens").join("pr-schau").join(repo).join(ts_utc);
    std::fs::create_dir_all(&run_dir)?;

    let document = compute_delta(old, new, run_id, generated_at);
    let delta_bytes = serde_json::to_vec_pretty(&document)?;
    let delta_path = run_dir.join("delta.json");
    std::fs::write(&delta_path, &delta_bytes)?;

    let review_markdown = render_review_markdown(&document);
    let review_path = run_dir.join("review.md");
    std::fs::write(&review_path, review_markdown.as_bytes())?;

    let registry = ContractRegistry::default();
    let delta_entry = emit::entry_for_bytes(&delta_bytes, "delta.json", ArtifactRole::PrDeltaJson, &registry, true);

    let generator = Generator {
        name: registry.generator_name.to_string(),
        version: registry.generator_version.to_string(),
        platform: Some(std::env::consts::OS.to_string()),
        config_sha256: config_sha256.to_string(),
    };
    let links = ManifestLinks { canonical_dump_index_sha256: crate::hash::hash_bytes(&delta_bytes) };
    let capabilities = ManifestCapabilities { fts5_bm25: false };

    let (_manifest, manifest_bytes) = fixpoint::build_bundle_manifest(
        run_id,
        generated_at,
        generator,
        "bundle.json",
        vec![delta_entry],
        links,
        capabilities,
    )?;
    let bundle_manifest_path = run_dir.join("bundle.json");
    std::fs::write(&bundle_manifest_path, &manifest_bytes)?;

    Ok(DeltaRunOutput { run_dir, bundle_manifest_path, delta_path, review_path, document })
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
            sha256: None,
            category: BTreeSet::new(),
            extension: ".rs".to_string(),
            skip_reason: None,
            file_id: crate::domain::file_id(repo, path),
        }
    }

    #[test]
    fn classifies_added_changed_removed_and_omits_unchanged() {
        let old_dir = tempdir().unwrap();
        let new_dir = tempdir().unwrap();

        std::fs::write(old_dir.path().join("kept.rs"), "same").unwrap();
        std::fs::write(new_dir.path().join("kept.rs"), "same").unwrap();

        std::fs::write(old_dir.path().join("removed.rs"), "gone").unwrap();

        std::fs::write(old_dir.path().join("changed.rs"), "old body").unwrap();
        std::fs::write(new_dir.path().join("changed.rs"), "new body").unwrap();

        std::fs::write(new_dir.path().join("added.rs"), "fresh").unwrap();

        let old = ScanResult {
            repo: "repo".to_string(),
            root: old_dir.path().to_path_buf(),
            files: vec![file("repo", "kept.rs"), file("repo", "removed.rs"), file("repo", "changed.rs")],
        };
        let new = ScanResult {
            repo: "repo".to_string(),
            root: new_dir.path().to_path_buf(),
            files: vec![file("repo", "kept.rs"), file("repo", "changed.rs"), file("repo", "added.rs")],
        };

        let delta = compute_delta(&old, &new, "run-1", "2026-01-01T00:00:00Z");
        assert_eq!(delta.summary.added, 1);
        assert_eq!(delta.summary.changed, 1);
        assert_eq!(delta.summary.removed, 1);

        let paths: Vec<&str> = delta.files.iter().map(|f| f.path.as_str()).collect();
        assert!(!paths.contains(&"kept.rs"));
        assert!(paths.contains(&"added.rs"));
        assert!(paths.contains(&"changed.rs"));
        assert!(paths.contains(&"removed.rs"));

        let removed = delta.files.iter().find(|f| f.path == "removed.rs").unwrap();
        assert_eq!(removed.sha256, None);
        assert_eq!(removed.sha256_status, Sha256Status::Skipped);
    }

    #[test]
    fn review_markdown_has_symmetric_zones_for_populated_buckets() {
        let delta = DeltaDocument {
            contract: schema_id::PR_SCHAU_DELTA_V1.to_string(),
            run_id: "run-1".to_string(),
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            summary: DeltaSummary { added: 1, changed: 0, removed: 0 },
            files: vec![file_entry("new.rs", DeltaStatus::Added, 5, Some("a".repeat(64)), Sha256Status::Ok)],
        };
        let markdown = render_review_markdown(&delta);
        render::verify_zone_symmetry(&markdown).unwrap();
        assert!(markdown.contains("zone:begin type=summary"));
        assert!(markdown.contains("zone:begin type=added"));
        assert!(!markdown.contains("type=changed"));
    }

    #[test]
    fn run_delta_writes_manifest_delta_and_review_under_timestamped_dir() {
        let hub = tempdir().unwrap();
        let old_dir = tempdir().unwrap();
        let new_dir = tempdir().unwrap();
        std::fs::write(new_dir.path().join("a.rs"), "fn a() {}").unwrap();

        let old = ScanResult { repo: "repo".to_string(), root: old_dir.path().to_path_buf(), files: vec![] };
        let new =
            ScanResult { repo: "repo".to_string(), root: new_dir.path().to_path_buf(), files: vec![file("repo", "a.rs")] };

        let output = run_delta(
            hub.path(),
            "repo",
            &old,
            &new,
            "run-1",
            "2026-01-01T00:00:00Z",
            "2026-01-01T00-00-00Z",
            &"c".repeat(64),
        )
        .unwrap();

        assert!(output.bundle_manifest_path.exists());
        assert!(output.delta_path.exists());
        assert!(output.review_path.exists());
        assert_eq!(output.document.summary.added, 1);
        assert!(output.run_dir.ends_with("2026-01-01T00-00-00Z"));
    }
}
