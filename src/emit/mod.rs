//! Sidecar/Manifest Emitter (C7): sidecar JSON, chunk JSONL, dump-index,
//! bundle manifest, derived index, and architecture summary.
//!
//! This is the terminal stage of the scan -> chunk -> tag -> redact -> render
//! pipeline (§2 data flow); everything it writes is content-addressed and
//! tied together by the bundle manifest built in [`fixpoint`].

pub mod fixpoint;

use crate::chunk::{chunk_content, ChunkParams};
use crate::config::RunConfig;
use crate::contracts::{schema_id, ArtifactRole, ContractRegistry};
use crate::domain::{
    ArtifactEntry, ArtifactEntryFields, Chunk, ContractInfo, DumpIndex, DumpIndexEntry, FileInfo,
    Generator, ManifestCapabilities, ManifestLinks, ReadingPolicy, Sidecar, SidecarArtifacts,
    SidecarFileEntry, SidecarMeta,
};
use crate::error::Result;
use crate::hash::hash_bytes;
use crate::redact;
use crate::render::{self, RenderedFile};
use crate::scan::{self, ScanResult};
use crate::tag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// `<base>.derived_index.json` (§6 output layout): carries the same
/// `canonical_dump_sha256` the bundle manifest's `links` already records, as
/// its own addressable artifact for consumers that want only that one fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DerivedIndex {
    contract: String,
    run_id: String,
    canonical_dump_sha256: String,
}

const DERIVED_INDEX_CONTRACT: &str = "derived-index";

/// The paths every artifact of one pipeline run landed at, plus the two
/// structures (`dump_index`, `bundle_manifest`) callers most often need
/// in-memory rather than re-read from disk.
pub struct PipelineOutput {
    pub run_id: String,
    pub output_dir: PathBuf,
    pub merge_md_paths: Vec<PathBuf>,
    pub architecture_md_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub chunk_index_path: PathBuf,
    pub dump_index_path: PathBuf,
    pub derived_index_path: PathBuf,
    pub bundle_manifest_path: PathBuf,
    pub dump_index: DumpIndex,
    pub chunks: Vec<Chunk>,
    pub files: Vec<FileInfo>,
}

/// Runs the full scan -> chunk -> tag -> redact -> render -> emit pipeline
/// over every `(repo_label, root)` pair, writing artifacts under
/// `config.output_dir` named `config.base_name.*` (§6 output file layout).
pub fn run_pipeline(
    roots: &[(String, PathBuf)],
    config: &RunConfig,
    run_id: &str,
    created_at: &str,
) -> Result<PipelineOutput> {
    std::fs::create_dir_all(&config.output_dir)?;

    let registry = ContractRegistry::default();
    let config_sha256 = crate::config::config_sha256(config)?;

    let (all_files, all_chunks, rendered_sources) = scan_chunk_tag(roots, config)?;

    let base = &config.base_name;
    let out = config.output_dir.clone();

    let (merge_md_paths, md_parts_basenames, merged_markdown) =
        emit_markdown(&all_files, &all_chunks, &rendered_sources, config, run_id, &out, base)?;
    let primary_md_basename = md_parts_basenames[0].clone();

    let architecture_md = render_architecture_summary(&all_files, &all_chunks);
    let architecture_basename = format!("{base}_architecture.md");
    let architecture_md_path = out.join(&architecture_basename);
    std::fs::write(&architecture_md_path, architecture_md.as_bytes())?;

    let chunk_jsonl = build_chunk_jsonl(&all_chunks)?;
    let chunk_index_basename = format!("{base}.chunk_index.jsonl");
    let chunk_index_path = out.join(&chunk_index_basename);
    std::fs::write(&chunk_index_path, chunk_jsonl.as_bytes())?;

    let generator = Generator {
        name: registry.generator_name.to_string(),
        version: registry.generator_version.to_string(),
        platform: Some(std::env::consts::OS.to_string()),
        config_sha256,
    };

    let sidecar_bytes = build_sidecar_bytes(
        &all_files,
        &all_chunks,
        config,
        roots,
        &registry,
        &generator,
        &primary_md_basename,
        &architecture_basename,
        &chunk_index_basename,
        &md_parts_basenames,
    )?;
    let sidecar_basename = format!("{base}.json");
    let sidecar_path = out.join(&sidecar_basename);
    std::fs::write(&sidecar_path, &sidecar_bytes)?;

    let mut other_entries = vec![
        entry_for_bytes(merged_markdown.as_bytes(), &primary_md_basename, ArtifactRole::CanonicalMd, &registry, false),
        entry_for_bytes(architecture_md.as_bytes(), &architecture_basename, ArtifactRole::ArchitectureSummary, &registry, false),
        entry_for_bytes(chunk_jsonl.as_bytes(), &chunk_index_basename, ArtifactRole::ChunkIndexJsonl, &registry, false),
        entry_for_bytes(&sidecar_bytes, &sidecar_basename, ArtifactRole::IndexSidecarJson, &registry, true),
    ];

    let (dump_index, dump_index_bytes, dump_index_sha256) =
        build_dump_index(&other_entries, run_id);
    let dump_index_basename = format!("{base}.dump_index.json");
    let dump_index_path = out.join(&dump_index_basename);
    std::fs::write(&dump_index_path, &dump_index_bytes)?;
    other_entries.push(entry_for_bytes(&dump_index_bytes, &dump_index_basename, ArtifactRole::DumpIndexJson, &registry, true));

    let derived = DerivedIndex {
        contract: DERIVED_INDEX_CONTRACT.to_string(),
        run_id: run_id.to_string(),
        canonical_dump_sha256: dump_index_sha256.clone(),
    };
    let derived_bytes = serde_json::to_vec_pretty(&derived)?;
    let derived_basename = format!("{base}.derived_index.json");
    let derived_index_path = out.join(&derived_basename);
    std::fs::write(&derived_index_path, &derived_bytes)?;
    other_entries.push(entry_for_bytes(&derived_bytes, &derived_basename, ArtifactRole::DerivedManifestJson, &registry, true));

    let bundle_basename = format!("{base}.bundle.manifest.json");
    let links = ManifestLinks { canonical_dump_index_sha256: dump_index_sha256 };
    let capabilities =
        ManifestCapabilities { fts5_bm25: matches!(config.output_mode, crate::config::OutputMode::Dual) };
    let (_manifest, manifest_bytes) = fixpoint::build_bundle_manifest(
        run_id,
        created_at,
        generator,
        &bundle_basename,
        other_entries,
        links,
        capabilities,
    )?;
    let bundle_manifest_path = out.join(&bundle_basename);
    std::fs::write(&bundle_manifest_path, &manifest_bytes)?;

    Ok(PipelineOutput {
        run_id: run_id.to_string(),
        output_dir: out,
        merge_md_paths,
        architecture_md_path,
        sidecar_path,
        chunk_index_path,
        dump_index_path,
        derived_index_path,
        bundle_manifest_path,
        dump_index,
        chunks: all_chunks,
        files: all_files,
    })
}

type ScanChunkTagResult = (Vec<FileInfo>, Vec<Chunk>, Vec<(FileInfo, String)>);

fn scan_chunk_tag(roots: &[(String, PathBuf)], config: &RunConfig) -> Result<ScanChunkTagResult> {
    let mut all_files: Vec<FileInfo> = Vec::new();
    let mut all_chunks: Vec<Chunk> = Vec::new();
    let mut rendered_sources: Vec<(FileInfo, String)> = Vec::new();

    for (repo, root) in roots {
        let scan_result: ScanResult = scan::scan(repo, root, config)?;
        for file in scan_result.files {
            if file.skip_reason.is_some() || !file.is_text {
                all_files.push(file);
                continue;
            }

            let raw = std::fs::read_to_string(&file.path).unwrap_or_default();
            let content = if config.redact_secrets { redact::redact(&raw).0 } else { raw };

            let file_name = file.relative_path.rsplit('/').next().unwrap_or(&file.relative_path);
            let language = scan::classify::detect_language(&file.extension, file_name);
            let mut chunks = chunk_content(
                &file.file_id,
                &content,
                0,
                &file.relative_path,
                &language,
                ChunkParams {
                    min_size: config.min_chunk_bytes,
                    max_size: config.max_chunk_bytes,
                    min_lines: config.min_chunk_lines,
                    max_lines: config.max_chunk_lines,
                },
            );

            let layer = tag::layer_for(&file.relative_path).to_string();
            let section = tag::section_for(&file.relative_path);
            let artifact_type = tag::artifact_type_for(&file.extension).to_string();
            let concepts = tag::concepts_for(&content);
            for chunk in &mut chunks {
                chunk.layer = layer.clone();
                chunk.section = section.clone();
                chunk.artifact_type = artifact_type.clone();
                chunk.concepts = concepts.clone();
            }

            all_chunks.extend(chunks);
            rendered_sources.push((file.clone(), content));
            all_files.push(file);
        }
    }

    all_files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    all_chunks.sort_by(|a, b| (a.path.as_str(), a.start_byte).cmp(&(b.path.as_str(), b.start_byte)));
    rendered_sources.sort_by(|a, b| a.0.relative_path.cmp(&b.0.relative_path));

    Ok((all_files, all_chunks, rendered_sources))
}

#[allow(clippy::too_many_arguments)]
fn emit_markdown(
    all_files: &[FileInfo],
    all_chunks: &[Chunk],
    rendered_sources: &[(FileInfo, String)],
    config: &RunConfig,
    run_id: &str,
    out: &std::path::Path,
    base: &str,
) -> Result<(Vec<PathBuf>, Vec<String>, String)> {
    let reading_policy_comment = format!("<!-- READING_POLICY canonical={base}_merge.md -->");
    let meta_zone = format!("files={}\nchunks={}", all_files.len(), all_chunks.len());
    let structure_zone = render_structure_zone(all_files);
    let index_zone = render_index_zone(all_chunks);
    let manifest_zone = format!("run_id={run_id}");

    let rendered_files: Vec<RenderedFile<'_>> =
        rendered_sources.iter().map(|(info, content)| RenderedFile { info, content }).collect();
    let merged_markdown = render::render_merged_markdown(
        &reading_policy_comment,
        &meta_zone,
        &structure_zone,
        &index_zone,
        &manifest_zone,
        &rendered_files,
    );
    render::verify_zone_symmetry(&merged_markdown)
        .map_err(crate::error::RepolensError::ZoneAsymmetry)?;

    let parts = render::split_into_parts(&merged_markdown, config.split_size_bytes);
    let mut merge_md_paths = Vec::new();
    let mut md_parts_basenames = Vec::new();
    if parts.len() == 1 {
        let basename = format!("{base}_merge.md");
        let path = out.join(&basename);
        std::fs::write(&path, parts[0].as_bytes())?;
        merge_md_paths.push(path);
        md_parts_basenames.push(basename);
    } else {
        for (i, part) in parts.iter().enumerate() {
            let basename = format!("{base}_merge_part{:02}.md", i + 1);
            let path = out.join(&basename);
            std::fs::write(&path, part.as_bytes())?;
            merge_md_paths.push(path);
            md_parts_basenames.push(basename);
        }
    }

    Ok((merge_md_paths, md_parts_basenames, merged_markdown))
}

fn render_structure_zone(files: &[FileInfo]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for file in files {
        for category in &file.category {
            *counts.entry(category.as_str()).or_insert(0) += 1;
        }
    }
    let mut lines: Vec<String> = counts.into_iter().map(|(cat, n)| format!("{cat}: {n}")).collect();
    lines.sort();
    lines.join("\n")
}

fn render_index_zone(chunks: &[Chunk]) -> String {
    let mut lines = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        lines.push(format!("{} {} {}-{}", chunk.chunk_id, chunk.path, chunk.start_line, chunk.end_line));
    }
    lines.join("\n")
}

fn render_architecture_summary(files: &[FileInfo], chunks: &[Chunk]) -> String {
    let mut by_layer: BTreeMap<&str, usize> = BTreeMap::new();
    for chunk in chunks {
        *by_layer.entry(chunk.layer.as_str()).or_insert(0) += 1;
    }
    let mut lens_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for file in files {
        *lens_counts.entry(crate::lens::lens_for(&file.relative_path)).or_insert(0) += 1;
    }

    let mut out = String::new();
    out.push_str("# Architecture Summary\n\n");
    out.push_str(&format!("Total files: {}\nTotal chunks: {}\n\n", files.len(), chunks.len()));
    out.push_str("## Chunks by layer\n\n");
    for (layer, count) in &by_layer {
        out.push_str(&format!("- {layer}: {count}\n"));
    }
    out.push_str("\n## Files by lens\n\n");
    for (lens, count) in &lens_counts {
        out.push_str(&format!("- {lens}: {count}\n"));
    }
    out
}

/// One chunk per line (§4.7); legacy aliases ride alongside canonical fields
/// so older consumers keep working without a schema bump.
fn build_chunk_jsonl(chunks: &[Chunk]) -> Result<String> {
    let mut out = String::new();
    for chunk in chunks {
        let mut value = serde_json::to_value(chunk)?;
        if let serde_json::Value::Object(map) = &mut value {
            map.insert("byte_offset_start".to_string(), serde_json::json!(chunk.start_byte));
            map.insert("line_start".to_string(), serde_json::json!(chunk.start_line));
            map.insert("content_sha256".to_string(), serde_json::json!(chunk.content_sha256));
        }
        out.push_str(&serde_json::to_string(&value)?);
        out.push('\n');
    }
    Ok(out)
}

fn estimate_tokens(size_bytes: u64) -> usize {
    ((size_bytes as f64) / 4.0).ceil() as usize
}

#[allow(clippy::too_many_arguments)]
fn build_sidecar_bytes(
    all_files: &[FileInfo],
    all_chunks: &[Chunk],
    config: &RunConfig,
    roots: &[(String, PathBuf)],
    registry: &ContractRegistry,
    generator: &Generator,
    primary_md_basename: &str,
    architecture_basename: &str,
    chunk_index_basename: &str,
    md_parts_basenames: &[String],
) -> Result<Vec<u8>> {
    let mut schema_ids = BTreeMap::new();
    for role in ArtifactRole::CANONICAL_ORDER {
        schema_ids.insert(role.dump_index_alias().to_string(), registry.schema_id_for(role).to_string());
    }

    let sidecar_files: Vec<SidecarFileEntry> = all_files
        .iter()
        .filter(|f| f.skip_reason.is_none())
        .map(|f| SidecarFileEntry {
            id: f.file_id.clone(),
            path: f.relative_path.clone(),
            sha256: f.sha256.clone().unwrap_or_default(),
            size_bytes: f.size_bytes,
            language: {
                let file_name = f.relative_path.rsplit('/').next().unwrap_or(&f.relative_path);
                scan::classify::detect_language(&f.extension, file_name)
            },
            estimated_tokens: estimate_tokens(f.size_bytes),
            top_level_symbols: all_chunks
                .iter()
                .filter(|c| c.path == f.relative_path)
                .flat_map(|c| c.concepts.clone())
                .collect(),
        })
        .collect();

    let sidecar = Sidecar {
        meta: SidecarMeta {
            contract: "repolens-agent".to_string(),
            contract_version: "v2".to_string(),
            profile: profile_str(config).to_string(),
            total_files: sidecar_files.len(),
            features: vec!["semantic_chunk_fields".to_string(), "architecture_summary".to_string()],
            generator: generator.clone(),
            chunk_index_contract: Some(registry.schema_id_for(ArtifactRole::ChunkIndexJsonl).to_string()),
            dump_index_contract: schema_id::DUMP_INDEX_V1.to_string(),
            schema_ids,
            reading_policy: ReadingPolicy {
                canonical_content_artifact: primary_md_basename.to_string(),
                navigation_artifacts: vec![architecture_basename.to_string(), chunk_index_basename.to_string()],
            },
            output_mode: output_mode_str(config).to_string(),
            include_hidden: config.include_hidden,
            redact_secrets: config.redact_secrets,
            split_size_bytes: config.split_size_bytes,
            max_bytes: config.max_bytes,
            source_repos: roots.iter().map(|(r, _)| r.clone()).collect(),
        },
        files: sidecar_files,
        artifacts: SidecarArtifacts {
            chunk_index_basename: chunk_index_basename.to_string(),
            md_parts_basenames: md_parts_basenames.to_vec(),
        },
    };

    Ok(serde_json::to_vec_pretty(&sidecar)?)
}

fn profile_str(config: &RunConfig) -> &'static str {
    match config.profile {
        crate::config::Profile::Agent => "agent",
        crate::config::Profile::Human => "human",
    }
}

fn output_mode_str(config: &RunConfig) -> &'static str {
    match config.output_mode {
        crate::config::OutputMode::FilesOnly => "files_only",
        crate::config::OutputMode::Dual => "dual",
    }
}

pub(crate) fn entry_for_bytes(
    bytes: &[u8],
    basename: &str,
    role: ArtifactRole,
    registry: &ContractRegistry,
    with_contract: bool,
) -> ArtifactEntry {
    let fields = ArtifactEntryFields {
        role,
        path: basename.to_string(),
        content_type: role.content_type().to_string(),
        bytes: bytes.len() as u64,
        sha256: hash_bytes(bytes),
    };
    if with_contract {
        ArtifactEntry::Contract {
            fields,
            contract: ContractInfo { schema_id: registry.schema_id_for(role).to_string() },
        }
    } else {
        ArtifactEntry::RoleOnly(fields)
    }
}

/// Builds the `dump-index` document from the artifact entries emitted so
/// far, returning its bytes and content hash (§4.7: validated `len=64`, pure
/// hex, never `"ERROR"` — it is a real `hash_bytes` output by construction).
fn build_dump_index(entries: &[ArtifactEntry], run_id: &str) -> (DumpIndex, Vec<u8>, String) {
    let mut artifacts = BTreeMap::new();
    for entry in entries {
        let fields = entry.fields();
        artifacts.insert(
            fields.role.dump_index_alias().to_string(),
            DumpIndexEntry {
                path: fields.path.clone(),
                sha256: fields.sha256.clone(),
                bytes: fields.bytes,
                content_type: fields.content_type.clone(),
                role: fields.role,
            },
        );
    }
    let dump_index = DumpIndex { contract: DumpIndex::CONTRACT.to_string(), run_id: run_id.to_string(), artifacts };
    let bytes = serde_json::to_vec_pretty(&dump_index).expect("dump index always serializes");
    let sha256 = hash_bytes(&bytes);
    (dump_index, bytes, sha256)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &std::path::Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn pipeline_produces_a_self_consistent_bundle() {
        let src = tempdir().unwrap();
        write(src.path(), "src/main.rs", "fn main() {\n    println!(\"hi\");\n}\n");
        write(src.path(), "README.md", "# hello\n");

        let out_dir = tempdir().unwrap();
        let config = RunConfig {
            source_repos: vec!["repo".to_string()],
            output_dir: out_dir.path().to_path_buf(),
            base_name: "repo".to_string(),
            ..RunConfig::default()
        };

        let output = run_pipeline(
            &[("repo".to_string(), src.path().to_path_buf())],
            &config,
            "run-1",
            "2026-01-01T00:00:00Z",
        )
        .unwrap();

        assert!(output.bundle_manifest_path.exists());
        assert!(output.sidecar_path.exists());
        assert!(output.chunk_index_path.exists());
        assert!(!output.chunks.is_empty());

        let manifest_bytes = fs::read(&output.bundle_manifest_path).unwrap();
        let manifest: crate::domain::BundleManifest = serde_json::from_slice(&manifest_bytes).unwrap();
        for entry in &manifest.artifacts {
            let fields = entry.fields();
            let path = output.output_dir.join(&fields.path);
            let on_disk = fs::read(&path).unwrap();
            assert_eq!(on_disk.len() as u64, fields.bytes, "byte length mismatch for {}", fields.path);
            // The bundle manifest's own self-entry cannot carry the true
            // content hash of the bytes it is embedded in (that would be a
            // SHA-256 pre-image of the document over itself); every other
            // artifact's recorded hash must match its bytes on disk.
            if fields.role != crate::contracts::ArtifactRole::BundleManifestJson {
                assert_eq!(hash_bytes(&on_disk), fields.sha256, "hash mismatch for {}", fields.path);
            }
        }
    }

    #[test]
    fn chunk_jsonl_carries_legacy_aliases() {
        let src = tempdir().unwrap();
        write(src.path(), "a.rs", "fn a() {}\n");
        let out_dir = tempdir().unwrap();
        let config = RunConfig {
            output_dir: out_dir.path().to_path_buf(),
            base_name: "repo".to_string(),
            ..RunConfig::default()
        };

        let output = run_pipeline(
            &[("repo".to_string(), src.path().to_path_buf())],
            &config,
            "run-1",
            "2026-01-01T00:00:00Z",
        )
        .unwrap();

        let jsonl = fs::read_to_string(&output.chunk_index_path).unwrap();
        let first_line = jsonl.lines().next().unwrap();
        let value: serde_json::Value = serde_json::from_str(first_line).unwrap();
        assert!(value.get("byte_offset_start").is_some());
        assert!(value.get("line_start").is_some());
        assert!(value.get("start_byte").is_some());
    }

    #[test]
    fn derived_index_hash_matches_dump_index_bytes() {
        let src = tempdir().unwrap();
        write(src.path(), "a.rs", "fn a() {}\n");
        let out_dir = tempdir().unwrap();
        let config = RunConfig {
            output_dir: out_dir.path().to_path_buf(),
            base_name: "repo".to_string(),
            ..RunConfig::default()
        };

        let output = run_pipeline(
            &[("repo".to_string(), src.path().to_path_buf())],
            &config,
            "run-1",
            "2026-01-01T00:00:00Z",
        )
        .unwrap();

        let derived_bytes = fs::read(&output.derived_index_path).unwrap();
        let derived: DerivedIndex = serde_json::from_slice(&derived_bytes).unwrap();
        let dump_bytes = fs::read(&output.dump_index_path).unwrap();
        assert_eq!(derived.canonical_dump_sha256, hash_bytes(&dump_bytes));
    }
}
