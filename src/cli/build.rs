//! `repolens index build`: runs the scan -> chunk -> tag -> redact -> render
//! -> emit pipeline over one or more repositories and indexes the result
//! (§4.2-§4.8).

use crate::cli::EmitFormat;
use crate::config::{self, CliOverrides, OutputMode, Profile, RunConfig};
use crate::emit::{self, PipelineOutput};
use crate::index::{self, IndexSources};
use crate::redact;
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// A `label=path` repository to include; may be repeated
    #[arg(long = "repo", value_parser = parse_repo_spec, required = true)]
    repos: Vec<(String, PathBuf)>,

    /// Directory artifacts are written into
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Basename every artifact of this run shares
    #[arg(long, default_value = "repo")]
    base_name: String,

    /// Optional TOML configuration file; CLI flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Include dotfiles beyond the fixed whitelist
    #[arg(long)]
    include_hidden: bool,

    /// Redact secrets from source content before rendering/indexing
    #[arg(long)]
    redact_secrets: bool,

    /// `agent` (default, LLM-facing) or `human` reading profile
    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    /// `dual` (files + sqlite index, default) or `files-only`
    #[arg(long, value_enum)]
    output_mode: Option<OutputModeArg>,

    /// Split the canonical markdown into parts of at most this many bytes (0 disables)
    #[arg(long)]
    split_size_bytes: Option<u64>,

    /// Print per-category scan/redaction counters to stderr
    #[arg(long)]
    stats: bool,

    /// Output format for the run summary
    #[arg(long, value_enum, default_value = "text")]
    emit: EmitFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ProfileArg {
    Agent,
    Human,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputModeArg {
    Dual,
    FilesOnly,
}

fn parse_repo_spec(raw: &str) -> Result<(String, PathBuf), String> {
    let (label, path) = raw.split_once('=').ok_or_else(|| format!("expected `label=path`, got {raw:?}"))?;
    if label.is_empty() {
        return Err("repo label must not be empty".to_string());
    }
    Ok((label.to_string(), PathBuf::from(path)))
}

#[derive(Serialize)]
struct BuildSummary {
    run_id: String,
    files_scanned: usize,
    chunks_created: usize,
    artifacts_written: usize,
    fts5_bm25: bool,
    db_path: PathBuf,
}

pub fn run(args: BuildArgs) -> Result<()> {
    let base_config = match &args.config {
        Some(path) => config::load_config(path).with_context(|| format!("loading config from {}", path.display()))?,
        None => RunConfig::default(),
    };

    let overrides = CliOverrides {
        source_repos: Some(args.repos.iter().map(|(label, _)| label.clone()).collect()),
        output_dir: Some(args.output_dir.clone()),
        base_name: Some(args.base_name.clone()),
        profile: args.profile.map(|p| match p {
            ProfileArg::Agent => Profile::Agent,
            ProfileArg::Human => Profile::Human,
        }),
        output_mode: args.output_mode.map(|m| match m {
            OutputModeArg::Dual => OutputMode::Dual,
            OutputModeArg::FilesOnly => OutputMode::FilesOnly,
        }),
        include_hidden: Some(args.include_hidden),
        redact_secrets: Some(args.redact_secrets),
        split_size_bytes: args.split_size_bytes,
        ..CliOverrides::default()
    };
    let run_config = config::merge_cli_with_config(base_config, overrides);

    let run_id = uuid::Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();

    tracing::debug!(run_id, repos = args.repos.len(), "starting pipeline run");

    let output: PipelineOutput = emit::run_pipeline(&args.repos, &run_config, &run_id, &created_at)
        .context("running scan/chunk/emit pipeline")?;

    let mut artifacts_written = 5 + output.merge_md_paths.len().saturating_sub(1);
    let mut fts5_bm25 = false;
    let mut db_path = run_config.output_dir.join(format!("{}.index.sqlite", run_config.base_name));

    if matches!(run_config.output_mode, OutputMode::Dual) {
        let contents = build_contents_map(&output, &args.repos, &run_config);
        let sources = IndexSources {
            dump_index_path: output.dump_index_path.clone(),
            chunk_index_path: output.chunk_index_path.clone(),
        };
        let (stats, ingest) = index::build_index_from_chunk_jsonl(
            &db_path,
            &output.chunk_index_path,
            &output.files,
            &contents,
            &sources,
        )
        .context("building sqlite index")?;
        fts5_bm25 = stats.fts5_bm25;
        artifacts_written += 1;

        if args.stats {
            eprintln!(
                "files_indexed={} chunks_indexed={} ingest_invalid_json_lines={} ingest_missing_chunk_id_lines={}",
                stats.files_indexed, stats.chunks_indexed, ingest.invalid_json_lines, ingest.missing_chunk_id_lines
            );
        }
    } else {
        db_path = PathBuf::new();
    }

    if args.stats {
        eprintln!("files_scanned={} chunks_created={}", output.files.len(), output.chunks.len());
    }

    let summary = BuildSummary {
        run_id: output.run_id.clone(),
        files_scanned: output.files.len(),
        chunks_created: output.chunks.len(),
        artifacts_written,
        fts5_bm25,
        db_path,
    };

    match args.emit {
        EmitFormat::Json => println!("{}", serde_json::to_string(&summary)?),
        EmitFormat::Text => println!(
            "run {}: {} files scanned, {} chunks created, {} artifacts written (fts5_bm25={})",
            summary.run_id, summary.files_scanned, summary.chunks_created, summary.artifacts_written, summary.fts5_bm25
        ),
    }

    Ok(())
}

/// Reconstructs each chunk's indexable text by re-reading its owning file
/// and re-applying the same redaction the pipeline rendered with — `Chunk`
/// itself never carries raw bytes, only `content_sha256` (§3).
fn build_contents_map(
    output: &PipelineOutput,
    repos: &[(String, PathBuf)],
    config: &RunConfig,
) -> HashMap<String, String> {
    let roots: HashMap<&str, &PathBuf> = repos.iter().map(|(label, path)| (label.as_str(), path)).collect();
    let file_by_id: HashMap<&str, &crate::domain::FileInfo> =
        output.files.iter().map(|f| (f.file_id.as_str(), f)).collect();

    let mut file_contents: HashMap<String, String> = HashMap::new();
    let mut contents = HashMap::with_capacity(output.chunks.len());

    for chunk in &output.chunks {
        let Some(file) = file_by_id.get(chunk.file_id.as_str()) else { continue };
        let content = file_contents.entry(chunk.file_id.clone()).or_insert_with(|| {
            let Some(root) = roots.get(file.repo.as_str()) else { return String::new() };
            let raw = std::fs::read_to_string(root.join(&file.relative_path)).unwrap_or_default();
            if config.redact_secrets {
                redact::redact(&raw).0
            } else {
                raw
            }
        });

        if chunk.end_byte <= content.len() {
            contents.insert(chunk.chunk_id.clone(), content[chunk.start_byte..chunk.end_byte].to_string());
        }
    }

    contents
}
