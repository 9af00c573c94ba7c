//! `repolens range get`: resolves a `RangeRef` against a manifest (§4.11).

use crate::cli::EmitFormat;
use crate::contracts::ArtifactRole;
use crate::domain::RangeRef;
use crate::range;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RangeArgs {
    #[command(subcommand)]
    command: RangeCommand,
}

#[derive(Subcommand, Debug)]
enum RangeCommand {
    /// Resolve one byte range and print its text
    Get(RangeGetArgs),
}

#[derive(Args, Debug)]
pub struct RangeGetArgs {
    /// Path to a bundle manifest or dump-index JSON file
    manifest: PathBuf,

    /// Artifact role to resolve (e.g. `canonical_md`, `architecture_summary`)
    #[arg(long)]
    role: String,

    /// Repository id the range belongs to
    #[arg(long)]
    repo_id: String,

    /// Expected on-disk path of the resolved artifact, if known
    #[arg(long)]
    file_path: Option<String>,

    #[arg(long)]
    start_byte: usize,

    #[arg(long)]
    end_byte: usize,

    #[arg(long)]
    start_line: usize,

    #[arg(long)]
    end_line: usize,

    /// Expected SHA-256 of the resolved byte range, if known
    #[arg(long)]
    content_sha256: Option<String>,

    /// Output format for the result
    #[arg(long, value_enum, default_value = "text")]
    emit: EmitFormat,
}

pub fn run(args: RangeArgs) -> Result<()> {
    match args.command {
        RangeCommand::Get(get_args) => run_get(get_args),
    }
}

fn run_get(args: RangeGetArgs) -> Result<()> {
    let role: ArtifactRole = serde_json::from_value(serde_json::Value::String(args.role.clone()))
        .with_context(|| format!("unknown artifact role {:?}", args.role))?;

    let reference = RangeRef {
        artifact_role: role,
        repo_id: args.repo_id,
        file_path: args.file_path,
        start_byte: args.start_byte,
        end_byte: args.end_byte,
        start_line: args.start_line,
        end_line: args.end_line,
        content_sha256: args.content_sha256,
    };

    let artifact_root = args.manifest.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| PathBuf::from("."));
    let resolved = range::resolve(&args.manifest, &artifact_root, &reference).context("resolving range")?;

    match args.emit {
        EmitFormat::Json => println!("{}", serde_json::to_string(&resolved)?),
        EmitFormat::Text => {
            println!("{}", resolved.text);
        }
    }

    Ok(())
}
