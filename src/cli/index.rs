//! `repolens index`: dispatches to `build` (the pipeline run) and `verify`
//! (staleness check against the artifacts an index was built from) (§4.8).

use crate::cli::build::{self, BuildArgs};
use crate::cli::EmitFormat;
use crate::index;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct IndexArgs {
    #[command(subcommand)]
    command: IndexCommand,
}

#[derive(Subcommand, Debug)]
enum IndexCommand {
    /// Run the pipeline and build a fresh SQLite index
    Build(BuildArgs),

    /// Check a built index's freshness against its source artifacts
    Verify(IndexVerifyArgs),
}

#[derive(Args, Debug)]
pub struct IndexVerifyArgs {
    /// Path to the `.index.sqlite` file to check
    db: PathBuf,

    /// Output format for the result
    #[arg(long, value_enum, default_value = "text")]
    emit: EmitFormat,
}

#[derive(Serialize)]
struct IndexVerifyReport {
    fresh: bool,
    db: PathBuf,
}

pub fn run(args: IndexArgs) -> Result<()> {
    match args.command {
        IndexCommand::Build(build_args) => build::run(build_args),
        IndexCommand::Verify(verify_args) => run_verify(verify_args),
    }
}

fn run_verify(args: IndexVerifyArgs) -> Result<()> {
    let fresh = index::stale_check(&args.db).with_context(|| format!("verifying index at {}", args.db.display()))?;
    let report = IndexVerifyReport { fresh, db: args.db };

    match args.emit {
        EmitFormat::Json => println!("{}", serde_json::to_string(&report)?),
        EmitFormat::Text => println!("index at {} is {}", report.db.display(), if report.fresh { "fresh" } else { "stale" }),
    }

    if !fresh {
        std::process::exit(1);
    }
    Ok(())
}
