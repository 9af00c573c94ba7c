//! `repolens query`: runs one query against a built index (§4.9).

use crate::cli::EmitFormat;
use crate::index::query::{query, QueryFilters};
use anyhow::{Context, Result};
use clap::Args;
use rusqlite::Connection;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Path to the `.index.sqlite` file to query
    db: PathBuf,

    /// Query text; empty runs metadata-only mode
    #[arg(default_value = "")]
    query: String,

    /// Maximum number of results
    #[arg(short, long, default_value_t = 10)]
    k: usize,

    /// Restrict to a layer (e.g. `core`, `test`, `docs`)
    #[arg(long)]
    layer: Option<String>,

    /// Restrict to a repository id
    #[arg(long)]
    repo: Option<String>,

    /// Case-insensitive substring match on path
    #[arg(long)]
    path: Option<String>,

    /// Match a file extension (with or without leading dot)
    #[arg(long)]
    ext: Option<String>,

    /// Restrict to an artifact type
    #[arg(long = "type")]
    artifact_type: Option<String>,

    /// Output format for the result
    #[arg(long, value_enum, default_value = "text")]
    emit: EmitFormat,
}

pub fn run(args: QueryArgs) -> Result<()> {
    let conn = Connection::open(&args.db).with_context(|| format!("opening index at {}", args.db.display()))?;

    let filters = QueryFilters {
        layer: args.layer,
        repo_id: args.repo,
        path: args.path,
        ext: args.ext,
        artifact_type: args.artifact_type,
    };

    let result = query(&conn, &args.query, args.k, &filters).context("running query")?;

    match args.emit {
        EmitFormat::Json => println!("{}", serde_json::to_string(&result)?),
        EmitFormat::Text => {
            println!("{} result(s) via {} ({})", result.count, result.engine, result.query_mode);
            for row in &result.results {
                println!("{:>8.3}  {}:{}  {}", row.score, row.path, row.range, row.chunk_id);
            }
        }
    }

    Ok(())
}
