//! Command-line interface for repolens.
//!
//! Provides `index build`, `index verify`, `query`, `eval`, `range get`,
//! `verify`, and `delta` subcommands (§6).

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod build;
mod delta;
mod eval;
mod index;
mod query;
mod range;
mod verify;

/// Deterministic, content-addressed artifact pipeline and retrieval index
/// for repositories.
#[derive(Parser)]
#[command(name = "repolens")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or verify a local SQLite retrieval index
    Index(index::IndexArgs),

    /// Query a local SQLite index for task-relevant chunks
    Query(query::QueryArgs),

    /// Run gold queries against an index and report Recall@k
    Eval(eval::EvalArgs),

    /// Resolve a content-addressed byte range against a manifest
    Range(range::RangeArgs),

    /// Verify a bundle manifest against the bytes it describes
    Verify(verify::VerifyArgs),

    /// Compute a two-snapshot delta and emit a PR review bundle
    Delta(delta::DeltaArgs),
}

/// Output format shared by the query/eval/range/verify subcommands (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmitFormat {
    Text,
    Json,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG in the environment always takes precedence; --verbose falls back to DEBUG.
    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    match cli.command {
        Commands::Index(args) => index::run(args),
        Commands::Query(args) => query::run(args),
        Commands::Eval(args) => eval::run(args),
        Commands::Range(args) => range::run(args),
        Commands::Verify(args) => verify::run(args),
        Commands::Delta(args) => delta::run(args),
    }
}
