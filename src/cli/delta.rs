//! `repolens delta`: computes a two-snapshot diff between an old and new
//! repository root and emits a PR review bundle (§4.12).

use crate::cli::EmitFormat;
use crate::config::{self, RunConfig};
use crate::delta::run_delta;
use crate::scan;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct DeltaArgs {
    /// Directory review bundles are written under (`<hub>/.repolens/pr-schau/...`)
    #[arg(long)]
    hub: PathBuf,

    /// Repository label the delta is for
    #[arg(long)]
    repo: String,

    /// Root of the "before" snapshot
    old_root: PathBuf,

    /// Root of the "after" snapshot
    new_root: PathBuf,

    /// Optional TOML configuration file governing the scan
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format for the run summary
    #[arg(long, value_enum, default_value = "text")]
    emit: EmitFormat,
}

pub fn run(args: DeltaArgs) -> Result<()> {
    let run_config = match &args.config {
        Some(path) => config::load_config(path).with_context(|| format!("loading config from {}", path.display()))?,
        None => RunConfig::default(),
    };

    let old_scan = scan::scan(&args.repo, &args.old_root, &run_config)
        .with_context(|| format!("scanning {}", args.old_root.display()))?;
    let new_scan = scan::scan(&args.repo, &args.new_root, &run_config)
        .with_context(|| format!("scanning {}", args.new_root.display()))?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let generated_at = chrono::Utc::now().to_rfc3339();
    let ts_utc = generated_at.replace(':', "-");
    let config_sha256 = config::config_sha256(&run_config)?;

    let output = run_delta(&args.hub, &args.repo, &old_scan, &new_scan, &run_id, &generated_at, &ts_utc, &config_sha256)
        .context("computing delta")?;

    match args.emit {
        EmitFormat::Json => println!("{}", serde_json::to_string(&output.document)?),
        EmitFormat::Text => {
            println!(
                "delta for {}: +{} ~{} -{} -> {}",
                args.repo,
                output.document.summary.added,
                output.document.summary.changed,
                output.document.summary.removed,
                output.run_dir.display()
            );
        }
    }

    Ok(())
}
