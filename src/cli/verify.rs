//! `repolens verify`: checks a bundle manifest's claims against the bytes on
//! disk (§4.13).

use crate::cli::EmitFormat;
use crate::verify::{self, VerifyLevel};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Path to the bundle manifest to verify
    manifest: PathBuf,

    /// `basic` checks artifact presence; `full` re-derives hashes and scans content
    #[arg(long, value_enum, default_value = "basic")]
    level: LevelArg,

    /// Output format for the result
    #[arg(long, value_enum, default_value = "text")]
    emit: EmitFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LevelArg {
    Basic,
    Full,
}

pub fn run(args: VerifyArgs) -> Result<()> {
    let level = match args.level {
        LevelArg::Basic => VerifyLevel::Basic,
        LevelArg::Full => VerifyLevel::Full,
    };

    let report = verify::verify(&args.manifest, level).with_context(|| format!("verifying {}", args.manifest.display()))?;

    match args.emit {
        EmitFormat::Json => println!("{}", serde_json::to_string(&report)?),
        EmitFormat::Text => match &report.reason {
            Some(reason) => println!("{}: FAIL ({reason})", report.level),
            None => println!("{}: OK ({} artifacts checked)", report.level, report.checked_artifacts),
        },
    }

    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}
