//! `repolens eval`: runs a gold-query markdown file through an index and
//! reports Recall@k (§4.10).

use crate::cli::EmitFormat;
use crate::eval::{parse_gold_queries, run_eval};
use anyhow::{Context, Result};
use clap::Args;
use rusqlite::Connection;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Path to the `.index.sqlite` file to evaluate against
    db: PathBuf,

    /// Path to the gold-query markdown file
    gold: PathBuf,

    /// Results considered per query
    #[arg(short, long, default_value_t = 10)]
    k: usize,

    /// Output format for the result
    #[arg(long, value_enum, default_value = "text")]
    emit: EmitFormat,
}

pub fn run(args: EvalArgs) -> Result<()> {
    let conn = Connection::open(&args.db).with_context(|| format!("opening index at {}", args.db.display()))?;
    let markdown = std::fs::read_to_string(&args.gold).with_context(|| format!("reading {}", args.gold.display()))?;
    let queries = parse_gold_queries(&markdown);

    let result = run_eval(&conn, &queries, args.k);

    match args.emit {
        EmitFormat::Json => println!("{}", serde_json::to_string(&result)?),
        EmitFormat::Text => {
            println!(
                "recall@{}: {:.1}% ({}/{})",
                args.k, result.metrics.recall_at_k, result.metrics.hits, result.metrics.total_queries
            );
            for detail in &result.details {
                let marker = if detail.is_relevant { "hit" } else { "miss" };
                println!("  [{marker}] {} ({} results)", detail.query, detail.hit_count);
            }
        }
    }

    Ok(())
}
