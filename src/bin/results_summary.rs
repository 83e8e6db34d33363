//! results_summary - inspect a detection log

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;

use mill_beads::{JsonlResultStore, ResultStore};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Result log path (JSON lines).
    #[arg(long, default_value = "detections.jsonl")]
    input: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    if !args.input.exists() {
        anyhow::bail!("result log {} does not exist", args.input.display());
    }
    let store = JsonlResultStore::open(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let mut per_class: BTreeMap<i32, usize> = BTreeMap::new();
    let mut beads = 0usize;
    for record in store.iter() {
        beads += record.detections.len();
        for detection in &record.detections {
            *per_class.entry(detection.class).or_default() += 1;
        }
    }

    println!("log:             {}", args.input.display());
    println!("frames:          {}", store.len());
    println!("contiguous from 0: {}", store.contiguous_prefix_len());
    println!("beads:           {}", beads);
    println!("malformed lines: {}", store.malformed_lines());
    for (class, count) in &per_class {
        println!("  class {class:>4}: {count}");
    }
    Ok(())
}
