//! calibrate - pixels-per-millimeter from two points a known distance apart

use anyhow::Result;
use clap::Parser;

use mill_beads::calibration::{parse_point, px_per_mm};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// First point as x,y in frame pixels.
    #[arg(long, allow_hyphen_values = true)]
    p1: String,
    /// Second point as x,y in frame pixels.
    #[arg(long, allow_hyphen_values = true)]
    p2: String,
    /// Real distance between the points in millimeters.
    #[arg(long)]
    known_mm: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let p1 = parse_point(&args.p1)?;
    let p2 = parse_point(&args.p2)?;
    let scale = px_per_mm(p1, p2, args.known_mm)?;
    log::info!("{:?} -> {:?} spans {} mm", p1, p2, args.known_mm);
    println!("px_per_mm = {scale:.4}");
    println!("{}", serde_json::json!({ "calibration": { "px_per_mm": scale } }));
    Ok(())
}
