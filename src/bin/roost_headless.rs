//! Headless roost run: loads an optional JSON config, drives the simulation
//! and prints the timing report as JSON.
//!
//! Usage: roost_headless [config.json] [agents] [ticks]

use anyhow::{Context, Result};
use roostswarm_core::utils::benchmark::{run_headless, BenchmarkSpec};
use roostswarm_core::{setup_logging, SimConfig};
use tracing::warn;

fn main() -> Result<()> {
    let level = std::env::var("RUST_LOG").ok();
    setup_logging(level.as_deref());

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) if path != "-" => SimConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        _ => {
            warn!("[Roost] No config file given, using defaults");
            SimConfig::default()
        }
    };

    let mut spec = BenchmarkSpec::default();
    if let Some(agents) = args.next() {
        spec.agents = agents
            .parse()
            .with_context(|| format!("invalid agent count {:?}", agents))?;
    }
    if let Some(ticks) = args.next() {
        spec.ticks = ticks
            .parse()
            .with_context(|| format!("invalid tick count {:?}", ticks))?;
    }

    let report = run_headless(config, &spec).context("headless run failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
