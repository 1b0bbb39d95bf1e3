//! Replays a scripted session of tab and ad events through the Pageland
//! engine and prints every published event as one JSON line.

mod replay;
mod script;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use pageland_core::{AdsConfig, ManualClock};
use pageland_engine::{AdsContext, InMemoryCatalog, RecordingDepositSink};
use pageland_history::Database;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use replay::Replayer;
use script::Script;

#[derive(Parser, Debug)]
#[command(name = "pageland-replay")]
#[command(about = "Replay tab and ad events against the Pageland engine")]
struct Args {
    /// Path to the JSON replay script
    #[arg(long)]
    script: PathBuf,

    /// Path to a JSON ads config, defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the ads database, in memory when omitted
    #[arg(long)]
    db: Option<PathBuf>,

    /// How long to keep firing timers after the last step
    #[arg(long, default_value = "0")]
    drain_ms: u64,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays JSON
    tracing_log::LogTracer::init().context("Failed to set log tracer")?;
    let default_level = if args.verbose { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    let config = match &args.config {
        Some(path) => AdsConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AdsConfig::default(),
    };

    let script = Script::load(&args.script)?;
    info!(
        "Replaying {} steps with {} creatives",
        script.steps.len(),
        script.creatives.len()
    );

    let db = match &args.db {
        Some(path) => Database::open(path)?,
        None => Database::open_in_memory()?,
    };

    let clock = Arc::new(ManualClock::new(script.start.unwrap_or_else(Utc::now)));
    let deposits = Arc::new(RecordingDepositSink::new());
    let catalog: InMemoryCatalog = script.creatives.iter().cloned().collect();
    let ads = AdsContext::new(config, clock.clone(), db, Box::new(catalog), deposits.clone())?;

    let mut replayer = Replayer::new(ads, clock);
    let output = replayer.run(&script.steps, args.drain_ms)?;

    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();
    for line in &output {
        writeln!(stdout, "{}", serde_json::to_string(line)?)?;
    }
    for deposit in deposits.deposits() {
        writeln!(
            stdout,
            "{}",
            serde_json::json!({ "channel": "deposit", "deposit": deposit })
        )?;
    }

    info!(
        "Printed {} events and {} deposits",
        output.len(),
        deposits.deposits().len()
    );
    Ok(())
}
