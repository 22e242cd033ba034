mod harness;
mod trace;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use trace::Trace;
use upqueue_queue::QueueConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,upqueue=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: upqueue-replay <trace.json>")?;

    let config = QueueConfig::load().unwrap_or_default();
    let trace = Trace::load(&path)?;
    tracing::info!(
        queue = %trace.queue,
        steps = trace.steps.len(),
        refresh_delay_ms = config.refresh_delay_ms,
        "replaying trace"
    );

    let summary = harness::run(&trace, config)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
