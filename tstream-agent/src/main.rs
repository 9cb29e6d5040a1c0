//! tstream agent binary.

use anyhow::{Context, Result};
use clap::Parser;
use tstream_agent::{Agent, AgentArgs, AgentConfig};
use tstream_common::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = AgentArgs::parse();

    let config = AgentConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    init_tracing(&args.logging(&config.logging))?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting tstream agent");

    let agent = Agent::new(&config)?;

    if args.once {
        let delivered = agent.collect_once().await?;
        tracing::info!(consumers = delivered, "Single collection complete");
        return Ok(());
    }

    agent.run().await?;
    tracing::info!("Goodbye!");
    Ok(())
}
