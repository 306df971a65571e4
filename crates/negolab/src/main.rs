use anyhow::{Context, Result};
use clap::Parser;
use negolab_models::NegolabConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "negolab", about = "Bilateral negotiation tournament runner")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/negolab.toml")]
    config: String,

    /// Print only the per-agent summary instead of the full report
    #[arg(long)]
    summary: bool,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: NegolabConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse config")?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal, finishing running sessions");
        shutdown.cancel();
    });

    let report = negolab::run(&config, cancel)
        .await
        .context("Tournament failed")?;

    let output = match (cli.summary, cli.pretty) {
        (true, true) => serde_json::to_string_pretty(&report.summaries)?,
        (true, false) => serde_json::to_string(&report.summaries)?,
        (false, true) => serde_json::to_string_pretty(&report)?,
        (false, false) => serde_json::to_string(&report)?,
    };
    println!("{output}");

    Ok(())
}
