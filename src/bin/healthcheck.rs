//! Container health probe: exits 0 when `/api/health/` answers 200

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "healthcheck")]
#[command(about = "Probe a running picrank instance")]
struct Cli {
    /// Base URL of the service
    #[arg(short, long, default_value = "http://localhost:8001")]
    url: String,

    /// Give up after this long
    #[arg(short, long, default_value = "5s", value_parser = humantime::parse_duration)]
    timeout: Duration,
}

async fn probe(cli: &Cli) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(cli.timeout)
        .build()
        .context("building HTTP client")?;
    let url = format!("{}/api/health/", cli.url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("requesting {url}"))?;
    if !response.status().is_success() {
        bail!("{} answered {}", url, response.status());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match probe(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("unhealthy: {e:#}");
            ExitCode::FAILURE
        }
    }
}
