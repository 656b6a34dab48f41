use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use picrank::{
    cache, compression,
    config::{Config, LogFormat},
    repositories,
    services::{AlbumService, Backends, ServiceSettings},
    storage,
    web::{self, AppState},
};

#[derive(Parser)]
#[command(name = "picrank")]
#[command(version)]
#[command(about = "Rank images by pairwise votes")]
#[command(long_about = None)]
struct Cli {
    /// Directory holding config.toml
    #[arg(short, long, default_value = "./config")]
    config: PathBuf,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level (overrides config)
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("picrank={}", config.log.level).into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                    _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
                }
            }
            _ => {
                warn!("Failed to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down gracefully");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }
    init_logging(&config);

    info!("Starting picrank v{}", env!("CARGO_PKG_VERSION"));
    if let Some(domain) = &config.server.tls_domain {
        info!("TLS for {} is expected to terminate in front of the service", domain);
    }
    if config.server.h2c {
        info!("HTTP/2 cleartext is negotiated automatically");
    }

    let shutdown = CancellationToken::new();
    let (cache, sweeper) = cache::from_config(
        &config.cache,
        &config.middleware.limiter,
        shutdown.child_token(),
    );
    let backends = Backends {
        cache: cache.clone(),
        metadata: repositories::from_config(&config.database).await?,
        storage: storage::from_config(&config.storage).await?,
        compresser: compression::from_config(&config.compressor, None)?,
    };

    let service = Arc::new(
        AlbumService::builder(backends, ServiceSettings::from_config(&config)).build(),
    );
    service.start().await?;

    let addr: SocketAddr = config.bind_address().parse()?;
    let config = Arc::new(config);
    let router = web::create_router(AppState::new(service.clone(), cache, config.clone()));

    let mut server = tokio::spawn(web::serve(router, addr, shutdown.clone()));
    let stopped_early = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut server => Some(result),
    };
    shutdown.cancel();

    let outcome = match stopped_early {
        Some(result) => Ok(result),
        None => tokio::time::timeout(config.server.shutdown_timeout, server).await,
    };
    match outcome {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("Web server error: {}", e),
        Ok(Err(e)) => error!("Web server task failed: {}", e),
        Err(_) => warn!(
            "Web server did not stop within {:?}",
            config.server.shutdown_timeout
        ),
    }

    if let Err(e) = service.shutdown().await {
        error!("Worker pools did not stop cleanly: {}", e);
    }
    let _ = sweeper.await;

    info!("picrank stopped");
    Ok(())
}
