use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::{LoggingConfig, TollgateConfig};
use tollgate::http::HttpServer;
use tollgate::ratelimit::ClientRateLimiter;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(about = "HTTP API fronted by a per-client token bucket limiter")]
#[command(version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the configured address' port
    #[arg(short, long)]
    port: Option<u16>,

    /// Environment name (development|staging|production)
    #[arg(short, long)]
    env: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TollgateConfig::load(args.config.as_deref())?;
    apply_args(&mut config, &args);

    // Loading stays silent; everything from here on reaches the subscriber.
    init_tracing(&config.logging);

    info!("Starting Tollgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!(path = %path.display(), "Loaded configuration file");
    }
    info!(
        addr = %config.server.addr,
        env = %config.server.env,
        "Configuration loaded"
    );

    // The limiter section is validated by ClientRateLimiter::start.
    config.server.validate()?;
    let limiter = Arc::new(ClientRateLimiter::start(&config.limiter)?);

    let server = HttpServer::new(&config.server, limiter);
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Tollgate stopped");
    Ok(())
}

/// Command-line flags take precedence over file and environment settings.
fn apply_args(config: &mut TollgateConfig, args: &Args) {
    if let Some(port) = args.port {
        config.server.addr.set_port(port);
    }
    if let Some(env) = &args.env {
        config.server.env = env.clone();
    }
    if args.log_json {
        config.logging.json = true;
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
