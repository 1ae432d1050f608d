use clap::Parser;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sensor_bridge::config::{Config, ConfigLoader, LogFormat};
use sensor_bridge::context::AppContext;
use sensor_bridge::hub;

/// Command-line arguments. Anything set here wins over the config file and
/// environment overrides.
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Bridges a serial-attached sensor device to realtime WebSocket viewers."
)]
struct Args {
    /// Path to a configuration file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Port for the HTTP/WebSocket server
    #[arg(short, long)]
    port: Option<u16>,

    /// Serial device path (skips auto-discovery)
    #[arg(short, long)]
    serial: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?.into_config(),
        None => ConfigLoader::load()?.into_config(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(serial) = args.serial {
        config.serial.port = Some(serial);
    }

    init_tracing(&config);

    let ctx = AppContext::init(&config).await;
    let app = hub::router(ctx.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "sensor bridge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ctx.shutdown().await;
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, starting graceful shutdown");
}
