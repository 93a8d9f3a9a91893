//! UrbanEase Realtime Client
//!
//! Connects to an UrbanEase server's live update feed, keeps the dashboard
//! model current, and reconnects whenever the feed drops.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use urbanease_realtime::{
    standard_handlers, ChannelBuilder, ClientConfig, PageOrigin, SharedDashboard,
    WebSocketTransport,
};

/// Interval between dashboard summaries in the log
const SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

/// UrbanEase Realtime Client
///
/// Live update feed client for the UrbanEase dashboard
#[derive(Parser, Debug)]
#[command(name = "urbanease-realtime")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = urbanease_realtime::config::CONFIG_FILE)]
    config: PathBuf,

    /// Dashboard page origin, e.g. https://city.example.org
    #[arg(long)]
    origin: Option<String>,

    /// Subscriber identity (defaults to anonymous)
    #[arg(long)]
    user_id: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("UrbanEase realtime client v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::load(&args.config)?
        .with_origin(args.origin)
        .with_user_id(args.user_id);
    config.validate()?;

    info!(
        "Following {} as {}",
        config.origin,
        config.user_id.as_deref().unwrap_or("anonymous")
    );

    let dashboard = SharedDashboard::default();
    let handlers = standard_handlers(Arc::clone(&dashboard))?;

    let (handle, channel_task) = ChannelBuilder::new(PageOrigin::new(config.origin.clone()))
        .handlers(handlers)
        .policy(config.reconnect_policy())
        .subscriber(config.user_id.clone())
        .spawn(WebSocketTransport::new());

    handle.connect();

    // Periodic dashboard summary
    let summary_dashboard = Arc::clone(&dashboard);
    let summary_handle = handle.clone();
    let summary_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SUMMARY_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let summary = match summary_dashboard.lock() {
                Ok(mut board) => {
                    board.expire(std::time::Instant::now());
                    board.summary()
                }
                Err(_) => break,
            };
            info!(
                "Dashboard ({}): {} transport, {} traffic alerts, emergency: {}, {} notifications",
                summary_handle.state(),
                summary.transport_entries,
                summary.traffic_alerts,
                summary.emergency_active,
                summary.notifications
            );
        }
    });

    shutdown_signal().await;
    info!("Initiating graceful shutdown...");

    summary_task.abort();
    handle.shutdown();
    channel_task.await?;

    info!("Client shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
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
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
