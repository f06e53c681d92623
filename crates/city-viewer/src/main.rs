//! Entry point for the city viewer.

use city_viewer::{app::App, config::Config, metrics::ViewerMetrics};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so ASCII frames own stdout.
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = Config::parse();
    tracing::info!(config = ?config, "Viewer starting with configuration");

    let metrics = Arc::new(ViewerMetrics::new()?);

    if let Some(addr) = &config.metrics_listen_addr {
        let metrics_addr: std::net::SocketAddr = addr.parse()?;
        let router = metrics.router();
        tokio::spawn(async move {
            let serve = async {
                let listener = tokio::net::TcpListener::bind(metrics_addr).await?;
                tracing::info!(addr = %metrics_addr, "Metrics server started");
                axum::serve(listener, router.into_make_service()).await?;
                Ok::<(), anyhow::Error>(())
            };
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "Metrics server task failed.");
            }
        });
    }

    // Phase one: grid size from a single blocking fetch. Failure ends here.
    let app = App::bootstrap(&config, metrics).await?;

    // Phase two: tick-driven polling and drawing.
    app.run(shutdown_signal()).await
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
