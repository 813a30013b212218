use gateway_console::api::{AppState, ConsoleServer, PKG_NAME, VERSION};
use gateway_console::config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gateway_console=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("console.toml"));

    let config = Config::load_or_default(&config_path).map_err(|e| {
        error!(path = %config_path.display(), error = %e, "Failed to load configuration");
        e
    })?;

    print_startup_banner(&config);

    let state = Arc::new(AppState::from_config(&config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = ConsoleServer::bind(config.server.socket_addr()?, state, shutdown_rx).await?;
    info!(addr = %server.local_addr()?, "Console ready");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "Console API error");
        }
    });

    wait_for_shutdown().await?;

    let _ = shutdown_tx.send(true);

    if tokio::time::timeout(Duration::from_secs(5), server_handle).await.is_err() {
        warn!("Console API did not stop within 5s");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C, or SIGTERM on Unix
async fn wait_for_shutdown() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}

fn print_startup_banner(config: &Config) {
    info!(name = PKG_NAME, version = VERSION, "Starting gateway console");
    info!(
        bind = %config.server.bind,
        port = config.server.port,
        "Server configuration"
    );
    info!(
        connect_timeout_ms = config.probes.connect_timeout_ms,
        seed = config.store.seed,
        default_language = %config.i18n.default_language,
        "Console settings"
    );
}
