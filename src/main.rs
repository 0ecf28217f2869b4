//! Swift MVC launcher.
//!
//! Loads the application found under the working directory (or the given
//! config file), initializes it, starts it and serves until Ctrl+C.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swift_mvc::plugins::{DefaultHelperManager, FileLoggerManager, PluginRegistry};
use swift_mvc::Application;

#[derive(Parser)]
#[command(name = "swift")]
#[command(about = "Run a Swift MVC application", long_about = None)]
struct Cli {
    /// Application configuration file (default: app/config/config.{json,toml})
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration environment (default: $SWIFT_ENV, then development)
    #[arg(short, long)]
    env: Option<String>,

    /// Port to listen on, overriding configuration and $PORT
    #[arg(short, long)]
    port: Option<String>,

    /// Suppress startup progress output
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swift_mvc=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("swift v{} starting", env!("CARGO_PKG_VERSION"));

    let plugins = PluginRegistry::new()
        .with_logger_manager(FileLoggerManager::new())
        .with_helper_manager(DefaultHelperManager::new());

    let mut builder = Application::builder().plugins(plugins).quiet(cli.quiet);
    if let Some(config) = cli.config {
        builder = builder.config_path(config);
    }
    if let Some(env) = cli.env {
        builder = builder.env(env);
    }
    if cli.port.is_some() {
        builder = builder.port_override(cli.port);
    }
    let app = builder.build();

    app.init().await?;
    app.run().await?;

    shutdown_signal().await?;
    app.stop().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C, or SIGTERM where available.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutdown requested");
    Ok(())
}
