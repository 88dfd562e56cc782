//! Pubgate - Main Entry Point
//!
//! CLI wrapper around the gateway library: loads configuration, wires the
//! reconnection supervisor to the HTTP surface, and owns the shutdown order.

use clap::{Parser, Subcommand};
use pubgate::broker::mqtt::MqttConnector;
use pubgate::broker::{ConnectionHolder, Reconnector};
use pubgate::config::Config;
use pubgate::gateway::PublishGateway;
use pubgate::http::ApiServer;
use pubgate::observability::init_default_logging;
use pubgate::shutdown::ShutdownDrain;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// HTTP to MQTT publish gateway
#[derive(Parser)]
#[command(name = "pubgate")]
#[command(about = "HTTP to MQTT publish gateway")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the HTTP listener port
    #[arg(short, long, env = "PUBGATE_HTTP_PORT")]
    port: Option<u16>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // -v maps to debug, -vv to trace, unless the environment already chose
    if cli.verbose > 0 && std::env::var("LOG_LEVEL").is_err() {
        let level = if cli.verbose > 1 { "trace" } else { "debug" };
        std::env::set_var("LOG_LEVEL", level);
    }
    init_default_logging();

    info!("Starting pubgate v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match load_configuration(&cli.config).await {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Some(port) = cli.port {
        config.http.port = port;
    }

    let result = match cli.command {
        Commands::Run => run_gateway(config).await,
        Commands::Config { show } => handle_config_command(config, show).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

async fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<Config, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(Config::load_from_file(path)?)
        }
        None => {
            // Try default locations
            let default_paths = ["pubgate.toml", "config/pubgate.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(Config::load_from_file(&path)?);
                }
            }

            info!("No configuration file found, using built-in defaults");
            Ok(Config::default())
        }
    }
}

async fn run_gateway(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(broker_url = %config.broker.url, "Gateway starting");

    let address = config.http.socket_addr()?;

    let holder = Arc::new(ConnectionHolder::new());
    let connector = Arc::new(MqttConnector::new(
        config.broker.url.clone(),
        config.broker.connect_timeout(),
    ));
    let gateway = Arc::new(PublishGateway::new(
        holder.clone(),
        config.broker.default_subject.clone(),
    ));

    let mut reconnector =
        Reconnector::new(holder.clone(), connector, config.broker.retry_interval());
    reconnector.start(config.broker.reconnect_policy).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = ApiServer::new(gateway, address);
    let mut server_task = tokio::spawn(async move { server.start(shutdown_rx).await });

    // Set up signal handling for graceful shutdown
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!(%address, "Gateway is running and accepting publish requests");

    // Listener failures propagate to the exit code, but only after the
    // shutdown sequence below has run
    let mut server_failure: Option<Box<dyn std::error::Error>> = None;

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => warn!("HTTP listener stopped unexpectedly"),
                Ok(Err(e)) => {
                    error!("HTTP listener failed: {}", e);
                    server_failure = Some(e.into());
                }
                Err(e) => {
                    error!("HTTP listener task panicked: {}", e);
                    server_failure = Some(e.into());
                }
            }
        }
    }

    // Shutdown order: stop accepting requests, stop reconnecting, then
    // drain whatever connection is still held.
    info!("Application shutdown initiated");
    let _ = shutdown_tx.send(true);

    if !server_task.is_finished() {
        match tokio::time::timeout(Duration::from_secs(5), &mut server_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!("HTTP listener failed during shutdown: {}", e),
            Ok(Err(e)) => error!("HTTP listener task panicked: {}", e),
            Err(_) => {
                warn!("HTTP listener did not stop in time, aborting");
                server_task.abort();
            }
        }
    }

    reconnector.stop().await;

    let drain = ShutdownDrain::new(holder, config.broker.drain_timeout());
    drain.run().await;

    match server_failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn handle_config_command(
    config: Config,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
