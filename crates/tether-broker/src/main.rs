//! tether broker daemon
//!
//! Accepts reverse tunnels from devices and lets the operator reach them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_broker::auth::OperatorKeys;
use tether_broker::reverse::RusshConnector;
use tether_broker::server::{load_or_generate_host_key, BrokerServer};
use tether_broker::{BrokerState, NodeManager, ServiceRouter};
use tether_core::config::{self, BrokerConfig};

#[derive(Parser)]
#[command(name = "tether-broker")]
#[command(about = "tether reverse-tunnel broker")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Host key file (overrides config)
    #[arg(long)]
    host_key: Option<PathBuf>,

    /// Additional operator public key line; may be repeated
    #[arg(long = "operator-key")]
    operator_keys: Vec<String>,

    /// Additional operator authorized_keys file; may be repeated
    #[arg(long = "operator-keys-file")]
    operator_key_files: Vec<PathBuf>,

    /// Write a default configuration file and exit
    #[arg(long)]
    init: bool,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);

    if args.init {
        if config_path.exists() {
            anyhow::bail!("Config file {:?} already exists", config_path);
        }
        config::save_config(&config_path, &BrokerConfig::default())?;
        println!("Wrote default configuration to {:?}", config_path);
        return Ok(());
    }

    tracing::info!("tether broker starting...");

    let mut config: BrokerConfig = if config_path.exists() {
        config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else if args.config.is_some() {
        anyhow::bail!("Config file {:?} not found", config_path);
    } else {
        tracing::info!("Using default configuration");
        BrokerConfig::default()
    };

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(host_key) = args.host_key {
        config.host_key_path = host_key;
    }
    config.operator_public_keys.extend(args.operator_keys);
    config.operator_keys.extend(args.operator_key_files);
    config.validate()?;

    let host_key = load_or_generate_host_key(&config.host_key_path)?;
    let public = host_key
        .clone_public_key()
        .context("Failed to derive host public key")?;
    tracing::info!("Host key fingerprint: {}", public.fingerprint());

    let operator_keys = OperatorKeys::from_config(&config)?;
    if operator_keys.is_empty() {
        tracing::warn!("No operator keys configured - operator logins will be rejected");
    } else {
        tracing::info!("Loaded {} operator keys", operator_keys.len());
        for key in operator_keys.list() {
            tracing::info!(
                "Operator key {} ({})",
                key.fingerprint,
                key.comment.as_deref().unwrap_or("no comment")
            );
        }
    }

    let router = ServiceRouter::from_config(&config.services)?;
    tracing::info!("Exposed services on ports {:?}", router.ports());

    let connector = RusshConnector::new(&config.device)
        .context("Reverse sessions need the device login password")?;

    let bind_addr = config.bind_address.clone();
    let state = Arc::new(BrokerState::new(
        config,
        operator_keys,
        router,
        Arc::new(connector),
    ));

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let server = BrokerServer::new(host_key, Arc::clone(&state), cancel);
    server.run(&bind_addr).await?;

    tracing::info!(
        "Broker shutdown complete ({} devices were registered)",
        state.registry.count().await
    );
    Ok(())
}

async fn shutdown_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cancel.cancel();
}
