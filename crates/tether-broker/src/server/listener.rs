//! SSH server listener
//!
//! Accepts incoming connections and runs a handler for each on its own task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use russh::MethodSet;
use russh_keys::key::KeyPair;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::handler::ConnectionHandler;
use crate::state::BrokerState;

/// russh server settings for the broker
pub fn server_config(host_key: KeyPair, keepalive_interval: Duration) -> russh::server::Config {
    let mut config = russh::server::Config::default();
    config.keys.push(host_key);
    config.methods = MethodSet::PUBLICKEY;
    config.auth_rejection_time = Duration::from_secs(1);
    config.auth_rejection_time_initial = Some(Duration::from_secs(0));
    config.keepalive_interval = Some(keepalive_interval);
    config
}

/// Accepts device and operator connections
pub struct BrokerServer {
    ssh_config: Arc<russh::server::Config>,
    state: Arc<BrokerState>,
    /// Cancelled on shutdown
    cancel: CancellationToken,
}

impl BrokerServer {
    pub fn new(host_key: KeyPair, state: Arc<BrokerState>, cancel: CancellationToken) -> Self {
        let config = server_config(host_key, state.config.keepalive_interval);
        Self {
            ssh_config: Arc::new(config),
            state,
            cancel,
        }
    }

    /// Accept connections on `bind_addr` until cancelled
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;

        let local_addr = listener.local_addr()?;
        tracing::info!("Broker listening on {}", local_addr);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Broker shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                        Err(e) => tracing::error!("Failed to accept connection: {}", e),
                    }
                }
            }
        }

        Ok(())
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        tracing::info!("New connection from {}", peer_addr);

        let config = Arc::clone(&self.ssh_config);
        let handler = ConnectionHandler::new(Arc::clone(&self.state), peer_addr);
        let cancel = self.cancel.clone();
        let span = tracing::info_span!("conn", peer = %peer_addr);

        tokio::spawn(
            async move {
                let serve = async {
                    let session = russh::server::run_stream(config, socket, handler).await?;
                    session.await
                };

                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Connection handler cancelled");
                    }
                    result = serve => match result {
                        Ok(()) => tracing::debug!("Session ended"),
                        Err(e) => tracing::warn!("Session ended with error: {}", e),
                    }
                }
            }
            .instrument(span),
        );
    }
}
