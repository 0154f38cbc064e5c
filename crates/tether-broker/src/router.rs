//! Service routing for device-initiated channels
//!
//! Devices reach broker-side services by opening `direct-tcpip` channels to
//! a destination port. The router maps that port to a handler; the handler
//! runs on its own task with the accepted stream.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::Instrument;

use tether_core::config::{ServiceConfig, ServiceKind};
use tether_core::error::{ConfigError, TunnelError};
use tether_core::TunnelStream;

use crate::connection::TunnelConnection;
use crate::services::EchoService;

/// A broker-side service devices can connect to
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Serve one accepted stream until either side is done
    async fn serve(&self, connection: Arc<TunnelConnection>, stream: TunnelStream);
}

/// Why a direct-connect request was not routed
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("No service exposed on port {0}")]
    NoSuchService(u32),

    #[error("Failed to accept channel: {0}")]
    Accept(#[from] TunnelError),
}

/// Port to handler table
#[derive(Default)]
pub struct ServiceRouter {
    services: HashMap<u32, Arc<dyn ServiceHandler>>,
}

impl ServiceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from configured built-in services
    pub fn from_config(services: &[ServiceConfig]) -> Result<Self, ConfigError> {
        let mut router = Self::new();
        for service in services {
            let handler: Arc<dyn ServiceHandler> = match service.kind {
                ServiceKind::Echo => Arc::new(EchoService),
            };
            router.expose(service.port, handler)?;
        }
        Ok(router)
    }

    /// Bind a handler to a port. Each port can be exposed once.
    pub fn expose(
        &mut self,
        port: u32,
        handler: Arc<dyn ServiceHandler>,
    ) -> Result<(), ConfigError> {
        if self.services.contains_key(&port) {
            return Err(ConfigError::DuplicateService(port));
        }
        self.services.insert(port, handler);
        Ok(())
    }

    /// Exposed ports, sorted
    pub fn ports(&self) -> Vec<u32> {
        let mut ports: Vec<u32> = self.services.keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    /// Route a direct-connect request for `port`.
    ///
    /// `accept` is only called once a handler is known to exist, so an
    /// unroutable request never has its channel accepted.
    pub fn route<F>(
        &self,
        port: u32,
        connection: Arc<TunnelConnection>,
        accept: F,
    ) -> Result<(), RouteError>
    where
        F: FnOnce() -> Result<TunnelStream, TunnelError>,
    {
        let handler = self
            .services
            .get(&port)
            .cloned()
            .ok_or(RouteError::NoSuchService(port))?;
        let stream = accept()?;

        tokio::spawn(
            async move { handler.serve(connection, stream).await }
                .instrument(tracing::Span::current()),
        );
        Ok(())
    }
}
