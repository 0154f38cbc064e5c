//! Echo service

use std::sync::Arc;

use async_trait::async_trait;

use tether_core::TunnelStream;

use crate::connection::TunnelConnection;
use crate::router::ServiceHandler;

/// Writes back every byte it reads until the device closes its side
pub struct EchoService;

#[async_trait]
impl ServiceHandler for EchoService {
    async fn serve(&self, connection: Arc<TunnelConnection>, stream: TunnelStream) {
        let from = stream.remote_addr();
        tracing::info!(
            "Echo connection from {} ({})",
            from,
            connection.principal()
        );

        let (mut reader, mut writer) = tokio::io::split(stream);
        match tokio::io::copy(&mut reader, &mut writer).await {
            Ok(bytes) => tracing::info!("Echo connection from {} closed after {} bytes", from, bytes),
            Err(e) => tracing::warn!("Echo connection from {} failed: {}", from, e),
        }
    }
}
