//! Outbound channels over a russh server connection

use async_trait::async_trait;
use russh::server::Handle;

use tether_core::error::TunnelError;
use tether_core::stream::BoxedStream;
use tether_core::traits::ChannelOpener;
use tether_protocol::names::CHANNEL_FORWARDED_TCPIP;
use tether_protocol::DirectConnect;

/// Opens `forwarded-tcpip` channels toward the peer of a server session
#[derive(Clone)]
pub struct SessionOpener {
    handle: Handle,
}

impl SessionOpener {
    /// Wrap the handle of an accepted session
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl ChannelOpener for SessionOpener {
    async fn open_forwarded(&self, request: &DirectConnect) -> Result<BoxedStream, TunnelError> {
        let channel = self
            .handle
            .channel_open_forwarded_tcpip(
                request.target_host.clone(),
                request.target_port,
                request.originator_host.clone(),
                request.originator_port,
            )
            .await
            .map_err(|e| {
                TunnelError::ChannelOpen(format!("{} {}: {}", CHANNEL_FORWARDED_TCPIP, request, e))
            })?;

        Ok(Box::new(channel.into_stream()))
    }
}
