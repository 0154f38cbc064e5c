//! Tunnel traits

use async_trait::async_trait;
use std::net::SocketAddr;

use tether_protocol::DirectConnect;

use crate::error::TunnelError;
use crate::stream::{BoxedStream, TunnelStream};

/// Opens channels back across an accepted connection
#[async_trait]
pub trait ChannelOpener: Send + Sync {
    /// Ask the peer to connect to `request.target_*` on its side and carry
    /// the resulting byte stream back over a new channel.
    async fn open_forwarded(&self, request: &DirectConnect) -> Result<BoxedStream, TunnelError>;
}

/// Reaches services on the far side of a device's tunnel
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Address the device connected from
    fn remote_addr(&self) -> SocketAddr;

    /// Open a byte stream to `host:port` as seen from the device
    async fn dial(&self, host: &str, port: u32) -> Result<TunnelStream, TunnelError>;

    /// `host:port` keys of the forwards the device currently holds, sorted
    async fn forwarded_addresses(&self) -> Vec<String>;
}
