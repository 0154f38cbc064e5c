//! Reverse session traits

use async_trait::async_trait;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use tether_protocol::PtyRequest;

use crate::error::SessionError;
use crate::stream::TunnelStream;

/// Operator-side streams a remote session is bound to
pub struct SessionIo<'a> {
    /// Operator input
    pub stdin: &'a mut (dyn AsyncRead + Send + Unpin),
    /// Operator output
    pub stdout: &'a mut (dyn AsyncWrite + Send + Unpin),
    /// Operator error stream
    pub stderr: &'a mut (dyn AsyncWrite + Send + Unpin),
}

/// Performs the client handshake over a dialed tunnel stream
#[async_trait]
pub trait ReverseConnector: Send + Sync {
    /// Handshake with the SSH daemon at the far end of `stream`.
    ///
    /// `peer` names the device in logs.
    async fn connect(
        &self,
        stream: TunnelStream,
        peer: &str,
    ) -> Result<Arc<dyn ReverseClient>, SessionError>;
}

/// An established client connection into a device
#[async_trait]
pub trait ReverseClient: Send + Sync {
    /// Open a session channel, requesting a terminal when `pty` is given
    async fn open_session(
        &self,
        pty: Option<&PtyRequest>,
    ) -> Result<Box<dyn RemoteSession>, SessionError>;

    /// Whether the underlying connection has gone away
    fn is_closed(&self) -> bool;

    /// Resolves once the underlying connection has gone away
    async fn closed(&self);
}

/// A session channel on a device, not yet started
#[async_trait]
pub trait RemoteSession: Send {
    /// Start a shell and relay it until it exits; returns the exit status
    async fn shell(self: Box<Self>, io: SessionIo<'_>) -> Result<u32, SessionError>;

    /// Run `command` and relay it until it exits; returns the exit status
    async fn exec(self: Box<Self>, command: &str, io: SessionIo<'_>) -> Result<u32, SessionError>;
}
