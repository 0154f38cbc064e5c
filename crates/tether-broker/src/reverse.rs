//! Reverse SSH client into devices
//!
//! The broker logs into a device's own SSH daemon over a stream dialed
//! through that device's tunnel. Host keys are accepted as presented: the
//! stream already runs inside the device's authenticated connection.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, ChannelMsg};
use russh_keys::key::PublicKey;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::{CancellationToken, DropGuard};

use tether_core::config::DeviceLogin;
use tether_core::error::{ConfigError, SessionError};
use tether_core::traits::{RemoteSession, ReverseClient, ReverseConnector, SessionIo};
use tether_core::TunnelStream;
use tether_protocol::names::{REQUEST_EXEC, REQUEST_EXIT_STATUS, REQUEST_PTY, REQUEST_SHELL};
use tether_protocol::PtyRequest;

/// Size of the operator-to-device copy buffer
const RELAY_BUFFER_SIZE: usize = 8192;

/// Extended data stream carrying stderr
const STDERR_STREAM: u32 = 1;

/// Logs into devices with the shared password credentials
pub struct RusshConnector {
    config: Arc<Config>,
    user: String,
    password: String,
}

impl RusshConnector {
    /// Read the device login from configuration and the environment
    pub fn new(login: &DeviceLogin) -> Result<Self, ConfigError> {
        Ok(Self::with_password(&login.user, login.password()?))
    }

    pub fn with_password(user: &str, password: impl Into<String>) -> Self {
        Self {
            config: Arc::new(Config::default()),
            user: user.to_string(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl ReverseConnector for RusshConnector {
    async fn connect(
        &self,
        stream: TunnelStream,
        peer: &str,
    ) -> Result<Arc<dyn ReverseClient>, SessionError> {
        let closed = CancellationToken::new();
        let handler = ReverseHandler {
            peer: peer.to_string(),
            _closed: closed.clone().drop_guard(),
        };

        let mut handle = client::connect_stream(Arc::clone(&self.config), stream, handler)
            .await
            .map_err(|e| SessionError::Handshake(e.to_string()))?;

        tracing::debug!("Authenticating to {} as '{}'", peer, self.user);
        let authenticated = handle
            .authenticate_password(&self.user, &self.password)
            .await
            .map_err(|e| SessionError::Handshake(e.to_string()))?;
        if !authenticated {
            return Err(SessionError::AuthRejected);
        }

        Ok(Arc::new(RusshClient { handle, closed }))
    }
}

/// Client-side callbacks for one reverse connection
struct ReverseHandler {
    peer: String,
    /// Cancels the client's token when the connection task drops us
    _closed: DropGuard,
}

#[async_trait]
impl client::Handler for ReverseHandler {
    type Error = anyhow::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool> {
        tracing::debug!(
            "Host key of {}: {}",
            self.peer,
            server_public_key.fingerprint()
        );
        Ok(true)
    }
}

/// An authenticated client connection to a device
struct RusshClient {
    handle: Handle<ReverseHandler>,
    closed: CancellationToken,
}

#[async_trait]
impl ReverseClient for RusshClient {
    async fn open_session(
        &self,
        pty: Option<&PtyRequest>,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SessionError::Open(e.to_string()))?;

        if let Some(pty) = pty {
            channel
                .request_pty(
                    false,
                    &pty.term_env,
                    pty.char_width,
                    pty.char_height,
                    pty.px_width,
                    pty.px_height,
                    &pty.term_modes,
                )
                .await
                .map_err(|e| SessionError::Open(format!("{}: {}", REQUEST_PTY, e)))?;
        }

        Ok(Box::new(RusshSession { channel }))
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.handle.is_closed()
    }

    async fn closed(&self) {
        self.closed.cancelled().await
    }
}

struct RusshSession {
    channel: Channel<Msg>,
}

#[async_trait]
impl RemoteSession for RusshSession {
    async fn shell(self: Box<Self>, io: SessionIo<'_>) -> Result<u32, SessionError> {
        self.channel
            .request_shell(true)
            .await
            .map_err(|e| SessionError::Remote(format!("{}: {}", REQUEST_SHELL, e)))?;
        relay(self.channel, io).await
    }

    async fn exec(self: Box<Self>, command: &str, io: SessionIo<'_>) -> Result<u32, SessionError> {
        self.channel
            .exec(true, command)
            .await
            .map_err(|e| SessionError::Remote(format!("{}: {}", REQUEST_EXEC, e)))?;
        relay(self.channel, io).await
    }
}

/// Pump bytes between the operator and a started remote session until the
/// remote side closes the channel.
async fn relay(mut channel: Channel<Msg>, io: SessionIo<'_>) -> Result<u32, SessionError> {
    let SessionIo {
        stdin,
        stdout,
        stderr,
    } = io;
    let remote = |e: std::io::Error| SessionError::Remote(e.to_string());

    let mut input = Box::pin(channel.make_writer());
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut stdin_open = true;
    let mut status = None;

    loop {
        tokio::select! {
            read = stdin.read(&mut buf), if stdin_open => match read {
                Ok(0) | Err(_) => {
                    stdin_open = false;
                    let _ = channel.eof().await;
                }
                Ok(n) => {
                    if input.write_all(&buf[..n]).await.is_err() {
                        stdin_open = false;
                    }
                }
            },
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) => {
                    stdout.write_all(&data).await.map_err(remote)?;
                    stdout.flush().await.map_err(remote)?;
                }
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == STDERR_STREAM => {
                    stderr.write_all(&data).await.map_err(remote)?;
                    stderr.flush().await.map_err(remote)?;
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => status = Some(exit_status),
                Some(ChannelMsg::Failure) => {
                    return Err(SessionError::Remote("request refused by device".to_string()));
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            },
        }
    }

    status.ok_or_else(|| {
        SessionError::Remote(format!("channel closed without {}", REQUEST_EXIT_STATUS))
    })
}
