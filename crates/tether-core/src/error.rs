//! Core error types for tether

use std::path::PathBuf;
use std::time::Duration;

use tether_protocol::ProtocolError;
use thiserror::Error;

/// Failures of the actor primitive
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActorError {
    /// The actor was killed; no further tasks are accepted
    #[error("Actor stopped")]
    Stopped,

    /// A task panicked; the panic was recovered at the actor boundary
    #[error("Task panicked: {0}")]
    Panicked(String),
}

/// Errors on the tunnel between broker and device
#[derive(Error, Debug)]
pub enum TunnelError {
    /// The peer refused to open the requested channel
    #[error("Channel open failed: {0}")]
    ChannelOpen(String),

    /// A payload could not be interpreted
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] ProtocolError),

    /// The underlying connection is gone
    #[error("Connection closed")]
    Closed,
}

/// Errors while establishing or running a reverse session on a device
#[derive(Error, Debug)]
pub enum SessionError {
    /// Reaching the device's local SSH daemon through the tunnel failed
    #[error("Dial failed: {0}")]
    Dial(#[source] TunnelError),

    /// The SSH client handshake with the device failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The device rejected the broker's credentials
    #[error("Authentication rejected by device")]
    AuthRejected,

    /// Dial and handshake did not finish in time
    #[error("Reverse connection timed out after {0:?}")]
    Timeout(Duration),

    /// A session channel could not be opened on the reverse client
    #[error("Session open failed: {0}")]
    Open(String),

    /// The remote shell or command failed
    #[error("Remote execution failed: {0}")]
    Remote(String),

    /// The node's actor failed
    #[error(transparent)]
    Actor(#[from] ActorError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A service port was exposed twice
    #[error("Port {0} is already exposed")]
    DuplicateService(u32),

    /// The host identity could not be loaded
    #[error("Host key error at {path}: {message}")]
    HostKey { path: PathBuf, message: String },
}
