//! Fixed-format request payloads

use std::fmt;
use std::net::SocketAddr;

use crate::error::ProtocolError;

/// Originator host the broker reports on channels it opens itself
pub const LOOPBACK: &str = "127.0.0.1";

/// Payload of a direct-connect channel open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectConnect {
    /// Host the opening side wants reached
    pub target_host: String,
    /// Port the opening side wants reached
    pub target_port: u32,
    /// Host the connection claims to originate from
    pub originator_host: String,
    /// Port the connection claims to originate from
    pub originator_port: u32,
}

impl DirectConnect {
    /// Create a payload naming a target and an originator
    pub fn new(
        target_host: impl Into<String>,
        target_port: u32,
        originator_host: impl Into<String>,
        originator_port: u32,
    ) -> Self {
        Self {
            target_host: target_host.into(),
            target_port,
            originator_host: originator_host.into(),
            originator_port,
        }
    }

    /// Resolve the originator endpoint
    pub async fn originator_addr(&self) -> Result<SocketAddr, ProtocolError> {
        resolve(&self.originator_host, self.originator_port)
            .await
            .map_err(|e| {
                ProtocolError::InvalidAddress(format!(
                    "Invalid source address {}:{} {}",
                    self.originator_host, self.originator_port, e
                ))
            })
    }

    /// Resolve the target endpoint
    pub async fn target_addr(&self) -> Result<SocketAddr, ProtocolError> {
        resolve(&self.target_host, self.target_port)
            .await
            .map_err(|e| {
                ProtocolError::InvalidAddress(format!(
                    "Invalid destination address {}:{} {}",
                    self.target_host, self.target_port, e
                ))
            })
    }

    /// Resolve both endpoints, originator first
    pub async fn resolve(&self) -> Result<(SocketAddr, SocketAddr), ProtocolError> {
        let originator = self.originator_addr().await?;
        let target = self.target_addr().await?;
        Ok((originator, target))
    }
}

impl fmt::Display for DirectConnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.originator_host, self.originator_port, self.target_host, self.target_port
        )
    }
}

/// Payload of `tcpip-forward` and `cancel-tcpip-forward`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    /// Address the peer asked to bind
    pub bind_address: String,
    /// Port the peer asked to bind
    pub bind_port: u32,
}

impl ForwardRequest {
    /// Create a forward request
    pub fn new(bind_address: impl Into<String>, bind_port: u32) -> Self {
        Self {
            bind_address: bind_address.into(),
            bind_port,
        }
    }

    /// Key under which the forward is tracked (`host:port`)
    pub fn key(&self) -> String {
        format!("{}:{}", self.bind_address, self.bind_port)
    }
}

/// Payload of an `exec` channel request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Raw command line
    pub command_line: String,
}

impl ExecRequest {
    /// Decode the command line carried by an exec request
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let command_line = String::from_utf8(data.to_vec())?;
        Ok(Self { command_line })
    }
}

/// Payload of an outbound `exit-status` notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code of the command
    pub code: i32,
}

impl ExitStatus {
    /// Code as carried on the wire (two's complement of negative codes)
    pub fn wire_code(&self) -> u32 {
        self.code as u32
    }
}

impl From<i32> for ExitStatus {
    fn from(code: i32) -> Self {
        Self { code }
    }
}

async fn resolve(host: &str, port: u32) -> Result<SocketAddr, ProtocolError> {
    let port = u16::try_from(port).map_err(|_| ProtocolError::PortOutOfRange(port))?;
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ProtocolError::InvalidAddress(e.to_string()))?;
    addrs
        .next()
        .ok_or_else(|| ProtocolError::InvalidAddress(format!("no address for {}", host)))
}
