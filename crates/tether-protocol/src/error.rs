//! Protocol error types

use thiserror::Error;

/// Errors raised while interpreting a request payload
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// An endpoint in a payload could not be resolved to a socket address
    #[error("{0}")]
    InvalidAddress(String),

    /// A port number does not fit in 16 bits
    #[error("Port out of range: {0}")]
    PortOutOfRange(u32),

    /// A payload string was not valid UTF-8
    #[error("Payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}
