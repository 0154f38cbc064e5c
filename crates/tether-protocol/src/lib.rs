//! tether-protocol: Wire payloads for the tether broker
//!
//! This crate names the SSH channel types and global requests the broker
//! understands, and defines the fixed-format payloads carried by them.
//! Encoding itself is left to the SSH transport.

pub mod error;
pub mod names;
pub mod payload;
pub mod pty;

pub use error::ProtocolError;
pub use payload::{DirectConnect, ExecRequest, ExitStatus, ForwardRequest, LOOPBACK};
pub use pty::{PtyRequest, WindowChange};
