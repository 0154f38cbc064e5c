//! Capability traits at the transport seams
//!
//! The broker talks to the SSH transport only through these traits, so the
//! protocol logic can be exercised with in-memory fakes.

mod session;
mod tunnel;

pub use session::{RemoteSession, ReverseClient, ReverseConnector, SessionIo};
pub use tunnel::{ChannelOpener, Dialer};
