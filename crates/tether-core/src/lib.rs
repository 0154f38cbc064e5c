//! tether-core: Core abstractions for the tether broker
//!
//! This crate provides the actor primitive, shared types, capability traits
//! and configuration structures used by the broker.

pub mod actor;
pub mod config;
pub mod error;
pub mod stream;
pub mod traits;
pub mod types;

pub use actor::Actor;
pub use error::{ActorError, ConfigError, SessionError, TunnelError};
pub use stream::TunnelStream;
pub use types::{DeviceId, Principal};
