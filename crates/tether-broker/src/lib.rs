//! tether-broker: reverse-tunnel broker
//!
//! Devices dial in over SSH and register themselves; an operator later
//! reaches them through the broker. For each device the broker is also an
//! SSH client, dialing back through the device's own tunnel into its local
//! SSH daemon.

pub mod auth;
pub mod commands;
pub mod connection;
pub mod node;
pub mod registry;
pub mod reverse;
pub mod router;
pub mod server;
pub mod services;
pub mod state;
pub mod terminal;

#[cfg(test)]
mod testing;

pub use node::{Node, NodeSettings};
pub use registry::{NodeManager, Registry};
pub use router::{RouteError, ServiceHandler, ServiceRouter};
pub use state::BrokerState;
