//! SSH server implementation

mod handler;
mod host_key;
mod listener;
mod session;

pub use handler::ConnectionHandler;
pub use host_key::load_or_generate_host_key;
pub use listener::{server_config, BrokerServer};
pub use session::{operator_io, ChannelControl};
