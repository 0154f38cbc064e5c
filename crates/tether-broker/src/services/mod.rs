//! Built-in services

mod echo;

pub use echo::EchoService;
