//! Operator authentication

mod keys;

pub use keys::{OperatorKey, OperatorKeys};
