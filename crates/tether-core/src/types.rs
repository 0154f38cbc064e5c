//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a registered device.
///
/// Devices are keyed by the user name they authenticate with, case-folded to
/// upper case so that `ab:cd` and `AB:CD` name the same device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Normalize a claimed identity into a device ID
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_uppercase())
    }

    /// Get the normalized ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Who is on the other end of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// The privileged operator; may open sessions
    Operator,
    /// A device registering itself
    Device(DeviceId),
}

impl Principal {
    /// Classify the user name claimed during the handshake.
    ///
    /// The reserved operator name (compared exactly) denotes the operator,
    /// every other name denotes a device.
    pub fn classify(user: &str, operator_user: &str) -> Self {
        if user == operator_user {
            Principal::Operator
        } else {
            Principal::Device(DeviceId::new(user))
        }
    }

    /// Whether this is the operator
    pub fn is_operator(&self) -> bool {
        matches!(self, Principal::Operator)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Operator => write!(f, "operator"),
            Principal::Device(id) => write!(f, "device {}", id),
        }
    }
}
