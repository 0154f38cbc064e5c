//! Broker configuration

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Configuration for the broker daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Address to bind the SSH server to
    pub bind_address: String,

    /// Path to the host key file
    pub host_key_path: PathBuf,

    /// User name reserved for the operator
    pub operator_user: String,

    /// authorized_keys files listing operator public keys
    pub operator_keys: Vec<PathBuf>,

    /// Operator public keys given inline (`ssh-ed25519 AAAA... comment`)
    pub operator_public_keys: Vec<String>,

    /// How the broker logs into a device's own SSH daemon
    pub device: DeviceLogin,

    /// Bound on reverse dial plus client handshake
    #[serde(with = "duration_secs")]
    pub reverse_connect_timeout: Duration,

    /// Keepalive probe interval on accepted connections
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,

    /// Services reachable by devices through direct-connect channels
    pub services: Vec<ServiceConfig>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        let config_dir = super::default_config_dir();

        Self {
            bind_address: "0.0.0.0:2222".to_string(),
            host_key_path: config_dir.join("host_key"),
            operator_user: "root".to_string(),
            operator_keys: Vec::new(),
            operator_public_keys: Vec::new(),
            device: DeviceLogin::default(),
            reverse_connect_timeout: Duration::from_secs(15),
            keepalive_interval: Duration::from_secs(30),
            services: vec![ServiceConfig {
                port: 7,
                kind: ServiceKind::Echo,
            }],
        }
    }
}

impl BrokerConfig {
    /// Check invariants that would otherwise surface at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operator_user.is_empty() {
            return Err(ConfigError::Invalid("operator_user is empty".to_string()));
        }

        let mut ports = HashSet::new();
        for service in &self.services {
            if !ports.insert(service.port) {
                return Err(ConfigError::DuplicateService(service.port));
            }
        }

        Ok(())
    }
}

/// Credentials and port for the device-side SSH daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceLogin {
    /// User to log in as on the device
    pub user: String,

    /// Environment variable holding the shared device password
    pub password_env: String,

    /// Port of the device's local SSH daemon
    pub ssh_port: u32,
}

impl Default for DeviceLogin {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            password_env: "TETHER_DEVICE_PASSWORD".to_string(),
            ssh_port: 22,
        }
    }
}

impl DeviceLogin {
    /// Read the shared password from the environment
    pub fn password(&self) -> Result<String, ConfigError> {
        std::env::var(&self.password_env).map_err(|_| {
            ConfigError::Invalid(format!(
                "device password variable {} is not set",
                self.password_env
            ))
        })
    }
}

/// A service exposed to devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Port devices direct-connect to
    pub port: u32,
    /// Which built-in handler serves it
    pub kind: ServiceKind,
}

/// Built-in service handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Writes back every byte it reads
    Echo,
}
