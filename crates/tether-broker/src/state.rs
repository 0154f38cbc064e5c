//! Shared broker state

use std::sync::Arc;

use tether_core::config::BrokerConfig;
use tether_core::traits::ReverseConnector;

use crate::auth::OperatorKeys;
use crate::node::NodeSettings;
use crate::registry::Registry;
use crate::router::ServiceRouter;
use crate::terminal::SessionEnv;

/// State shared by every connection handler
pub struct BrokerState {
    pub config: BrokerConfig,
    /// Registered devices
    pub registry: Arc<Registry>,
    /// Services devices can direct-connect to
    pub router: ServiceRouter,
    pub operator_keys: OperatorKeys,
    /// Logs into devices for reverse sessions
    pub connector: Arc<dyn ReverseConnector>,
    /// Passed to new nodes
    pub node_settings: NodeSettings,
    /// Passed to operator sessions
    pub sessions: SessionEnv,
}

impl BrokerState {
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: BrokerConfig,
        operator_keys: OperatorKeys,
        router: ServiceRouter,
        connector: Arc<dyn ReverseConnector>,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        let sessions = SessionEnv::new(registry.clone(), &config.operator_user);
        let node_settings = NodeSettings::from_config(&config);

        Self {
            config,
            registry,
            router,
            operator_keys,
            connector,
            node_settings,
            sessions,
        }
    }
}
