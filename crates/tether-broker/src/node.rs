//! Registered devices
//!
//! A [`Node`] is the broker's handle on one device. It owns the device's
//! tunnel dialer and lazily builds a reverse SSH client through it, caching
//! the client until the connection underneath it goes away. All client
//! management goes through the node's actor, so concurrent operators share
//! a single handshake.

use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use tether_core::config::BrokerConfig;
use tether_core::error::SessionError;
use tether_core::traits::{Dialer, RemoteSession, ReverseClient, ReverseConnector};
use tether_core::{Actor, DeviceId};
use tether_protocol::{PtyRequest, LOOPBACK};

/// How a node reaches the SSH daemon behind its tunnel
#[derive(Debug, Clone)]
pub struct NodeSettings {
    /// Port of the device's local SSH daemon
    pub ssh_port: u32,
    /// Bound on dial plus client handshake
    pub connect_timeout: Duration,
}

impl NodeSettings {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            ssh_port: config.device.ssh_port,
            connect_timeout: config.reverse_connect_timeout,
        }
    }
}

#[derive(Default)]
struct NodeState {
    /// Cached reverse client, if one has been established
    client: Option<Arc<dyn ReverseClient>>,
}

impl NodeState {
    fn live_client(&self) -> Option<Arc<dyn ReverseClient>> {
        self.client.as_ref().filter(|c| !c.is_closed()).cloned()
    }

    /// Drop the cached client, but only if it is still `client`
    fn forget(&mut self, client: &Arc<dyn ReverseClient>) {
        if self.client.as_ref().is_some_and(|c| same_client(c, client)) {
            self.client = None;
        }
    }
}

fn same_client(a: &Arc<dyn ReverseClient>, b: &Arc<dyn ReverseClient>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// A device registered with the broker
pub struct Node {
    id: DeviceId,
    dialer: Arc<dyn Dialer>,
    connector: Arc<dyn ReverseConnector>,
    settings: NodeSettings,
    last_seen: SystemTime,
    actor: Arc<Actor<NodeState>>,
}

impl Node {
    /// Create a node for a freshly authenticated device connection
    pub fn new(
        id: DeviceId,
        dialer: Arc<dyn Dialer>,
        connector: Arc<dyn ReverseConnector>,
        settings: NodeSettings,
    ) -> Self {
        let actor = Arc::new(Actor::new(format!("node {}", id), NodeState::default()));
        Self {
            id,
            dialer,
            connector,
            settings,
            last_seen: SystemTime::now(),
            actor,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Address the device connected from
    pub fn address(&self) -> std::net::SocketAddr {
        self.dialer.remote_addr()
    }

    /// Forwards the device holds on its tunnel
    pub async fn services(&self) -> Vec<String> {
        self.dialer.forwarded_addresses().await
    }

    /// When the device last (re)connected
    pub fn last_seen(&self) -> SystemTime {
        self.last_seen
    }

    /// Open a session on the device, establishing the reverse client first
    /// if there is no live one.
    ///
    /// Dial and handshake together are bounded by the configured timeout. A
    /// failure leaves the node usable; the next call simply tries again.
    pub async fn new_session(
        &self,
        pty: Option<&PtyRequest>,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        let reach = Reach {
            id: self.id.clone(),
            dialer: Arc::clone(&self.dialer),
            connector: Arc::clone(&self.connector),
            settings: self.settings.clone(),
            actor: Arc::downgrade(&self.actor),
        };
        let pty = pty.cloned();

        self.actor
            .run(move |state| Box::pin(open_session(state, reach, pty)))
            .await?
    }

    /// Retire the node. Work already queued on it still completes.
    pub fn kill(&self) {
        tracing::debug!("Retiring node {}", self.id);
        self.actor.kill();
    }

    #[cfg(test)]
    pub(crate) fn is_killed(&self) -> bool {
        self.actor.is_stopped()
    }
}

/// Everything the actor task needs to (re)establish the reverse client
struct Reach {
    id: DeviceId,
    dialer: Arc<dyn Dialer>,
    connector: Arc<dyn ReverseConnector>,
    settings: NodeSettings,
    actor: Weak<Actor<NodeState>>,
}

impl Reach {
    async fn connect(&self) -> Result<Arc<dyn ReverseClient>, SessionError> {
        let timeout = self.settings.connect_timeout;
        tokio::time::timeout(timeout, self.dial_and_handshake())
            .await
            .map_err(|_| SessionError::Timeout(timeout))?
    }

    async fn dial_and_handshake(&self) -> Result<Arc<dyn ReverseClient>, SessionError> {
        tracing::debug!(
            "Dialing {}:{} through the tunnel of {}",
            LOOPBACK,
            self.settings.ssh_port,
            self.id
        );
        let stream = self
            .dialer
            .dial(LOOPBACK, self.settings.ssh_port)
            .await
            .map_err(SessionError::Dial)?;

        let client = self.connector.connect(stream, self.id.as_str()).await?;
        tracing::info!("Reverse connection to {} established", self.id);
        Ok(client)
    }

    /// Clear the cache once `client` closes
    fn watch(&self, client: Arc<dyn ReverseClient>) {
        let id = self.id.clone();
        let actor = Weak::clone(&self.actor);

        tokio::spawn(async move {
            client.closed().await;
            tracing::info!("Reverse connection to {} closed", id);

            let Some(actor) = actor.upgrade() else {
                return;
            };
            let forget = actor
                .post(move |state| Box::pin(async move { state.forget(&client) }))
                .await;
            if let Err(e) = forget {
                tracing::debug!("Node {} gone before its client closed: {}", id, e);
            }
        });
    }
}

async fn open_session(
    state: &mut NodeState,
    reach: Reach,
    pty: Option<PtyRequest>,
) -> Result<Box<dyn RemoteSession>, SessionError> {
    let client = match state.live_client() {
        Some(client) => client,
        None => {
            let client = reach.connect().await?;
            state.client = Some(Arc::clone(&client));
            reach.watch(Arc::clone(&client));
            client
        }
    };

    client.open_session(pty.as_ref()).await
}
