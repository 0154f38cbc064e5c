//! Accepted transport connections
//!
//! A [`TunnelConnection`] is the broker's view of one SSH connection: who is
//! on the other end, which addresses the peer registered for forwarding, and
//! how to open channels back across it.

mod opener;

pub use opener::SessionOpener;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use tether_core::error::TunnelError;
use tether_core::traits::{ChannelOpener, Dialer};
use tether_core::{Principal, TunnelStream};
use tether_protocol::{DirectConnect, ForwardRequest, LOOPBACK};

/// First originator port handed out for outbound dials
pub const FIRST_ORIGINATOR_PORT: u32 = 32768;

/// One accepted connection from an operator or a device
pub struct TunnelConnection {
    /// Principal established during the handshake
    principal: Principal,
    /// Address the peer connected from
    remote_addr: SocketAddr,
    /// Opens channels back toward the peer
    opener: Arc<dyn ChannelOpener>,
    /// Forward bookkeeping
    state: Mutex<ForwardState>,
}

struct ForwardState {
    /// Addresses registered with `tcpip-forward`, as `host:port`
    forwarded: HashSet<String>,
    /// Next originator port; only ever increases
    next_port: u32,
}

impl TunnelConnection {
    /// Wrap an authenticated connection
    pub fn new(
        principal: Principal,
        remote_addr: SocketAddr,
        opener: Arc<dyn ChannelOpener>,
    ) -> Self {
        Self {
            principal,
            remote_addr,
            opener,
            state: Mutex::new(ForwardState {
                forwarded: HashSet::new(),
                next_port: FIRST_ORIGINATOR_PORT,
            }),
        }
    }

    /// Who is on the other end
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Address the peer connected from
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Track a forwarded address. Always acknowledged.
    pub async fn register_forward(&self, request: &ForwardRequest) -> bool {
        let key = request.key();
        tracing::debug!("Registering forward {} for {}", key, self.remote_addr);
        self.state.lock().await.forwarded.insert(key);
        true
    }

    /// Stop tracking a forwarded address. Always acknowledged, even when the
    /// address was never registered.
    pub async fn cancel_forward(&self, request: &ForwardRequest) -> bool {
        let key = request.key();
        if !self.state.lock().await.forwarded.remove(&key) {
            tracing::debug!("Cancel for unknown forward {} from {}", key, self.remote_addr);
        }
        true
    }

    /// Snapshot of the forwarded addresses, sorted
    pub async fn forwarded_addresses(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self.state.lock().await.forwarded.iter().cloned().collect();
        addrs.sort();
        addrs
    }

    async fn next_originator_port(&self) -> u32 {
        let mut state = self.state.lock().await;
        let port = state.next_port;
        state.next_port += 1;
        port
    }

    /// Open a byte stream to `host:port` as seen from the peer's network.
    ///
    /// The channel is opened across this same connection, with a fresh
    /// loopback originator port so that concurrent dials stay distinguishable.
    pub async fn dial(&self, host: &str, port: u32) -> Result<TunnelStream, TunnelError> {
        let request = DirectConnect::new(host, port, LOOPBACK, self.next_originator_port().await);
        let (local_addr, remote_addr) = request.resolve().await?;

        tracing::debug!("Dialing {} through {}", request, self.remote_addr);
        let stream = self.opener.open_forwarded(&request).await?;

        Ok(TunnelStream::new(stream, local_addr, remote_addr))
    }
}

#[async_trait]
impl Dialer for TunnelConnection {
    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    async fn dial(&self, host: &str, port: u32) -> Result<TunnelStream, TunnelError> {
        TunnelConnection::dial(self, host, port).await
    }

    async fn forwarded_addresses(&self) -> Vec<String> {
        TunnelConnection::forwarded_addresses(self).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tether_core::stream::BoxedStream;
    use tether_core::DeviceId;

    /// Records every channel it is asked to open
    #[derive(Default)]
    pub(crate) struct RecordingOpener {
        pub opened: StdMutex<Vec<DirectConnect>>,
        pub refuse: bool,
    }

    #[async_trait]
    impl ChannelOpener for RecordingOpener {
        async fn open_forwarded(
            &self,
            request: &DirectConnect,
        ) -> Result<BoxedStream, TunnelError> {
            self.opened.lock().unwrap().push(request.clone());
            if self.refuse {
                return Err(TunnelError::ChannelOpen("Connection refused".to_string()));
            }
            let (near, _far) = tokio::io::duplex(64);
            Ok(Box::new(near))
        }
    }

    pub(crate) fn device_connection(opener: Arc<RecordingOpener>) -> TunnelConnection {
        TunnelConnection::new(
            Principal::Device(DeviceId::new("dev1")),
            "10.0.0.5:51000".parse().unwrap(),
            opener,
        )
    }

    #[tokio::test]
    async fn test_forward_round_trip() {
        let conn = device_connection(Arc::new(RecordingOpener::default()));
        let existing = ForwardRequest::new("0.0.0.0", 2200);
        assert!(conn.register_forward(&existing).await);
        let before = conn.forwarded_addresses().await;

        let request = ForwardRequest::new("127.0.0.1", 8080);
        assert!(conn.register_forward(&request).await);
        assert_eq!(conn.forwarded_addresses().await.len(), 2);
        assert!(conn.cancel_forward(&request).await);

        assert_eq!(conn.forwarded_addresses().await, before);
    }

    #[tokio::test]
    async fn test_cancel_unknown_forward_is_acknowledged() {
        let conn = device_connection(Arc::new(RecordingOpener::default()));
        conn.register_forward(&ForwardRequest::new("0.0.0.0", 80)).await;

        assert!(conn.cancel_forward(&ForwardRequest::new("0.0.0.0", 81)).await);
        assert_eq!(conn.forwarded_addresses().await, vec!["0.0.0.0:80".to_string()]);
    }

    #[tokio::test]
    async fn test_dial_allocates_increasing_originator_ports() {
        let opener = Arc::new(RecordingOpener::default());
        let conn = device_connection(Arc::clone(&opener));

        for _ in 0..5 {
            conn.dial("127.0.0.1", 22).await.unwrap();
        }

        let opened = opener.opened.lock().unwrap();
        let ports: Vec<u32> = opened.iter().map(|r| r.originator_port).collect();
        assert_eq!(ports[0], FIRST_ORIGINATOR_PORT);
        assert!(ports.windows(2).all(|w| w[0] < w[1]));
        assert!(opened
            .iter()
            .all(|r| r.originator_host == LOOPBACK && r.target_port == 22));
    }

    #[tokio::test]
    async fn test_dial_reports_resolved_addresses() {
        let conn = device_connection(Arc::new(RecordingOpener::default()));
        let stream = conn.dial("127.0.0.1", 22).await.unwrap();
        assert_eq!(stream.remote_addr(), "127.0.0.1:22".parse().unwrap());
        assert_eq!(stream.local_addr().port(), FIRST_ORIGINATOR_PORT as u16);
    }

    #[tokio::test]
    async fn test_failed_dial_does_not_reuse_port() {
        let opener = Arc::new(RecordingOpener {
            refuse: true,
            ..Default::default()
        });
        let conn = device_connection(Arc::clone(&opener));

        assert!(conn.dial("127.0.0.1", 22).await.is_err());
        assert!(conn.dial("127.0.0.1", 22).await.is_err());

        let opened = opener.opened.lock().unwrap();
        assert_eq!(opened[0].originator_port + 1, opened[1].originator_port);
    }
}
