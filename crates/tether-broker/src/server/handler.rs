//! Per-connection SSH handler
//!
//! One handler serves one accepted connection. It classifies the peer during
//! authentication, registers devices, keeps forward bookkeeping, routes
//! device-opened direct-connect channels to services and hands operator
//! session channels to the terminal layer.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId, Pty};
use russh_keys::key::PublicKey;
use tokio::sync::mpsc;
use tracing::Instrument;

use tether_core::{Principal, TunnelStream};
use tether_protocol::names::{
    CHANNEL_DIRECT_TCPIP, CHANNEL_SESSION, REQUEST_CANCEL_TCPIP_FORWARD, REQUEST_TCPIP_FORWARD,
};
use tether_protocol::{DirectConnect, ExecRequest, ForwardRequest, PtyRequest, WindowChange};

use super::session::{operator_io, ChannelControl};
use crate::connection::{SessionOpener, TunnelConnection};
use crate::node::Node;
use crate::state::BrokerState;
use crate::terminal::{self, SessionRequest, SESSION_REQUEST_CAPACITY};

/// Handler for a single accepted connection
pub struct ConnectionHandler {
    state: Arc<BrokerState>,
    peer_addr: SocketAddr,
    /// Set once the public key has been accepted
    principal: Option<Principal>,
    /// Set once authentication has completed
    connection: Option<Arc<TunnelConnection>>,
    /// Request queues of the operator session channels on this connection
    sessions: HashMap<ChannelId, mpsc::Sender<SessionRequest>>,
}

impl ConnectionHandler {
    pub fn new(state: Arc<BrokerState>, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            peer_addr,
            principal: None,
            connection: None,
            sessions: HashMap::new(),
        }
    }

    fn describe_peer(&self) -> String {
        match &self.principal {
            Some(principal) => format!("{} at {}", principal, self.peer_addr),
            None => self.peer_addr.to_string(),
        }
    }

    /// Queue a request for an operator session and acknowledge it, or refuse
    /// it when the channel is not an operator session.
    async fn forward_request(
        &mut self,
        channel: ChannelId,
        request: SessionRequest,
        session: &mut Session,
    ) {
        let name = request.name();
        let delivered = match self.sessions.get(&channel) {
            Some(queue) => queue.send(request).await.is_ok(),
            None => false,
        };

        if delivered {
            tracing::debug!("{} on {:?}", name, channel);
            session.channel_success(channel);
        } else {
            tracing::warn!(
                "Refusing {} on {:?} from {}: not a session channel",
                name,
                channel,
                self.describe_peer()
            );
            session.channel_failure(channel);
        }
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        tracing::info!("Connection from {} closed", self.describe_peer());
    }
}

#[async_trait]
impl Handler for ConnectionHandler {
    type Error = anyhow::Error;

    /// The operator user must present an allow-listed key; any other user
    /// is a device and is accepted.
    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        let fingerprint = public_key.fingerprint();
        let principal = Principal::classify(user, &self.state.config.operator_user);

        if principal.is_operator() && !self.state.operator_keys.is_authorized(&fingerprint) {
            tracing::warn!(
                "Authentication REJECTED for operator from {}: key {} not authorized",
                self.peer_addr,
                fingerprint
            );
            return Ok(Auth::Reject {
                proceed_with_methods: None,
            });
        }

        tracing::info!(
            "Authenticated {} from {} (key {})",
            principal,
            self.peer_addr,
            fingerprint
        );
        self.principal = Some(principal);
        Ok(Auth::Accept)
    }

    async fn auth_succeeded(&mut self, session: &mut Session) -> Result<(), Self::Error> {
        let Some(principal) = self.principal.clone() else {
            return Ok(());
        };

        let opener = Arc::new(SessionOpener::new(session.handle()));
        let connection = Arc::new(TunnelConnection::new(
            principal.clone(),
            self.peer_addr,
            opener,
        ));
        self.connection = Some(Arc::clone(&connection));

        if let Principal::Device(id) = principal {
            let node = Node::new(
                id,
                connection,
                Arc::clone(&self.state.connector),
                self.state.node_settings.clone(),
            );
            self.state.registry.register(Arc::new(node)).await;
        }

        Ok(())
    }

    async fn tcpip_forward(
        &mut self,
        address: &str,
        port: &mut u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let Some(connection) = &self.connection else {
            return Ok(false);
        };
        tracing::debug!("{} {}:{}", REQUEST_TCPIP_FORWARD, address, port);
        Ok(connection
            .register_forward(&ForwardRequest::new(address, *port))
            .await)
    }

    async fn cancel_tcpip_forward(
        &mut self,
        address: &str,
        port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let Some(connection) = &self.connection else {
            return Ok(false);
        };
        tracing::debug!("{} {}:{}", REQUEST_CANCEL_TCPIP_FORWARD, address, port);
        Ok(connection
            .cancel_forward(&ForwardRequest::new(address, port))
            .await)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let Some(connection) = self.connection.clone() else {
            return Ok(false);
        };

        let request = DirectConnect::new(
            host_to_connect,
            port_to_connect,
            originator_address,
            originator_port,
        );
        let (originator, target) = match request.resolve().await {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::warn!("Rejecting {} channel {}: {}", CHANNEL_DIRECT_TCPIP, request, e);
                return Ok(false);
            }
        };

        let routed = self.state.router.route(port_to_connect, connection, move || {
            Ok(TunnelStream::new(
                Box::new(channel.into_stream()),
                target,
                originator,
            ))
        });

        match routed {
            Ok(()) => {
                tracing::debug!("Accepted {} channel {}", CHANNEL_DIRECT_TCPIP, request);
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("Rejecting {} channel {}: {}", CHANNEL_DIRECT_TCPIP, request, e);
                Ok(false)
            }
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if !matches!(self.principal, Some(Principal::Operator)) || self.connection.is_none() {
            tracing::warn!(
                "Refusing {} channel from {}: not authorized",
                CHANNEL_SESSION,
                self.describe_peer()
            );
            return Ok(false);
        }

        let id = channel.id();
        let (queue, requests) = mpsc::channel(SESSION_REQUEST_CAPACITY);
        self.sessions.insert(id, queue);
        tracing::debug!("Operator session {:?} opened", id);

        let io = operator_io(channel);
        let control = Box::new(ChannelControl::new(session.handle(), id));
        tokio::spawn(
            terminal::run_session(io, requests, control, self.state.sessions.clone())
                .instrument(tracing::Span::current()),
        );

        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let pty = PtyRequest::new(term, col_width, row_height, pix_width, pix_height, modes);
        self.forward_request(channel, SessionRequest::Pty(pty), session)
            .await;
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let change = WindowChange {
            char_width: col_width,
            char_height: row_height,
            px_width: pix_width,
            px_height: pix_height,
        };
        self.forward_request(channel, SessionRequest::WindowChange(change), session)
            .await;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.forward_request(channel, SessionRequest::Shell, session)
            .await;
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        match ExecRequest::from_bytes(data) {
            Ok(exec) => {
                self.forward_request(channel, SessionRequest::Exec(exec), session)
                    .await
            }
            Err(e) => {
                tracing::warn!("Refusing exec on {:?}: {}", channel, e);
                session.channel_failure(channel);
            }
        }
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Refusing subsystem {} on {:?}", name, channel);
        session.channel_failure(channel);
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::trace!("EOF on {:?}", channel);
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.sessions.remove(&channel).is_some() {
            tracing::debug!("Operator session {:?} closed", channel);
        }
        Ok(())
    }
}
