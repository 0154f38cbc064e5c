//! In-memory stand-ins for the transport seams

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use tether_core::error::{SessionError, TunnelError};
use tether_core::traits::{Dialer, RemoteSession, ReverseClient, ReverseConnector, SessionIo};
use tether_core::{DeviceId, TunnelStream};
use tether_protocol::PtyRequest;

use crate::commands::{CommandContext, CommandTable};
use crate::node::{Node, NodeSettings};
use crate::registry::Registry;

pub(crate) struct FakeDialer {
    addr: SocketAddr,
    pub dials: AtomicUsize,
    pub fail: AtomicBool,
    pub targets: Mutex<Vec<(String, u32)>>,
    pub forwards: Mutex<Vec<String>>,
}

impl FakeDialer {
    pub fn at(addr: SocketAddr) -> Self {
        Self {
            addr,
            dials: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            targets: Mutex::new(Vec::new()),
            forwards: Mutex::new(Vec::new()),
        }
    }
}

impl Default for FakeDialer {
    fn default() -> Self {
        Self::at("10.0.0.5:51000".parse().unwrap())
    }
}

#[async_trait]
impl Dialer for FakeDialer {
    fn remote_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn dial(&self, host: &str, port: u32) -> Result<TunnelStream, TunnelError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push((host.to_string(), port));
        if self.fail.load(Ordering::SeqCst) {
            return Err(TunnelError::ChannelOpen("Connection refused".to_string()));
        }
        let (near, _far) = tokio::io::duplex(64);
        Ok(TunnelStream::new(
            Box::new(near),
            "127.0.0.1:32768".parse().unwrap(),
            "127.0.0.1:22".parse().unwrap(),
        ))
    }

    async fn forwarded_addresses(&self) -> Vec<String> {
        self.forwards.lock().unwrap().clone()
    }
}

/// What a fake remote session does when started
#[derive(Clone)]
pub(crate) struct Script {
    pub output: Vec<u8>,
    pub exit: u32,
    /// Copy stdin to stdout until EOF before exiting
    pub echo_stdin: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            output: b"remote$ ".to_vec(),
            exit: 0,
            echo_stdin: false,
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeConnector {
    delay: Duration,
    pub script: Script,
    pub handshakes: AtomicUsize,
    clients: Mutex<Vec<Arc<FakeClient>>>,
}

impl FakeConnector {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn with_script(script: Script) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    pub fn client(&self, index: usize) -> Arc<FakeClient> {
        Arc::clone(&self.clients.lock().unwrap()[index])
    }
}

#[async_trait]
impl ReverseConnector for FakeConnector {
    async fn connect(
        &self,
        _stream: TunnelStream,
        _peer: &str,
    ) -> Result<Arc<dyn ReverseClient>, SessionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.handshakes.fetch_add(1, Ordering::SeqCst);

        let client = Arc::new(FakeClient {
            closed: CancellationToken::new(),
            opened: AtomicUsize::new(0),
            last_pty: Mutex::new(None),
            commands: Arc::new(Mutex::new(Vec::new())),
            script: self.script.clone(),
        });
        self.clients.lock().unwrap().push(Arc::clone(&client));
        Ok(client)
    }
}

pub(crate) struct FakeClient {
    closed: CancellationToken,
    pub opened: AtomicUsize,
    pub last_pty: Mutex<Option<PtyRequest>>,
    pub commands: Arc<Mutex<Vec<String>>>,
    script: Script,
}

impl FakeClient {
    pub fn close(&self) {
        self.closed.cancel();
    }
}

#[async_trait]
impl ReverseClient for FakeClient {
    async fn open_session(
        &self,
        pty: Option<&PtyRequest>,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        if self.closed.is_cancelled() {
            return Err(SessionError::Open("connection closed".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.last_pty.lock().unwrap() = pty.cloned();
        Ok(Box::new(FakeSession {
            script: self.script.clone(),
            commands: Arc::clone(&self.commands),
        }))
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    async fn closed(&self) {
        self.closed.cancelled().await
    }
}

struct FakeSession {
    script: Script,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeSession {
    async fn play(&self, io: SessionIo<'_>) -> Result<u32, SessionError> {
        let remote = |e: std::io::Error| SessionError::Remote(e.to_string());
        io.stdout.write_all(&self.script.output).await.map_err(remote)?;
        if self.script.echo_stdin {
            tokio::io::copy(io.stdin, io.stdout).await.map_err(remote)?;
        }
        io.stdout.flush().await.map_err(remote)?;
        Ok(self.script.exit)
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn shell(self: Box<Self>, io: SessionIo<'_>) -> Result<u32, SessionError> {
        self.play(io).await
    }

    async fn exec(self: Box<Self>, command: &str, io: SessionIo<'_>) -> Result<u32, SessionError> {
        self.commands.lock().unwrap().push(command.to_string());
        self.play(io).await
    }
}

/// Drain whatever is currently readable without waiting for EOF
pub(crate) async fn read_available(reader: &mut (impl tokio::io::AsyncRead + Unpin)) -> String {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    while let Ok(Ok(n)) =
        tokio::time::timeout(Duration::from_millis(50), reader.read(&mut buf)).await
    {
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub(crate) async fn test_registry(ids: &[&str]) -> Registry {
    test_registry_with(Arc::new(FakeConnector::default()), ids).await
}

/// A registry holding one node per ID, all sharing `connector`
pub(crate) async fn test_registry_with(connector: Arc<FakeConnector>, ids: &[&str]) -> Registry {
    let registry = Registry::new();
    for id in ids {
        let connector: Arc<dyn ReverseConnector> = connector.clone();
        registry
            .register(Arc::new(Node::new(
                DeviceId::new(id),
                Arc::new(FakeDialer::default()),
                connector,
                NodeSettings {
                    ssh_port: 22,
                    connect_timeout: Duration::from_secs(5),
                },
            )))
            .await;
    }
    registry
}

pub(crate) struct Outcome {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run one command line with empty stdin, capturing its output
pub(crate) async fn run_line(nodes: &Registry, pty: Option<PtyRequest>, line: &str) -> Outcome {
    let table = CommandTable::standard();
    let mut stdin = tokio::io::empty();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let status = {
        let mut ctx = CommandContext {
            stdin: &mut stdin,
            stdout: &mut stdout,
            stderr: &mut stderr,
            nodes,
            commands: &table,
            pty,
        };
        table.execute(&mut ctx, line).await
    };

    Outcome {
        status,
        stdout: String::from_utf8(stdout).unwrap(),
        stderr: String::from_utf8(stderr).unwrap(),
    }
}
