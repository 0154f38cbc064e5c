//! Operator sessions
//!
//! An operator session channel first collects its setup requests. Once the
//! client asks for a `shell` it becomes an interactive prompt; an `exec`
//! runs one command line and reports its exit status.

mod line;
mod setup;
mod shell;

pub use line::LineReader;
pub use setup::{apply, SessionMode, SessionRequest, SessionSetup};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use tether_protocol::{ExitStatus, PtyRequest};

use crate::commands::{CommandContext, CommandTable, EXIT_OK};
use crate::registry::NodeManager;

/// Queue depth for requests waiting to reach a session task
pub const SESSION_REQUEST_CAPACITY: usize = 16;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Streams of an accepted operator session channel
pub struct OperatorIo {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    pub stderr: BoxedWriter,
}

/// Channel-level replies a session makes when it ends
#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn exit_status(&self, status: ExitStatus);

    async fn close(&self);
}

/// What sessions share for the lifetime of the broker
#[derive(Clone)]
pub struct SessionEnv {
    pub nodes: Arc<dyn NodeManager>,
    pub commands: Arc<CommandTable>,
    /// Shown before each interactive command line
    pub prompt: String,
}

impl SessionEnv {
    pub fn new(nodes: Arc<dyn NodeManager>, operator_user: &str) -> Self {
        Self {
            nodes,
            commands: Arc::new(CommandTable::standard()),
            prompt: format!("{}@tether > ", operator_user),
        }
    }
}

/// Drive one operator session channel to completion
pub async fn run_session(
    io: OperatorIo,
    mut requests: mpsc::Receiver<SessionRequest>,
    control: Box<dyn SessionControl>,
    env: SessionEnv,
) {
    let mut setup = SessionSetup::default();
    let mode = loop {
        match requests.recv().await {
            Some(request) => {
                if let Some(mode) = setup.push(request) {
                    break mode;
                }
            }
            None => {
                tracing::debug!("Session channel closed before it was started");
                control.close().await;
                return;
            }
        }
    };

    let mut terminal = None;
    for request in setup.into_replay() {
        apply(&mut terminal, request);
    }
    let (terminal_tx, terminal_rx) = watch::channel(terminal);
    let tracker = tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            terminal_tx.send_modify(|terminal| apply(terminal, request));
        }
    });

    let status = match mode {
        SessionMode::Shell => {
            tracing::info!("Operator shell started");
            shell::interactive(io, &env, &terminal_rx).await;
            EXIT_OK
        }
        SessionMode::Exec(line) => {
            let pty = terminal_rx.borrow().clone();
            let status = exec_once(io, &env, pty, &line).await;
            tracing::info!("Operator ran '{}', exit status {}", line, status);
            status
        }
    };

    control.exit_status(ExitStatus::from(status)).await;
    control.close().await;
    tracker.abort();
}

async fn exec_once(io: OperatorIo, env: &SessionEnv, pty: Option<PtyRequest>, line: &str) -> i32 {
    let OperatorIo {
        mut reader,
        mut writer,
        mut stderr,
    } = io;

    let status = {
        let mut ctx = CommandContext {
            stdin: &mut *reader,
            stdout: &mut *writer,
            stderr: &mut *stderr,
            nodes: env.nodes.as_ref(),
            commands: env.commands.as_ref(),
            pty,
        };
        env.commands.execute(&mut ctx, line).await
    };

    let _ = writer.flush().await;
    let _ = stderr.flush().await;
    status
}
