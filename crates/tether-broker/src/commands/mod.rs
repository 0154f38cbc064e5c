//! Operator commands
//!
//! Commands run against the registry on behalf of an operator session, with
//! the session's streams as their standard input and output. Each returns a
//! process-style exit status.

mod connect;
mod devices;
mod help;
mod scp;

pub use scp::{rewrite_scp, ScpError, ScpTarget};

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use tether_core::traits::SessionIo;
use tether_protocol::PtyRequest;

use crate::registry::NodeManager;

/// Success
pub const EXIT_OK: i32 = 0;
/// The command was found but could not do its job
pub const EXIT_FAILURE: i32 = 126;
/// No such command
pub const EXIT_NOT_FOUND: i32 = 127;

/// Everything a command may touch while it runs
pub struct CommandContext<'a> {
    pub stdin: &'a mut (dyn AsyncRead + Send + Unpin),
    pub stdout: &'a mut (dyn AsyncWrite + Send + Unpin),
    pub stderr: &'a mut (dyn AsyncWrite + Send + Unpin),
    pub nodes: &'a dyn NodeManager,
    pub commands: &'a CommandTable,
    /// Terminal parameters of the operator session, if it requested one
    pub pty: Option<PtyRequest>,
}

impl CommandContext<'_> {
    /// Lend the operator streams to a remote session
    pub fn io(&mut self) -> SessionIo<'_> {
        SessionIo {
            stdin: &mut *self.stdin,
            stdout: &mut *self.stdout,
            stderr: &mut *self.stderr,
        }
    }

    pub async fn print(&mut self, text: &str) {
        if let Err(e) = write_flush(&mut *self.stdout, text).await {
            tracing::debug!("Failed to write to operator: {}", e);
        }
    }

    pub async fn complain(&mut self, text: &str) {
        if let Err(e) = write_flush(&mut *self.stderr, text).await {
            tracing::debug!("Failed to write to operator: {}", e);
        }
    }
}

async fn write_flush(
    out: &mut (dyn AsyncWrite + Send + Unpin),
    text: &str,
) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await
}

/// A named operator command
#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-line description shown by `help`
    fn description(&self) -> &'static str;

    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> i32;
}

/// Commands by name
pub struct CommandTable {
    commands: BTreeMap<&'static str, Box<dyn Command>>,
}

impl CommandTable {
    pub fn empty() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    /// `help`, `devices`, `connect` and `scp`
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.register(Box::new(help::Help));
        table.register(Box::new(devices::Devices));
        table.register(Box::new(connect::Connect));
        table.register(Box::new(scp::Scp));
        table
    }

    pub fn register(&mut self, command: Box<dyn Command>) {
        self.commands.insert(command.name(), command);
    }

    /// `(name, description)` pairs, ordered by name
    pub fn describe(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.commands.values().map(|c| (c.name(), c.description()))
    }

    /// Run one command line. The line is split on whitespace; the first word
    /// selects the command. An empty line succeeds without doing anything.
    pub async fn execute(&self, ctx: &mut CommandContext<'_>, line: &str) -> i32 {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return EXIT_OK;
        };
        let args: Vec<&str> = words.collect();

        match self.commands.get(name) {
            Some(command) => {
                tracing::debug!("Running '{}'", line);
                command.run(ctx, &args).await
            }
            None => {
                ctx.complain(&format!("{}: Command not found\r\n", line)).await;
                EXIT_NOT_FOUND
            }
        }
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::standard()
    }
}
