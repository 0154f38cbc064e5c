//! `scp` passthrough
//!
//! The operator runs `scp` against the broker with a remote path of the form
//! `/<device-id>/<path>`. The broker picks the device from the first path
//! segment and runs the same `scp` invocation there with the prefix removed.

use async_trait::async_trait;
use thiserror::Error;

use super::{Command, CommandContext, EXIT_FAILURE};

/// Why an scp invocation could not be rewritten
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScpError {
    #[error("Destination path not found in command")]
    NoPath,

    #[error("Ambiguous destination: {0} paths in command")]
    AmbiguousPath(usize),
}

/// A rewritten scp invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpTarget {
    /// Device named by the first path segment
    pub device: String,
    /// Command line to run on the device
    pub command: String,
}

/// Split the `/<device>/<path>` argument of an scp invocation.
///
/// Exactly one argument must start with `/`. Without a second `/` the
/// device-side path is `/`.
pub fn rewrite_scp(args: &[&str]) -> Result<ScpTarget, ScpError> {
    let paths: Vec<&str> = args.iter().copied().filter(|a| a.starts_with('/')).collect();
    let path = match paths.as_slice() {
        [] => return Err(ScpError::NoPath),
        [path] => *path,
        more => return Err(ScpError::AmbiguousPath(more.len())),
    };

    let rest = &path[1..];
    let (device, device_path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };

    let command = std::iter::once("scp")
        .chain(
            args.iter()
                .map(|&arg| if arg == path { device_path } else { arg }),
        )
        .collect::<Vec<_>>()
        .join(" ");

    Ok(ScpTarget {
        device: device.to_string(),
        command,
    })
}

pub(super) struct Scp;

#[async_trait]
impl Command for Scp {
    fn name(&self) -> &'static str {
        "scp"
    }

    fn description(&self) -> &'static str {
        "Copy data to remote nodes"
    }

    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> i32 {
        let target = match rewrite_scp(args) {
            Ok(target) => target,
            Err(e) => {
                ctx.complain(&format!("{}\r\n", e)).await;
                return EXIT_FAILURE;
            }
        };

        let Some(node) = ctx.nodes.get(&target.device).await else {
            ctx.complain(&format!("Device {} not found\r\n", target.device))
                .await;
            return EXIT_FAILURE;
        };

        let session = match node.new_session(None).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Error creating session on {}: {}", node.id(), e);
                ctx.complain(&format!("Error connecting to {}\r\n", target.device))
                    .await;
                return EXIT_FAILURE;
            }
        };

        tracing::info!("Running `{}` on {}", target.command, node.id());
        match session.exec(&target.command, ctx.io()).await {
            Ok(status) => status as i32,
            Err(e) => {
                tracing::warn!("Error running `{}` on {}: {}", target.command, node.id(), e);
                ctx.complain(&format!(
                    "Error running command `{}` on {}\r\n",
                    target.command, target.device
                ))
                .await;
                EXIT_FAILURE
            }
        }
    }
}
