use async_trait::async_trait;

use super::{Command, CommandContext, EXIT_FAILURE, EXIT_OK};

pub(super) struct Connect;

#[async_trait]
impl Command for Connect {
    fn name(&self) -> &'static str {
        "connect"
    }

    fn description(&self) -> &'static str {
        "Establish a SSH connection to a device"
    }

    async fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> i32 {
        let Some(&target) = args.first() else {
            ctx.complain("Missing device ID\r\n").await;
            return EXIT_FAILURE;
        };

        let Some(node) = ctx.nodes.get(target).await else {
            ctx.complain(&format!("Device {} not found\r\n", target)).await;
            return EXIT_FAILURE;
        };

        tracing::info!("Operator connecting to {}", node.id());
        let pty = ctx.pty.clone();
        let session = match node.new_session(pty.as_ref()).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Error creating session on {}: {}", node.id(), e);
                ctx.complain(&format!("Error connecting to {}\r\n", target)).await;
                return EXIT_FAILURE;
            }
        };

        match session.shell(ctx.io()).await {
            Ok(status) => {
                tracing::info!("Shell on {} exited with {}", node.id(), status);
                EXIT_OK
            }
            Err(e) => {
                tracing::warn!("Error running shell on {}: {}", node.id(), e);
                ctx.complain(&format!("Error connecting to {}\r\n", target)).await;
                EXIT_FAILURE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{run_line, test_registry, test_registry_with, FakeConnector};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tether_protocol::PtyRequest;

    #[tokio::test]
    async fn test_connect_without_id() {
        let registry = test_registry(&[]).await;
        let out = run_line(&registry, None, "connect").await;
        assert_eq!(out.status, 126);
        assert_eq!(out.stderr, "Missing device ID\r\n");
    }

    #[tokio::test]
    async fn test_connect_unknown_device_never_dials() {
        let connector = Arc::new(FakeConnector::default());
        let registry = test_registry_with(Arc::clone(&connector), &["dev1"]).await;

        let out = run_line(&registry, None, "connect nosuch").await;
        assert_eq!(out.status, 126);
        assert_eq!(out.stderr, "Device nosuch not found\r\n");
        assert_eq!(connector.handshakes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connect_relays_shell_with_pty() {
        let connector = Arc::new(FakeConnector::default());
        let registry = test_registry_with(Arc::clone(&connector), &["dev1"]).await;
        let pty = PtyRequest::new("xterm-256color", 100, 30, 0, 0, &[]);

        let out = run_line(&registry, Some(pty.clone()), "connect dev1").await;
        assert_eq!(out.status, 0);
        assert_eq!(out.stdout, "remote$ ");
        assert_eq!(*connector.client(0).last_pty.lock().unwrap(), Some(pty));
    }
}
