use std::fmt::Write;
use std::time::SystemTime;

use async_trait::async_trait;

use super::{Command, CommandContext, EXIT_OK};

const HEADER: &str = "Id\tAddr\tServices\tLast seen\r\n";

pub(super) struct Devices;

#[async_trait]
impl Command for Devices {
    fn name(&self) -> &'static str {
        "devices"
    }

    fn description(&self) -> &'static str {
        "List connected devices"
    }

    async fn run(&self, ctx: &mut CommandContext<'_>, _args: &[&str]) -> i32 {
        let now = SystemTime::now();
        let mut text = String::from(HEADER);

        for node in ctx.nodes.list().await {
            let ago = now
                .duration_since(node.last_seen())
                .unwrap_or_default()
                .as_secs();
            let services = node.services().await;
            let services = if services.is_empty() {
                "-".to_string()
            } else {
                services.join(",")
            };
            let _ = write!(
                text,
                "{}\t{}\t{}\t{}s ago\r\n",
                node.id(),
                node.address(),
                services,
                ago
            );
        }

        ctx.print(&text).await;
        EXIT_OK
    }
}
