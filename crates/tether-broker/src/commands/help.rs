use async_trait::async_trait;

use super::{Command, CommandContext, EXIT_OK};

pub(super) struct Help;

#[async_trait]
impl Command for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    fn description(&self) -> &'static str {
        "This help text"
    }

    async fn run(&self, ctx: &mut CommandContext<'_>, _args: &[&str]) -> i32 {
        let text: String = ctx
            .commands
            .describe()
            .map(|(name, description)| format!("{}\t{}\r\n", name, description))
            .collect();
        ctx.print(&text).await;
        EXIT_OK
    }
}
