use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

use tether_protocol::PtyRequest;

use super::{LineReader, OperatorIo, SessionEnv};
use crate::commands::CommandContext;

/// Prompt, read a line, run it; until the operator ends the input
pub(super) async fn interactive(
    io: OperatorIo,
    env: &SessionEnv,
    terminal: &watch::Receiver<Option<PtyRequest>>,
) {
    let OperatorIo {
        reader,
        mut writer,
        mut stderr,
    } = io;
    let mut reader = LineReader::new(reader);

    loop {
        if let Err(e) = prompt(&mut *writer, &env.prompt).await {
            tracing::debug!("Operator output closed: {}", e);
            break;
        }

        let echo = terminal.borrow().is_some();
        let read = if echo {
            reader.read_line(Some(&mut *writer)).await
        } else {
            reader.read_line::<super::BoxedWriter>(None).await
        };
        let line = match read {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!("Operator ended input");
                break;
            }
            Err(e) => {
                tracing::debug!("Operator input failed: {}", e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut ctx = CommandContext {
            stdin: &mut reader,
            stdout: &mut *writer,
            stderr: &mut *stderr,
            nodes: env.nodes.as_ref(),
            commands: env.commands.as_ref(),
            pty: terminal.borrow().clone(),
        };
        let status = env.commands.execute(&mut ctx, line).await;
        tracing::debug!("'{}' exited with {}", line, status);
    }
}

async fn prompt(
    out: &mut (dyn tokio::io::AsyncWrite + Send + Unpin),
    text: &str,
) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await
}
