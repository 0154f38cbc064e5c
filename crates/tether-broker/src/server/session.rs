//! Operator session channels over russh

use async_trait::async_trait;
use russh::server::{Handle, Msg};
use russh::{Channel, ChannelId};

use tether_protocol::names::REQUEST_EXIT_STATUS;
use tether_protocol::ExitStatus;

use crate::terminal::{OperatorIo, SessionControl};

/// Extended data stream carrying stderr
const STDERR_STREAM: u32 = 1;

/// Split an accepted session channel into operator streams
pub fn operator_io(channel: Channel<Msg>) -> OperatorIo {
    let stderr = Box::pin(channel.make_writer_ext(Some(STDERR_STREAM)));
    let (reader, writer) = tokio::io::split(channel.into_stream());

    OperatorIo {
        reader: Box::new(reader),
        writer: Box::new(writer),
        stderr: Box::new(stderr),
    }
}

/// Ends a session channel through the connection handle
pub struct ChannelControl {
    handle: Handle,
    channel: ChannelId,
}

impl ChannelControl {
    pub fn new(handle: Handle, channel: ChannelId) -> Self {
        Self { handle, channel }
    }
}

#[async_trait]
impl SessionControl for ChannelControl {
    async fn exit_status(&self, status: ExitStatus) {
        let sent = self
            .handle
            .exit_status_request(self.channel, status.wire_code())
            .await;
        if sent.is_err() {
            tracing::debug!(
                "Could not send {} on {:?}: connection gone",
                REQUEST_EXIT_STATUS,
                self.channel
            );
        }
    }

    async fn close(&self) {
        let _ = self.handle.eof(self.channel).await;
        if self.handle.close(self.channel).await.is_err() {
            tracing::debug!("Channel {:?} already closed", self.channel);
        }
    }
}
