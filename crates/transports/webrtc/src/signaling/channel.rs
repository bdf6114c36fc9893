//! Signaling channel abstraction
//!
//! A channel is split in two halves. The writer is shared by everything that
//! talks to the client (role assignment, negotiation callbacks, answers) and
//! is only ever driven under the session registry lock. The reader is owned
//! by the session's read loop.

use super::protocol::ClientMessage;
use crate::Result;
use async_trait::async_trait;

/// Write half of a signaling channel
#[async_trait]
pub trait ChannelWriter: Send + Sync {
    /// Send one text frame
    async fn send_text(&self, text: String) -> Result<()>;

    /// Close the channel; further sends fail
    async fn close(&self) -> Result<()>;
}

/// Read half of a signaling channel
#[async_trait]
pub trait ChannelReader: Send {
    /// Wait for the next text frame
    ///
    /// Returns [`crate::Error::ChannelClosed`] once the remote side is gone.
    async fn read_text(&mut self) -> Result<String>;

    /// Wait for the next structured message
    async fn read_message(&mut self) -> Result<ClientMessage> {
        let text = self.read_text().await?;
        ClientMessage::parse(&text)
    }
}
