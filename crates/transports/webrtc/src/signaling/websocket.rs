//! WebSocket-backed signaling channel

use super::channel::{ChannelReader, ChannelWriter};
use crate::{Error, Result};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::debug;

/// Split an upgraded WebSocket into channel halves
pub fn split(socket: WebSocket) -> (WsChannelWriter, WsChannelReader) {
    let (sink, stream) = socket.split();
    (
        WsChannelWriter {
            sink: Mutex::new(sink),
        },
        WsChannelReader { stream },
    )
}

/// Write half of a WebSocket signaling channel
pub struct WsChannelWriter {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl ChannelWriter for WsChannelWriter {
    async fn send_text(&self, text: String) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::WebSocketError(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| Error::WebSocketError(e.to_string()))
    }
}

/// Read half of a WebSocket signaling channel
pub struct WsChannelReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl ChannelReader for WsChannelReader {
    async fn read_text(&mut self) -> Result<String> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data)
                        .map_err(|e| Error::WebSocketError(format!("binary frame: {}", e)));
                }
                // Pings are answered by axum itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    debug!("WebSocket closed by client: {:?}", frame);
                    return Err(Error::ChannelClosed);
                }
                Some(Err(e)) => return Err(Error::WebSocketError(e.to_string())),
                None => return Err(Error::ChannelClosed),
            }
        }
    }
}
