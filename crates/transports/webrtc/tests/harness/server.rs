//! Relay server on an ephemeral port for WebSocket end-to-end tests

use super::{HarnessError, HarnessResult, WAIT};
use futures::{SinkExt, StreamExt};
use pairlink_webrtc::http::{self, AppState};
use pairlink_webrtc::SessionRegistry;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Running relay server
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<SessionRegistry>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Serve the router for `registry` on 127.0.0.1 with an ephemeral port
    pub async fn start(registry: Arc<SessionRegistry>, page_path: PathBuf) -> HarnessResult<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = http::router(AppState::new(Arc::clone(&registry), page_path));
        let task = tokio::spawn(async move {
            let _ = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await;
        });

        Ok(Self {
            addr,
            registry,
            task,
        })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Open a signaling channel
    pub async fn connect(&self) -> HarnessResult<WsClient> {
        let (stream, _) = connect_async(self.ws_url())
            .await
            .map_err(|e| HarnessError::Connection(e.to_string()))?;
        Ok(WsClient { stream })
    }

    /// Issue a plain HTTP/1.1 GET and return the status code and body
    pub async fn get(&self, path: &str) -> HarnessResult<(u16, String)> {
        let mut stream = TcpStream::connect(self.addr).await?;
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, self.addr
        );
        stream.write_all(request.as_bytes()).await?;

        let mut response = String::new();
        stream.read_to_string(&mut response).await?;

        let status = response
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .ok_or_else(|| HarnessError::Protocol(format!("bad status line: {}", response)))?;
        let body = response
            .split_once("\r\n\r\n")
            .map(|(_, body)| body.to_string())
            .unwrap_or_default();

        Ok((status, body))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// WebSocket signaling client
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn send_json(&mut self, value: Value) -> HarnessResult<()> {
        self.stream
            .send(Message::Text(value.to_string()))
            .await
            .map_err(|e| HarnessError::Connection(e.to_string()))
    }

    /// Next JSON message from the server
    pub async fn recv_json(&mut self) -> HarnessResult<Value> {
        loop {
            let next = tokio::time::timeout(WAIT, self.stream.next())
                .await
                .map_err(|_| HarnessError::Timeout("signaling message".to_string()))?;

            match next {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text)
                        .map_err(|e| HarnessError::Protocol(e.to_string()));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(other)) => {
                    return Err(HarnessError::Protocol(format!("unexpected frame: {:?}", other)))
                }
                Some(Err(e)) => return Err(HarnessError::Connection(e.to_string())),
                None => return Err(HarnessError::Connection("stream ended".to_string())),
            }
        }
    }

    /// Wait until the server closes the connection
    pub async fn wait_closed(&mut self) -> HarnessResult<()> {
        loop {
            let next = tokio::time::timeout(WAIT, self.stream.next())
                .await
                .map_err(|_| HarnessError::Timeout("connection close".to_string()))?;

            match next {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return Ok(()),
                Some(Ok(_)) => continue,
            }
        }
    }

    pub async fn close(mut self) -> HarnessResult<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| HarnessError::Connection(e.to_string()))
    }
}
