//! WebSocket transport implementation using `tokio-tungstenite`.

use std::fmt;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Connection, TransportError};

/// Default cap on one inbound WebSocket message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The URL to dial for a CM WebSocket endpoint.
///
/// Addresses that already carry a `ws://` or `wss://` scheme are used
/// verbatim; a bare `host:port` becomes `wss://host:port/cmsocket/`.
pub fn websocket_url(addr: &str) -> String {
    if addr.starts_with("ws://") || addr.starts_with("wss://") {
        addr.to_string()
    } else {
        format!("wss://{addr}/cmsocket/")
    }
}

/// A client-side WebSocket connection to a CM server.
///
/// The stream is split so the read loop can sit in [`recv`](Connection::recv)
/// while other tasks [`send`](Connection::send). Each half has its own
/// lock: concurrent senders are serialized, one message per call.
pub struct WebSocketConnection {
    addr: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    /// Dials the CM at `addr`, refusing inbound messages larger than
    /// `max_message_size`.
    pub async fn connect(addr: &str, max_message_size: usize) -> Result<Self, TransportError> {
        // rustls needs a process-wide provider; an earlier install wins.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let url = websocket_url(addr);
        let config = WebSocketConfig::default()
            .max_message_size(Some(max_message_size))
            .max_frame_size(Some(max_message_size));

        let (ws, _) = tokio_tungstenite::connect_async_with_config(url.as_str(), Some(config), true)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                addr: url.clone(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e),
            })?;

        tracing::debug!(%url, "WebSocket connected");

        let (sink, stream) = ws.split();
        Ok(Self {
            addr: addr.to_string(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

impl fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = Message::Binary(data.to_vec().into());
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(len = text.len(), "ignoring text frame");
                    continue;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
        })
    }

    fn remote_addr(&self) -> &str {
        &self.addr
    }
}
