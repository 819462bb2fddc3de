//! Transport layer for cmlink.
//!
//! Provides the [`Connection`] trait that abstracts over the two ways a
//! client can reach a CM server, and both implementations:
//!
//! - [`WebSocketConnection`]: one binary WebSocket message per packet,
//!   over TLS, with an inbound size cap.
//! - [`TcpConnection`]: length-and-magic framed TCP, encrypted with a
//!   [`ChannelCipher`](cmlink_crypto::ChannelCipher) negotiated by a
//!   handshake before the connection is handed out.
//!
//! [`CmConnection`] wraps either one so the client can hold a single
//! concrete type.

#![allow(async_fn_in_trait)]

mod error;
mod tcp;
mod websocket;

pub use error::TransportError;
pub use tcp::{MAX_FRAME_LEN, TCP_MAGIC, TcpConnection};
pub use websocket::{DEFAULT_MAX_MESSAGE_SIZE, WebSocketConnection, websocket_url};

pub use cmlink_crypto::RsaPublicKey;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which transport to dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    WebSocket,
    Tcp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocket => f.write_str("websocket"),
            Self::Tcp => f.write_str("tcp"),
        }
    }
}

/// A single connection that can send and receive whole messages.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one message to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// The address this connection was dialed with.
    fn remote_addr(&self) -> &str;
}

/// Either transport, behind one type.
#[derive(Debug)]
pub enum CmConnection {
    WebSocket(WebSocketConnection),
    Tcp(TcpConnection),
}

impl CmConnection {
    /// Dials `addr` with the given transport.
    ///
    /// For TCP this includes the encryption handshake: the returned
    /// connection is already encrypted. `server_key` replaces the
    /// compiled-in CM key for that handshake.
    pub async fn connect(
        kind: TransportKind,
        addr: &str,
        max_message_size: usize,
        server_key: Option<&RsaPublicKey>,
    ) -> Result<Self, TransportError> {
        match (kind, server_key) {
            (TransportKind::WebSocket, _) => {
                WebSocketConnection::connect(addr, max_message_size).await.map(Self::WebSocket)
            }
            (TransportKind::Tcp, Some(key)) => {
                TcpConnection::connect_with_key(addr, key).await.map(Self::Tcp)
            }
            (TransportKind::Tcp, None) => TcpConnection::connect(addr).await.map(Self::Tcp),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::WebSocket(_) => TransportKind::WebSocket,
            Self::Tcp(_) => TransportKind::Tcp,
        }
    }
}

impl Connection for CmConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        match self {
            Self::WebSocket(c) => c.send(data).await,
            Self::Tcp(c) => c.send(data).await,
        }
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        match self {
            Self::WebSocket(c) => c.recv().await,
            Self::Tcp(c) => c.recv().await,
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        match self {
            Self::WebSocket(c) => c.close().await,
            Self::Tcp(c) => c.close().await,
        }
    }

    fn remote_addr(&self) -> &str {
        match self {
            Self::WebSocket(c) => c.remote_addr(),
            Self::Tcp(c) => c.remote_addr(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_default_is_websocket() {
        assert_eq!(TransportKind::default(), TransportKind::WebSocket);
    }

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(TransportKind::WebSocket.to_string(), "websocket");
        assert_eq!(TransportKind::Tcp.to_string(), "tcp");
    }
}
