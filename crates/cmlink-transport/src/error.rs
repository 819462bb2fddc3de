use cmlink_crypto::CryptoError;
use cmlink_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Dialing the server failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A TCP frame carried the wrong magic. The stream is desynchronized
    /// and the connection cannot be used any further.
    #[error("bad frame magic 0x{0:08X}")]
    BadMagic(u32),

    /// A frame or message declared a length beyond the configured cap.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// Encrypting or decrypting a frame failed. An integrity failure is
    /// fatal to the connection.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The channel-encryption handshake did not complete.
    #[error("encryption handshake failed: {0}")]
    Handshake(String),

    /// A handshake message could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
