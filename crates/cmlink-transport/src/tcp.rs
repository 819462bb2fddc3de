//! Framed, encrypted TCP transport.
//!
//! Every message travels in one frame:
//!
//! ```text
//! [payload_len u32 LE][magic "VT01" u32 LE][payload]
//! ```
//!
//! Before the connection is usable the client runs the channel-encryption
//! handshake in the clear. After it, every payload is encrypted with the
//! negotiated [`ChannelCipher`].

use std::fmt;
use std::net::Shutdown;

use cmlink_crypto::{ChannelCipher, RsaPublicKey, cm_public_key, encrypt_session_key_with, generate_session_key};
use cmlink_protocol::EResult;
use cmlink_protocol::handshake::{EncryptRequest, EncryptResponse, EncryptResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::{Connection, TransportError};

/// Frame magic, `"VT01"` read as a little-endian `u32`.
pub const TCP_MAGIC: u32 = 0x3130_5456;

/// Largest payload a frame may declare.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const FRAME_HEADER_LEN: usize = 8;

/// A TCP connection to a CM server with channel encryption established.
pub struct TcpConnection {
    addr: String,
    /// Second handle on the socket, used to shut down both directions
    /// while the reader may be parked in `recv`.
    socket: std::net::TcpStream,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    cipher: Option<ChannelCipher>,
}

impl TcpConnection {
    /// Dials `addr` and runs the encryption handshake against the CM's
    /// compiled-in public key.
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        Self::connect_with_key(addr, &cm_public_key()?).await
    }

    /// Same as [`connect`](Self::connect), wrapping the session key for
    /// `server_key` instead.
    pub async fn connect_with_key(addr: &str, server_key: &RsaPublicKey) -> Result<Self, TransportError> {
        let dial_error = |source| TransportError::ConnectFailed {
            addr: addr.to_string(),
            source,
        };
        let stream = TcpStream::connect(addr).await.map_err(dial_error)?;
        tracing::debug!(addr, "TCP connected, starting encryption handshake");

        let mut conn = Self::from_stream(stream, addr.to_string()).map_err(dial_error)?;
        conn.handshake(server_key).await?;
        Ok(conn)
    }

    pub(crate) fn from_stream(stream: TcpStream, addr: String) -> std::io::Result<Self> {
        let std_stream = stream.into_std()?;
        let socket = std_stream.try_clone()?;
        let (reader, writer) = TcpStream::from_std(std_stream)?.into_split();
        Ok(Self {
            addr,
            socket,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            cipher: None,
        })
    }

    /// Runs the channel-encryption handshake and installs the cipher.
    ///
    /// HMAC-authenticated IVs are used iff the server sent a challenge.
    pub(crate) async fn handshake(&mut self, server_key: &RsaPublicKey) -> Result<(), TransportError> {
        let request = self.recv_plain("ChannelEncryptRequest").await?;
        let request = EncryptRequest::decode(&request).map_err(handshake_error)?;
        tracing::debug!(
            protocol_version = request.protocol_version,
            universe = request.universe,
            challenge = request.challenge.is_some(),
            "received ChannelEncryptRequest"
        );

        let session_key = generate_session_key();
        let challenge = request.challenge.as_ref().map(|c| c.as_slice());
        let encrypted_key = encrypt_session_key_with(server_key, &session_key, challenge)?;

        let response = EncryptResponse { encrypted_key }.encode();
        write_frame(&mut *self.writer.lock().await, &response).await?;

        let result = self.recv_plain("ChannelEncryptResult").await?;
        let result = EncryptResult::decode(&result).map_err(handshake_error)?;
        if result.result != EResult::OK {
            return Err(TransportError::Handshake(format!(
                "server rejected channel encryption: {}",
                result.result
            )));
        }

        self.cipher = Some(ChannelCipher::new(&session_key, request.challenge.is_some())?);
        tracing::debug!(addr = %self.addr, "channel encrypted");
        Ok(())
    }

    async fn recv_plain(&self, what: &str) -> Result<Vec<u8>, TransportError> {
        read_frame(&mut *self.reader.lock().await)
            .await?
            .ok_or_else(|| TransportError::Handshake(format!("connection closed awaiting {what}")))
    }
}

fn handshake_error(e: cmlink_protocol::ProtocolError) -> TransportError {
    TransportError::Handshake(e.to_string())
}

impl fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnection")
            .field("addr", &self.addr)
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let payload = match &self.cipher {
            Some(cipher) => cipher.encrypt(data)?,
            None => data.to_vec(),
        };
        write_frame(&mut *self.writer.lock().await, &payload).await
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let Some(payload) = read_frame(&mut *self.reader.lock().await).await? else {
            return Ok(None);
        };
        match &self.cipher {
            Some(cipher) => Ok(Some(cipher.decrypt(&payload)?)),
            None => Ok(Some(payload)),
        }
    }

    /// Shuts down both directions. A `recv` in progress sees the end of
    /// the stream and returns `Ok(None)`.
    async fn close(&self) -> Result<(), Self::Error> {
        // Held so no frame is cut off halfway.
        let _writer = self.writer.lock().await;
        match self.socket.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != std::io::ErrorKind::NotConnected => Err(TransportError::SendFailed(e)),
            _ => Ok(()),
        }
    }

    fn remote_addr(&self) -> &str {
        &self.addr
    }
}

/// Writes one frame. The header and payload go out in a single write so a
/// frame is never interleaved with another.
pub(crate) async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&TCP_MAGIC.to_le_bytes());
    frame.extend_from_slice(payload);

    writer.write_all(&frame).await.map_err(TransportError::SendFailed)?;
    writer.flush().await.map_err(TransportError::SendFailed)
}

/// Reads one frame. `Ok(None)` means the peer closed between frames.
///
/// A wrong magic is [`TransportError::BadMagic`]: the stream cannot be
/// resynchronized, so the caller must drop the connection.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::ReceiveFailed(e)),
    }

    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let magic = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if magic != TCP_MAGIC {
        return Err(TransportError::BadMagic(magic));
    }
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(TransportError::ReceiveFailed)?;
    Ok(Some(payload))
}
