//! Unified error type for the cmlink client.

use cmlink_protocol::{EResult, ProtocolError};
use cmlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `cmlink` crate you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each wrapping variant generates the `From` impl, so `?`
/// converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Dialing, handshake, or another connection-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Bytes that are not a valid CM message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Discovery returned no server for the configured transport.
    #[error("no {0} servers available")]
    NoServers(cmlink_transport::TransportKind),

    /// The discovery collaborator failed.
    #[error("server discovery failed: {0}")]
    Discovery(String),

    /// The operation needs a live connection and there is none.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called while a connection is already held.
    #[error("already connected")]
    AlreadyConnected,

    /// The server answered the logon with a non-OK result.
    #[error("logon rejected: {0}")]
    Login(EResult),

    /// A request/response exchange failed; the variant names the phase.
    #[error(transparent)]
    Request(#[from] RequestError),
}

/// A failed request, by the phase it failed in.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The encoded packet does not fit in one frame.
    #[error("{what}: encoded packet of {size} bytes exceeds limit of {limit}")]
    Encode {
        what: String,
        size: usize,
        limit: usize,
    },

    /// Writing the request to the transport failed.
    #[error("{what}: send failed: {source}")]
    Send {
        what: String,
        #[source]
        source: TransportError,
    },

    /// No response arrived.
    #[error("{what}: {source}")]
    Await {
        what: String,
        #[source]
        source: WaitError,
    },

    /// The response arrived but its body could not be decoded.
    #[error("{what}: bad response: {source}")]
    Decode {
        what: String,
        #[source]
        source: ProtocolError,
    },

    /// The server answered with a non-OK result.
    #[error("{what}: server returned {result}")]
    Rejected { what: String, result: EResult },
}

/// Why a wait for a response ended without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// The configured request timeout elapsed.
    #[error("timed out waiting for response")]
    Timeout,

    /// The connection closed while waiting.
    #[error("connection closed while waiting for response")]
    Disconnected,
}
