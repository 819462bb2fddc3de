//! Error types for the protocol layer.
//!
//! Each crate in cmlink defines its own error enum. A `ProtocolError`
//! always means "these bytes are not a valid CM message", never a
//! network failure and never a crypto failure. It is scoped to the one
//! decode that produced it: the read loop logs it and moves on.

/// Errors that can occur while encoding or decoding CM messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The input ended before a declared length was satisfied.
    ///
    /// `what` names the stage that ran short (EMsg, header length,
    /// header bytes, legacy header, sub-message length, ...).
    #[error("truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// The protobuf header could not be decoded.
    #[error("invalid packet header: {0}")]
    Header(#[source] prost::DecodeError),

    /// A protobuf message body could not be decoded.
    #[error("invalid {what} body: {source}")]
    Body {
        what: &'static str,
        #[source]
        source: prost::DecodeError,
    },

    /// A gzip-compressed Multi payload could not be inflated.
    #[error("multi decompression failed: {0}")]
    Decompress(#[source] std::io::Error),

    /// A packet arrived with a different EMsg than the exchange requires.
    #[error("expected {expected}, got {actual}")]
    UnexpectedEMsg {
        expected: crate::EMsg,
        actual: crate::EMsg,
    },

    /// The bytes parse but violate a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Shorthand for building a [`ProtocolError::Truncated`].
    pub(crate) fn truncated(what: &'static str, needed: usize, available: usize) -> Self {
        Self::Truncated {
            what,
            needed,
            available,
        }
    }
}
