//! Error types for the crypto layer.

/// Errors that can occur while encrypting or decrypting channel traffic.
///
/// The variants map onto how the connection reacts: a `Format` error is
/// a malformed payload, an `Integrity` error means someone tampered with
/// (or corrupted) the stream and the connection must be dropped.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The session key is not exactly 32 bytes.
    #[error("session key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// The ciphertext is truncated, not block-aligned, or badly padded.
    #[error("malformed ciphertext: {0}")]
    Format(String),

    /// The HMAC embedded in the IV does not match the decrypted plaintext.
    #[error("HMAC verification failed")]
    Integrity,

    /// RSA key parsing or OAEP encryption failed.
    #[error("rsa: {0}")]
    Rsa(String),
}

impl From<rsa::Error> for CryptoError {
    fn from(e: rsa::Error) -> Self {
        Self::Rsa(e.to_string())
    }
}
