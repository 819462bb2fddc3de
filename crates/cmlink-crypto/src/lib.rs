//! Channel encryption for cmlink.
//!
//! Two pieces, both used by the TCP transport's encryption handshake:
//!
//! - [`ChannelCipher`]: AES-256 with ECB-encrypted IVs and CBC bodies,
//!   optionally authenticated with an HMAC-SHA1-derived IV.
//! - [`encrypt_session_key`]: RSA-OAEP wrap of a fresh session key with
//!   the CM server's compiled-in public key.
//!
//! The WebSocket transport relies on TLS instead and never touches this
//! crate.

mod cipher;
mod error;
mod rsa_key;

pub use cipher::{ChannelCipher, SESSION_KEY_LEN, generate_session_key};
pub use error::CryptoError;
pub use rsa_key::{cm_public_key, encrypt_session_key, encrypt_session_key_with};

/// Re-exported so callers can name key types without a direct `rsa` dependency.
pub use rsa::RsaPublicKey;
