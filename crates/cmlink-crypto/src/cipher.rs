//! Symmetric channel cipher for one encrypted TCP connection.
//!
//! Wire layout of every encrypted payload:
//!
//! ```text
//! [ AES-ECB(IV) : 16 bytes ][ AES-CBC(plaintext, IV) with PKCS7 padding ]
//! ```
//!
//! In HMAC mode the IV is not fully random: its last 3 bytes are random
//! and its first 13 bytes are a truncated HMAC-SHA1 over
//! `random3 ‖ plaintext`, keyed with the first 16 bytes of the session
//! key. The receiver recomputes it after decryption, which authenticates
//! every message without extra bytes on the wire.

use aes::Aes256;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{
    BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, InnerIvInit,
    KeyInit,
};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha1::Sha1;

use crate::CryptoError;

type HmacSha1 = Hmac<Sha1>;
type CbcEncryptor = cbc::Encryptor<Aes256>;
type CbcDecryptor = cbc::Decryptor<Aes256>;

/// Length of a session key in bytes (AES-256).
pub const SESSION_KEY_LEN: usize = 32;

const BLOCK_LEN: usize = 16;
const HMAC_KEY_LEN: usize = 16;
/// Random bytes at the tail of an HMAC-mode IV.
const IV_RANDOM_LEN: usize = 3;
/// Truncated HMAC bytes at the head of an HMAC-mode IV.
const IV_MAC_LEN: usize = BLOCK_LEN - IV_RANDOM_LEN;

/// Encrypts and decrypts the traffic of a single connection.
///
/// Owned exclusively by the transport that negotiated it and dropped with
/// that transport. Not `Clone` on purpose: a session key never outlives
/// its connection.
pub struct ChannelCipher {
    aes: Aes256,
    hmac_key: Option<[u8; HMAC_KEY_LEN]>,
}

impl ChannelCipher {
    /// Builds a cipher from a 32-byte session key.
    ///
    /// With `use_hmac` the IVs are HMAC-derived and authenticated on
    /// decrypt; without it they are fully random.
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidKeyLength`] unless the key is exactly
    /// [`SESSION_KEY_LEN`] bytes.
    pub fn new(session_key: &[u8], use_hmac: bool) -> Result<Self, CryptoError> {
        if session_key.len() != SESSION_KEY_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: SESSION_KEY_LEN,
                actual: session_key.len(),
            });
        }

        let aes = Aes256::new_from_slice(session_key).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: SESSION_KEY_LEN,
                actual: session_key.len(),
            }
        })?;

        let hmac_key = use_hmac.then(|| {
            let mut key = [0u8; HMAC_KEY_LEN];
            key.copy_from_slice(&session_key[..HMAC_KEY_LEN]);
            key
        });

        Ok(Self { aes, hmac_key })
    }

    /// Whether IVs are HMAC-derived and verified.
    pub fn uses_hmac(&self) -> bool {
        self.hmac_key.is_some()
    }

    /// Encrypts one message. Output is `encrypted IV ‖ ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut iv = [0u8; BLOCK_LEN];
        let mut rng = rand::rng();

        match &self.hmac_key {
            Some(key) => {
                rng.fill(&mut iv[IV_MAC_LEN..]);
                let mut mac = <HmacSha1 as Mac>::new_from_slice(key)
                    .map_err(|e| CryptoError::Format(e.to_string()))?;
                mac.update(&iv[IV_MAC_LEN..]);
                mac.update(plaintext);
                let digest = mac.finalize().into_bytes();
                iv[..IV_MAC_LEN].copy_from_slice(&digest[..IV_MAC_LEN]);
            }
            None => rng.fill(&mut iv[..]),
        }

        // The IV itself travels ECB-encrypted; CBC runs with the plain IV.
        let mut encrypted_iv = GenericArray::clone_from_slice(&iv);
        self.aes.encrypt_block(&mut encrypted_iv);

        let ciphertext = CbcEncryptor::inner_iv_init(
            self.aes.clone(),
            GenericArray::from_slice(&iv),
        )
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut out = Vec::with_capacity(BLOCK_LEN + ciphertext.len());
        out.extend_from_slice(&encrypted_iv);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts one message produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    /// - [`CryptoError::Format`]: shorter than IV plus one block, not
    ///   block-aligned, or bad PKCS7 padding without HMAC.
    /// - [`CryptoError::Integrity`]: HMAC mode and either the padding is
    ///   bad or the IV's MAC does not match the plaintext. Fatal to the
    ///   connection.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < BLOCK_LEN * 2 {
            return Err(CryptoError::Format(format!(
                "ciphertext too short: {} bytes",
                data.len()
            )));
        }
        let (encrypted_iv, body) = data.split_at(BLOCK_LEN);
        if body.len() % BLOCK_LEN != 0 {
            return Err(CryptoError::Format(format!(
                "ciphertext not block-aligned: {} bytes",
                body.len()
            )));
        }

        let mut iv = GenericArray::clone_from_slice(encrypted_iv);
        self.aes.decrypt_block(&mut iv);

        // Under HMAC a bad pad can only come from tampering.
        let plaintext = CbcDecryptor::inner_iv_init(self.aes.clone(), &iv)
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| match self.hmac_key {
                Some(_) => CryptoError::Integrity,
                None => CryptoError::Format("invalid PKCS7 padding".into()),
            })?;

        if let Some(key) = &self.hmac_key {
            let mut mac = <HmacSha1 as Mac>::new_from_slice(key)
                .map_err(|e| CryptoError::Format(e.to_string()))?;
            mac.update(&iv[IV_MAC_LEN..]);
            mac.update(&plaintext);
            // Constant-time comparison of the leading 13 bytes.
            mac.verify_truncated_left(&iv[..IV_MAC_LEN])
                .map_err(|_| CryptoError::Integrity)?;
        }

        Ok(plaintext)
    }
}

impl std::fmt::Debug for ChannelCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCipher")
            .field("hmac", &self.uses_hmac())
            .finish_non_exhaustive()
    }
}

/// Generates a fresh random session key.
pub fn generate_session_key() -> [u8; SESSION_KEY_LEN] {
    let mut key = [0u8; SESSION_KEY_LEN];
    rand::rng().fill(&mut key[..]);
    key
}
