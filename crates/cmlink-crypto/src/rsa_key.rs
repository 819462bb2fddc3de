//! RSA-OAEP wrapping of the session key during the TCP handshake.

use rand_core::OsRng;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;

use crate::CryptoError;

/// The CM server's public key for the Public universe (DER, SubjectPublicKeyInfo).
///
/// Compiled in; the handshake never accepts a key from the network.
const CM_PUBLIC_KEY_DER: &[u8] = &[
    0x30, 0x81, 0x9D, 0x30, 0x0D, 0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01,
    0x05, 0x00, 0x03, 0x81, 0x8B, 0x00, 0x30, 0x81, 0x87, 0x02, 0x81, 0x81, 0x00, 0xDF, 0xEC, 0x1A,
    0xD6, 0x2C, 0x10, 0x66, 0x2C, 0x17, 0x35, 0x3A, 0x14, 0xB0, 0x7C, 0x59, 0x11, 0x7F, 0x9D, 0xD3,
    0xD8, 0x2B, 0x7A, 0xE3, 0xE0, 0x15, 0xCD, 0x19, 0x1E, 0x46, 0xE8, 0x7B, 0x87, 0x74, 0xA2, 0x18,
    0x46, 0x31, 0xA9, 0x03, 0x14, 0x79, 0x82, 0x8E, 0xE9, 0x45, 0xA2, 0x49, 0x12, 0xA9, 0x23, 0x68,
    0x73, 0x89, 0xCF, 0x69, 0xA1, 0xB1, 0x61, 0x46, 0xBD, 0xC1, 0xBE, 0xBF, 0xD6, 0x01, 0x1B, 0xD8,
    0x81, 0xD4, 0xDC, 0x90, 0xFB, 0xFE, 0x4F, 0x52, 0x73, 0x66, 0xCB, 0x95, 0x70, 0xD7, 0xC5, 0x8E,
    0xBA, 0x1C, 0x7A, 0x33, 0x75, 0xA1, 0x62, 0x34, 0x46, 0xBB, 0x60, 0xB7, 0x80, 0x68, 0xFA, 0x13,
    0xA7, 0x7A, 0x8A, 0x37, 0x4B, 0x9E, 0xC6, 0xF4, 0x5D, 0x5F, 0x3A, 0x99, 0xF9, 0x9E, 0xC4, 0x3A,
    0xE9, 0x63, 0xA2, 0xBB, 0x88, 0x19, 0x28, 0xE0, 0xE7, 0x14, 0xC0, 0x42, 0x89, 0x02, 0x01, 0x11,
];

/// Parses the compiled-in CM public key.
pub fn cm_public_key() -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_der(CM_PUBLIC_KEY_DER)
        .map_err(|e| CryptoError::Rsa(e.to_string()))
}

/// Encrypts `session_key ‖ challenge` for the CM server (OAEP, SHA-1).
pub fn encrypt_session_key(
    session_key: &[u8],
    challenge: Option<&[u8]>,
) -> Result<Vec<u8>, CryptoError> {
    encrypt_session_key_with(&cm_public_key()?, session_key, challenge)
}

/// Same as [`encrypt_session_key`] against an explicit public key.
pub fn encrypt_session_key_with(
    public_key: &RsaPublicKey,
    session_key: &[u8],
    challenge: Option<&[u8]>,
) -> Result<Vec<u8>, CryptoError> {
    let mut blob = Vec::with_capacity(session_key.len() + challenge.map_or(0, <[u8]>::len));
    blob.extend_from_slice(session_key);
    if let Some(challenge) = challenge {
        blob.extend_from_slice(challenge);
    }

    Ok(public_key.encrypt(&mut OsRng, Oaep::new::<Sha1>(), &blob)?)
}

#[cfg(test)]
mod tests {
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::DecodePrivateKey;

    use super::*;

    const TEST_PRIVATE_KEY: &str = include_str!("../testdata/test_rsa_1024.pem");

    #[test]
    fn test_embedded_key_parses_as_1024_bit() {
        use rsa::traits::PublicKeyParts;
        let key = cm_public_key().unwrap();
        assert_eq!(key.size(), 128);
    }

    #[test]
    fn test_embedded_key_produces_128_byte_blob() {
        let blob = encrypt_session_key(&[1u8; 32], Some(&[2u8; 16])).unwrap();
        assert_eq!(blob.len(), 128);
    }

    #[test]
    fn test_session_key_and_challenge_unwrap_with_private_key() {
        let private = RsaPrivateKey::from_pkcs8_pem(TEST_PRIVATE_KEY).unwrap();
        let public = RsaPublicKey::from(&private);

        let blob = encrypt_session_key_with(&public, &[9u8; 32], Some(&[5u8; 16])).unwrap();
        let plain = private.decrypt(Oaep::new::<Sha1>(), &blob).unwrap();

        assert_eq!(&plain[..32], &[9u8; 32]);
        assert_eq!(&plain[32..], &[5u8; 16]);
    }

    #[test]
    fn test_no_challenge_wraps_key_only() {
        let private = RsaPrivateKey::from_pkcs8_pem(TEST_PRIVATE_KEY).unwrap();
        let public = RsaPublicKey::from(&private);

        let blob = encrypt_session_key_with(&public, &[3u8; 32], None).unwrap();
        let plain = private.decrypt(Oaep::new::<Sha1>(), &blob).unwrap();
        assert_eq!(plain, vec![3u8; 32]);
    }
}
