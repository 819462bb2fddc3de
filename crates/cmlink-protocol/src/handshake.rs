//! Channel-encryption handshake messages.
//!
//! These three messages travel in the clear over TCP before any session
//! exists, and use the short 20-byte header:
//!
//! ```text
//! [EMsg u32][target_job u64][source_job u64][body]
//! ```
//!
//! Only the byte layouts live here. Driving the exchange (reading,
//! writing, installing the cipher) is the TCP transport's job.

use crate::packet::read_u32;
use crate::{EMsg, EResult, NO_JOB, ProtocolError};

/// Size of the short handshake header.
pub const HANDSHAKE_HEADER_LEN: usize = 20;

/// Length of the optional server challenge.
pub const CHALLENGE_LEN: usize = 16;

const RESPONSE_PROTOCOL_VERSION: u32 = 1;
const RESPONSE_KEY_SIZE: u32 = 128;

/// Splits a handshake message into its EMsg and body, checking the tag.
fn split(data: &[u8], expected: EMsg) -> Result<&[u8], ProtocolError> {
    if data.len() < HANDSHAKE_HEADER_LEN {
        return Err(ProtocolError::truncated(
            "handshake header",
            HANDSHAKE_HEADER_LEN,
            data.len(),
        ));
    }
    let (actual, _) = EMsg::from_raw(read_u32(data, 0, "EMsg")?);
    if actual != expected {
        return Err(ProtocolError::UnexpectedEMsg { expected, actual });
    }
    Ok(&data[HANDSHAKE_HEADER_LEN..])
}

fn header(emsg: EMsg, body_len: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HANDSHAKE_HEADER_LEN + body_len);
    buf.extend_from_slice(&emsg.to_raw(false).to_le_bytes());
    buf.extend_from_slice(&NO_JOB.to_le_bytes());
    buf.extend_from_slice(&NO_JOB.to_le_bytes());
    buf
}

/// The server's opening message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptRequest {
    pub protocol_version: u32,
    pub universe: u32,
    /// Present when the server wants HMAC-authenticated IVs.
    pub challenge: Option<[u8; CHALLENGE_LEN]>,
}

impl EncryptRequest {
    /// Parses a ChannelEncryptRequest.
    ///
    /// The challenge is taken from body bytes 8..24 when the body is long
    /// enough; a shorter body simply has none.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let body = split(data, EMsg::ChannelEncryptRequest)?;
        let protocol_version = read_u32(body, 0, "encrypt request version")?;
        let universe = read_u32(body, 4, "encrypt request universe")?;
        let challenge = body
            .get(8..8 + CHALLENGE_LEN)
            .and_then(|c| <[u8; CHALLENGE_LEN]>::try_from(c).ok());

        Ok(Self {
            protocol_version,
            universe,
            challenge,
        })
    }

    /// Wire form, as a server would send it.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = header(EMsg::ChannelEncryptRequest, 8 + CHALLENGE_LEN);
        buf.extend_from_slice(&self.protocol_version.to_le_bytes());
        buf.extend_from_slice(&self.universe.to_le_bytes());
        if let Some(challenge) = &self.challenge {
            buf.extend_from_slice(challenge);
        }
        buf
    }
}

/// The client's reply carrying the RSA-wrapped session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptResponse {
    pub encrypted_key: Vec<u8>,
}

impl EncryptResponse {
    /// Wire form: version 1, key size 128, the blob, its CRC-32, and a
    /// trailing zero word.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = header(EMsg::ChannelEncryptResponse, 16 + self.encrypted_key.len());
        buf.extend_from_slice(&RESPONSE_PROTOCOL_VERSION.to_le_bytes());
        buf.extend_from_slice(&RESPONSE_KEY_SIZE.to_le_bytes());
        buf.extend_from_slice(&self.encrypted_key);
        buf.extend_from_slice(&crc32fast::hash(&self.encrypted_key).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf
    }

    /// Parses a ChannelEncryptResponse and verifies its checksum.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let body = split(data, EMsg::ChannelEncryptResponse)?;
        let key_size = read_u32(body, 4, "encrypt response key size")? as usize;
        let key_end = 8 + key_size;
        let crc = read_u32(body, key_end, "encrypt response crc")?;
        let encrypted_key = body[8..key_end].to_vec();

        if crc32fast::hash(&encrypted_key) != crc {
            return Err(ProtocolError::InvalidMessage(
                "encrypt response key checksum mismatch".into(),
            ));
        }
        Ok(Self { encrypted_key })
    }
}

/// The server's verdict on the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptResult {
    pub result: EResult,
}

impl EncryptResult {
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let body = split(data, EMsg::ChannelEncryptResult)?;
        let result = read_u32(body, 0, "encrypt result")?;
        Ok(Self {
            result: EResult(result as i32),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = header(EMsg::ChannelEncryptResult, 4);
        buf.extend_from_slice(&(self.result.0 as u32).to_le_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_with_challenge() {
        let req = EncryptRequest {
            protocol_version: 1,
            universe: 1,
            challenge: Some([7u8; CHALLENGE_LEN]),
        };
        let wire = req.encode();
        assert_eq!(wire.len(), HANDSHAKE_HEADER_LEN + 24);
        assert_eq!(&wire[4..20], &[0xFF; 16]);
        assert_eq!(EncryptRequest::decode(&wire).unwrap(), req);
    }

    #[test]
    fn test_request_without_challenge() {
        let req = EncryptRequest {
            protocol_version: 1,
            universe: 1,
            challenge: None,
        };
        let decoded = EncryptRequest::decode(&req.encode()).unwrap();
        assert_eq!(decoded.challenge, None);
    }

    #[test]
    fn test_request_wrong_emsg() {
        let wire = EncryptResult { result: EResult::OK }.encode();
        assert!(matches!(
            EncryptRequest::decode(&wire).unwrap_err(),
            ProtocolError::UnexpectedEMsg {
                expected: EMsg::ChannelEncryptRequest,
                actual: EMsg::ChannelEncryptResult,
            }
        ));
    }

    #[test]
    fn test_request_too_short() {
        let wire = header(EMsg::ChannelEncryptRequest, 0);
        assert!(matches!(
            EncryptRequest::decode(&wire).unwrap_err(),
            ProtocolError::Truncated { .. }
        ));
    }

    #[test]
    fn test_response_layout() {
        let blob = vec![0x5Au8; 128];
        let wire = EncryptResponse {
            encrypted_key: blob.clone(),
        }
        .encode();

        let body = &wire[HANDSHAKE_HEADER_LEN..];
        assert_eq!(&wire[0..4], &1304u32.to_le_bytes());
        assert_eq!(&body[0..4], &1u32.to_le_bytes());
        assert_eq!(&body[4..8], &128u32.to_le_bytes());
        assert_eq!(&body[8..136], blob.as_slice());
        assert_eq!(&body[136..140], &crc32fast::hash(&blob).to_le_bytes());
        assert_eq!(&body[140..144], &[0, 0, 0, 0]);
        assert_eq!(body.len(), 144);
    }

    #[test]
    fn test_response_bad_crc_rejected() {
        let mut wire = EncryptResponse {
            encrypted_key: vec![1u8; 128],
        }
        .encode();
        wire[HANDSHAKE_HEADER_LEN + 8] ^= 0xFF;
        assert!(matches!(
            EncryptResponse::decode(&wire).unwrap_err(),
            ProtocolError::InvalidMessage(_)
        ));
    }

    #[test]
    fn test_result_decode() {
        let wire = EncryptResult {
            result: EResult::InvalidParam,
        }
        .encode();
        assert_eq!(EncryptResult::decode(&wire).unwrap().result, EResult::InvalidParam);
    }
}
