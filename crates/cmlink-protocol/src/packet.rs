//! Packet envelope encoding and decoding.
//!
//! Two envelopes share one leading field, the little-endian EMsg. Bit 31
//! of it (the proto mask) selects the rest of the layout:
//!
//! ```text
//! protobuf:  [EMsg|mask u32][header_len u32][PacketHeader][body]
//!
//! legacy:    [EMsg u32][header_size=36 u8][header_version=2 u16]
//!            [target_job u64][source_job u64][canary=0xEF u8]
//!            [steam_id u64][session_id i32][body]
//! ```
//!
//! All integers are little-endian. Decoding checks every declared length
//! against the available bytes and returns [`ProtocolError::Truncated`]
//! instead of panicking on short input.

use prost::Message;

use crate::{EMsg, NO_JOB, PacketHeader, ProtocolError};

/// Total size of the legacy extended header, EMsg included.
pub const LEGACY_HEADER_LEN: usize = 36;
const LEGACY_HEADER_VERSION: u16 = 2;
const LEGACY_CANARY: u8 = 0xEF;

/// One decoded CM message.
///
/// Built by [`Packet::decode`] or by a caller about to [`encode`](Packet::encode)
/// it. The body stays opaque here; feature code decodes it with
/// [`Packet::decode_body`].
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Message type tag (without the proto mask).
    pub emsg: EMsg,
    /// `true` for the protobuf envelope, `false` for the legacy one.
    pub is_proto: bool,
    /// Header fields. For legacy packets only identity, session and job
    /// ids are populated.
    pub header: PacketHeader,
    /// Raw message body.
    pub body: Vec<u8>,
}

impl Packet {
    /// A protobuf-envelope packet with the given header and serialized body.
    pub fn proto(emsg: EMsg, header: PacketHeader, body: Vec<u8>) -> Self {
        Self {
            emsg,
            is_proto: true,
            header,
            body,
        }
    }

    /// A protobuf-envelope packet whose body is `message` serialized.
    pub fn from_message(emsg: EMsg, header: PacketHeader, message: &impl Message) -> Self {
        Self::proto(emsg, header, message.encode_to_vec())
    }

    /// A legacy-envelope packet. Only `steamid` and `client_sessionid` of
    /// the header reach the wire.
    pub fn legacy(emsg: EMsg, header: PacketHeader, body: Vec<u8>) -> Self {
        Self {
            emsg,
            is_proto: false,
            header,
            body,
        }
    }

    /// Serializes the packet into its wire form.
    pub fn encode(&self) -> Vec<u8> {
        if self.is_proto {
            self.encode_proto()
        } else {
            self.encode_legacy()
        }
    }

    fn encode_proto(&self) -> Vec<u8> {
        let header = self.header.encode_to_vec();
        let mut buf = Vec::with_capacity(8 + header.len() + self.body.len());
        buf.extend_from_slice(&self.emsg.to_raw(true).to_le_bytes());
        buf.extend_from_slice(&(header.len() as u32).to_le_bytes());
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&self.body);
        buf
    }

    fn encode_legacy(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(LEGACY_HEADER_LEN + self.body.len());
        buf.extend_from_slice(&self.emsg.to_raw(false).to_le_bytes());
        buf.push(LEGACY_HEADER_LEN as u8);
        buf.extend_from_slice(&LEGACY_HEADER_VERSION.to_le_bytes());
        buf.extend_from_slice(&NO_JOB.to_le_bytes());
        buf.extend_from_slice(&NO_JOB.to_le_bytes());
        buf.push(LEGACY_CANARY);
        buf.extend_from_slice(&self.header.steam_id().to_u64().to_le_bytes());
        buf.extend_from_slice(&self.header.session_id().to_le_bytes());
        buf.extend_from_slice(&self.body);
        buf
    }

    /// Parses wire bytes into a packet.
    ///
    /// # Errors
    /// - [`ProtocolError::Truncated`]: fewer bytes than the EMsg, the
    ///   header length field, the declared header, or the legacy header.
    /// - [`ProtocolError::Header`]: the protobuf header is malformed.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let raw = read_u32(data, 0, "EMsg")?;
        let (emsg, is_proto) = EMsg::from_raw(raw);

        if is_proto {
            Self::decode_proto(emsg, data)
        } else {
            Self::decode_legacy(emsg, data)
        }
    }

    fn decode_proto(emsg: EMsg, data: &[u8]) -> Result<Self, ProtocolError> {
        let header_len = read_u32(data, 4, "header length")? as usize;
        let header_end = 8usize
            .checked_add(header_len)
            .ok_or_else(|| ProtocolError::InvalidMessage("header length overflow".into()))?;
        if data.len() < header_end {
            return Err(ProtocolError::truncated("packet header", header_end, data.len()));
        }

        let header = PacketHeader::decode(&data[8..header_end]).map_err(ProtocolError::Header)?;

        Ok(Self {
            emsg,
            is_proto: true,
            header,
            body: data[header_end..].to_vec(),
        })
    }

    fn decode_legacy(emsg: EMsg, data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < LEGACY_HEADER_LEN {
            return Err(ProtocolError::truncated(
                "legacy header",
                LEGACY_HEADER_LEN,
                data.len(),
            ));
        }

        let header = PacketHeader {
            steamid: Some(read_u64(data, 24, "steam id")?),
            client_sessionid: Some(read_u32(data, 32, "session id")? as i32),
            jobid_target: Some(read_u64(data, 7, "target job")?),
            jobid_source: Some(read_u64(data, 15, "source job")?),
            ..PacketHeader::default()
        };

        Ok(Self {
            emsg,
            is_proto: false,
            header,
            body: data[LEGACY_HEADER_LEN..].to_vec(),
        })
    }

    /// Decodes the body as protobuf message `M`.
    ///
    /// `what` names the message in the error, e.g. `"ClientLogonResponse"`.
    pub fn decode_body<M: Message + Default>(&self, what: &'static str) -> Result<M, ProtocolError> {
        M::decode(self.body.as_slice()).map_err(|source| ProtocolError::Body { what, source })
    }
}

/// Reads a little-endian `u32` at `offset`, or reports which field ran short.
pub(crate) fn read_u32(data: &[u8], offset: usize, what: &'static str) -> Result<u32, ProtocolError> {
    let end = offset + 4;
    data.get(offset..end)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| ProtocolError::truncated(what, end, data.len()))
}

/// Reads a little-endian `u64` at `offset`, or reports which field ran short.
pub(crate) fn read_u64(data: &[u8], offset: usize, what: &'static str) -> Result<u64, ProtocolError> {
    let end = offset + 8;
    data.get(offset..end)
        .and_then(|b| <[u8; 8]>::try_from(b).ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| ProtocolError::truncated(what, end, data.len()))
}
