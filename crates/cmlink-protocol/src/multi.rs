//! Multi-message expansion.
//!
//! A [`EMsg::Multi`] packet carries a [`CMsgMulti`] body whose payload is
//! a run of `[len u32 LE][packet bytes]` entries, optionally gzipped.
//! Entries may themselves be Multi packets; [`expand_multi`] flattens the
//! whole tree and returns the leaves in wire order.

use std::io::Read;

use flate2::read::GzDecoder;

use crate::messages::CMsgMulti;
use crate::packet::read_u32;
use crate::{EMsg, Packet, ProtocolError};

/// Upper bound on an inflated Multi payload.
pub const MAX_UNZIPPED_LEN: usize = 64 * 1024 * 1024;

/// How deep Multi packets may nest inside one another.
const MAX_DEPTH: usize = 8;

/// Flattens a Multi packet into its non-Multi sub-packets, in order.
///
/// Expansion is all-or-nothing: if any entry at any depth fails to
/// decompress or decode, the whole batch is rejected and no sub-packet is
/// returned.
///
/// # Errors
/// - [`ProtocolError::UnexpectedEMsg`] if `packet` is not a Multi.
/// - [`ProtocolError::Body`] if the `CMsgMulti` body is malformed.
/// - [`ProtocolError::Decompress`] if the gzip stream is invalid or
///   inflates past [`MAX_UNZIPPED_LEN`].
/// - [`ProtocolError::Truncated`] if an entry's length prefix overruns.
pub fn expand_multi(packet: &Packet) -> Result<Vec<Packet>, ProtocolError> {
    if packet.emsg != EMsg::Multi {
        return Err(ProtocolError::UnexpectedEMsg {
            expected: EMsg::Multi,
            actual: packet.emsg,
        });
    }
    let mut out = Vec::new();
    expand_into(packet, 0, &mut out)?;
    Ok(out)
}

fn expand_into(packet: &Packet, depth: usize, out: &mut Vec<Packet>) -> Result<(), ProtocolError> {
    if depth >= MAX_DEPTH {
        return Err(ProtocolError::InvalidMessage(format!(
            "multi nested deeper than {MAX_DEPTH}"
        )));
    }

    let multi: CMsgMulti = packet.decode_body("Multi")?;
    let payload = multi.message_body.unwrap_or_default();
    let payload = match multi.size_unzipped {
        Some(size) if size > 0 => inflate(&payload, size as usize)?,
        _ => payload,
    };

    for entry in split_entries(&payload)? {
        let sub = Packet::decode(entry)?;
        if sub.emsg == EMsg::Multi {
            expand_into(&sub, depth + 1, out)?;
        } else {
            out.push(sub);
        }
    }
    Ok(())
}

fn inflate(compressed: &[u8], size_hint: usize) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(size_hint.min(MAX_UNZIPPED_LEN));
    GzDecoder::new(compressed)
        .take(MAX_UNZIPPED_LEN as u64 + 1)
        .read_to_end(&mut buf)
        .map_err(ProtocolError::Decompress)?;

    if buf.len() > MAX_UNZIPPED_LEN {
        return Err(ProtocolError::Decompress(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("inflated payload exceeds {MAX_UNZIPPED_LEN} bytes"),
        )));
    }
    if buf.len() != size_hint {
        tracing::debug!(
            declared = size_hint,
            actual = buf.len(),
            "multi unzipped size differs from declared"
        );
    }
    Ok(buf)
}

/// Splits a payload into its length-prefixed entries.
fn split_entries(payload: &[u8]) -> Result<Vec<&[u8]>, ProtocolError> {
    let mut entries = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        let len = read_u32(payload, offset, "multi entry length")? as usize;
        let start = offset + 4;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= payload.len())
            .ok_or_else(|| {
                ProtocolError::truncated("multi entry", start.saturating_add(len), payload.len())
            })?;
        entries.push(&payload[start..end]);
        offset = end;
    }
    Ok(entries)
}
