//! Wire protocol for cmlink.
//!
//! This crate defines the bytes a CM client and server exchange:
//!
//! - **Registry** ([`EMsg`]): the numeric message tags.
//! - **Envelopes** ([`Packet`], [`PacketHeader`]): protobuf and legacy
//!   framing around a message body.
//! - **Bodies** ([`messages`]): the protobuf payloads the client uses.
//! - **Multi** ([`multi::expand_multi`]): unpacking batched messages.
//! - **Handshake** ([`handshake`]): the plaintext channel-encryption
//!   exchange used by the TCP transport.
//!
//! # Architecture
//!
//! The protocol layer sits between the transports (framed bytes) and the
//! client (sessions, jobs, handlers). It knows nothing about sockets or
//! encryption; it only turns bytes into packets and back.
//!
//! ```text
//! Transport (frames) -> Protocol (Packet) -> Client (dispatch)
//! ```

mod emsg;
mod error;
pub mod handshake;
pub mod messages;
pub mod multi;
mod packet;
mod types;

pub use emsg::{EMsg, PROTO_MASK, PROTOCOL_VERSION};
pub use error::ProtocolError;
pub use multi::expand_multi;
pub use packet::{LEGACY_HEADER_LEN, Packet};
pub use types::{EResult, NO_JOB, PacketHeader, SteamId};
