//! # cmlink
//!
//! Async client for the CM binary protocol: the persistent connection a
//! desktop client keeps to its backend for logon, friends, chat and
//! presence.
//!
//! The client connects over WebSocket or encrypted TCP, logs on with an
//! access token obtained elsewhere, keeps the session alive with
//! heartbeats, and routes inbound messages to pending requests and to
//! event handlers registered on the builder.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cmlink::prelude::*;
//!
//! # async fn run() -> Result<(), ClientError> {
//! let client = CmClient::builder()
//!     .on_relationship(|e| println!("{} is now {:?}", e.steam_id, e.relationship))
//!     .build(StaticServers::single("cm.example.net:443", TransportKind::WebSocket));
//!
//! client.connect().await?;
//! client.login("account", "access-token", SteamId::individual(12345)).await?;
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate layout
//!
//! - `cmlink-crypto`: the channel cipher and the embedded server key.
//! - `cmlink-protocol`: EMsg registry, packet envelopes, message bodies,
//!   Multi expansion.
//! - `cmlink-transport`: WebSocket and TCP connections.
//! - `cmlink` (this crate): discovery, the client and its features.

mod builder;
mod client;
mod config;
mod discovery;
mod dispatch;
mod error;
mod friends;
mod games;
mod handlers;
mod latch;
mod notifications;
mod pending;
mod persona;
mod service;
mod session;

pub use builder::CmClientBuilder;
pub use client::CmClient;
pub use config::ClientConfig;
pub use discovery::{CmServer, ServerDiscovery, StaticServers};
pub use error::{ClientError, RequestError, WaitError};
pub use friends::{AddFriendResult, ChatEntryType, FriendMessage, FriendRelationship, RelationshipEvent};
pub use notifications::{ItemNotification, TradeNotification};
pub use persona::{DEFAULT_PERSONA_FIELDS, PersonaState, PersonaStateEvent};
pub use service::AccessTokens;
pub use session::DisconnectEvent;

pub use cmlink_protocol::{EMsg, EResult, Packet, PacketHeader, SteamId};
pub use cmlink_transport::{TransportError, TransportKind};

/// Convenient re-exports for common usage.
///
/// ```rust
/// use cmlink::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ClientConfig, ClientError, CmClient, CmClientBuilder, CmServer, DisconnectEvent, EMsg,
        EResult, FriendMessage, FriendRelationship, Packet, PacketHeader, PersonaState,
        PersonaStateEvent, RelationshipEvent, RequestError, ServerDiscovery, StaticServers, SteamId,
        TransportKind,
    };
}
