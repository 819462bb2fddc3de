//! Builder that fixes a client's settings and event handlers.

use std::sync::Arc;
use std::time::Duration;

use cmlink_protocol::Packet;
use cmlink_transport::{RsaPublicKey, TransportKind};

use crate::client::CmClient;
use crate::config::ClientConfig;
use crate::discovery::ServerDiscovery;
use crate::friends::{FriendMessage, RelationshipEvent};
use crate::handlers::EventHandlers;
use crate::notifications::{ItemNotification, TradeNotification};
use crate::persona::PersonaStateEvent;
use crate::session::{DisconnectEvent, Session};

/// Builder for a [`CmClient`].
///
/// Handlers are fixed at build time. Every `on_*` handler except
/// [`on_disconnect`](Self::on_disconnect) runs on the read loop and must
/// return quickly.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use cmlink::prelude::*;
///
/// let client = CmClient::builder()
///     .transport(TransportKind::Tcp)
///     .request_timeout(Duration::from_secs(10))
///     .on_disconnect(|e| eprintln!("disconnected: {e:?}"))
///     .build(StaticServers::single("cm.example.net:27017", TransportKind::Tcp));
/// ```
#[derive(Default)]
pub struct CmClientBuilder {
    config: ClientConfig,
    handlers: EventHandlers,
}

impl CmClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, kind: TransportKind) -> Self {
        self.config.transport = kind;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn heartbeat_fallback(mut self, interval: Duration) -> Self {
        self.config.heartbeat_fallback = interval;
        self
    }

    /// Wraps TCP session keys for `key` instead of the compiled-in one.
    pub fn server_key(mut self, key: RsaPublicKey) -> Self {
        self.config.server_key = Some(key);
        self
    }

    /// Called with every packet, Multi contents included, after the
    /// type-specific handler.
    pub fn on_packet(mut self, f: impl Fn(&Packet) + Send + Sync + 'static) -> Self {
        self.handlers.packet = Some(Arc::new(f));
        self
    }

    pub fn on_friend_message(mut self, f: impl Fn(&FriendMessage) + Send + Sync + 'static) -> Self {
        self.handlers.friend_message = Some(Arc::new(f));
        self
    }

    /// Called once per entry of each friends-list update.
    pub fn on_relationship(
        mut self,
        f: impl Fn(&RelationshipEvent) + Send + Sync + 'static,
    ) -> Self {
        self.handlers.relationship = Some(Arc::new(f));
        self
    }

    /// Called once per account in each persona-state batch.
    pub fn on_persona_state(
        mut self,
        f: impl Fn(&PersonaStateEvent) + Send + Sync + 'static,
    ) -> Self {
        self.handlers.persona_state = Some(Arc::new(f));
        self
    }

    pub fn on_trade_notification(
        mut self,
        f: impl Fn(&TradeNotification) + Send + Sync + 'static,
    ) -> Self {
        self.handlers.trade_notification = Some(Arc::new(f));
        self
    }

    pub fn on_item_notification(
        mut self,
        f: impl Fn(&ItemNotification) + Send + Sync + 'static,
    ) -> Self {
        self.handlers.item_notification = Some(Arc::new(f));
        self
    }

    /// Called once per connection when it ends, for whatever reason.
    ///
    /// Runs on its own task, so it may call back into the client, e.g. to
    /// [`reconnect`](CmClient::reconnect).
    pub fn on_disconnect(mut self, f: impl Fn(&DisconnectEvent) + Send + Sync + 'static) -> Self {
        self.handlers.disconnect = Some(Arc::new(f));
        self
    }

    /// Builds a disconnected client that will find servers via `discovery`.
    pub fn build<D: ServerDiscovery>(self, discovery: D) -> CmClient<D> {
        CmClient {
            discovery: Arc::new(discovery),
            session: Arc::new(Session::new(self.config, self.handlers)),
        }
    }
}
