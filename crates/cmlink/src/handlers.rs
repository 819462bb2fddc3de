//! Optional event callbacks.
//!
//! Each slot is independent and may be empty; dispatch checks the slot
//! before decoding anything for it. All callbacks except the disconnect
//! one run on the read loop, so they must return quickly: a callback that
//! blocks stalls every later packet, pending responses included.

use std::sync::Arc;

use cmlink_protocol::Packet;

use crate::friends::{FriendMessage, RelationshipEvent};
use crate::notifications::{ItemNotification, TradeNotification};
use crate::persona::PersonaStateEvent;
use crate::session::DisconnectEvent;

pub(crate) type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct EventHandlers {
    /// Every non-Multi packet, after the type-specific handlers.
    pub(crate) packet: Option<Handler<Packet>>,
    pub(crate) friend_message: Option<Handler<FriendMessage>>,
    pub(crate) relationship: Option<Handler<RelationshipEvent>>,
    pub(crate) persona_state: Option<Handler<PersonaStateEvent>>,
    pub(crate) trade_notification: Option<Handler<TradeNotification>>,
    pub(crate) item_notification: Option<Handler<ItemNotification>>,
    /// Runs on its own task, so it may call back into the client.
    pub(crate) disconnect: Option<Handler<DisconnectEvent>>,
}
