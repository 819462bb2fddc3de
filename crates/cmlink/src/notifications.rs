//! Trade and item notification counters.

use cmlink_protocol::Packet;
use cmlink_protocol::messages::{CMsgClientItemAnnouncements, CMsgClientUserNotifications};

use crate::dispatch::decode_event;
use crate::handlers::EventHandlers;

/// User-notification type carrying the pending trade-offer count.
const TRADE_OFFERS_NOTIFICATION: u32 = 1;

/// Pending incoming trade offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeNotification {
    pub trade_offers_count: u32,
}

/// Unseen inventory items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemNotification {
    pub new_item_count: u32,
}

pub(crate) fn on_user_notifications(handlers: &EventHandlers, packet: &Packet) {
    let Some(handler) = &handlers.trade_notification else {
        return;
    };
    let Some(batch) =
        decode_event::<CMsgClientUserNotifications>(packet, "ClientUserNotifications")
    else {
        return;
    };
    batch
        .notifications
        .iter()
        .filter(|n| n.user_notification_type == Some(TRADE_OFFERS_NOTIFICATION))
        .for_each(|n| {
            handler(&TradeNotification {
                trade_offers_count: n.count.unwrap_or(0),
            })
        });
}

pub(crate) fn on_item_announcements(handlers: &EventHandlers, packet: &Packet) {
    let Some(handler) = &handlers.item_notification else {
        return;
    };
    if let Some(announcement) =
        decode_event::<CMsgClientItemAnnouncements>(packet, "ClientItemAnnouncements")
    {
        handler(&ItemNotification {
            new_item_count: announcement.count_new_items.unwrap_or(0),
        });
    }
}
