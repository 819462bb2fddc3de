//! Inbound packet routing.
//!
//! The read loop hands every decoded packet to [`Session::dispatch`],
//! which runs these steps in order:
//!
//! 1. A Multi is expanded and each sub-packet dispatched; the Multi
//!    itself goes no further.
//! 2. Pending slots: the job named by the target job id, and the oldest
//!    waiter on the packet's EMsg.
//! 3. The type-specific handler, if one is registered.
//! 4. The catch-all packet handler.
//!
//! A server logoff ends dispatch with [`ControlFlow::Break`], telling the
//! read loop to stop.

use std::ops::ControlFlow;

use cmlink_protocol::messages::CMsgClientLoggedOff;
use cmlink_protocol::{EMsg, EResult, Packet, expand_multi};
use prost::Message;
use tracing::{debug, warn};

use crate::session::Session;
use crate::{friends, notifications, persona};

/// Decodes an event body, logging and dropping it on failure.
pub(crate) fn decode_event<M: Message + Default>(packet: &Packet, what: &'static str) -> Option<M> {
    match packet.decode_body(what) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(emsg = %packet.emsg, error = %e, "dropping undecodable event");
            None
        }
    }
}

impl Session {
    pub(crate) fn dispatch(&self, packet: Packet) -> ControlFlow<()> {
        if packet.emsg != EMsg::Multi {
            return self.dispatch_one(packet);
        }

        let packets = match expand_multi(&packet) {
            Ok(packets) => packets,
            Err(e) => {
                warn!(error = %e, "dropping malformed multi");
                return ControlFlow::Continue(());
            }
        };
        debug!(count = packets.len(), "expanded multi");
        for packet in packets {
            if self.dispatch_one(packet).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn dispatch_one(&self, packet: Packet) -> ControlFlow<()> {
        let delivered = self.state().pending.deliver(&packet);
        debug!(
            emsg = %packet.emsg,
            job_id = packet.header.target_job(),
            delivered,
            "received packet"
        );

        let flow = match packet.emsg {
            EMsg::ClientLoggedOff => {
                let result = decode_event::<CMsgClientLoggedOff>(&packet, "ClientLoggedOff")
                    .and_then(|m| m.eresult)
                    .map_or(EResult::Fail, EResult);
                self.on_logged_off(result)
            }
            EMsg::ClientFriendsList => {
                friends::on_friends_list(&self.handlers, &packet);
                ControlFlow::Continue(())
            }
            EMsg::ClientFriendMsgIncoming | EMsg::ClientFriendMsgEchoToSender => {
                friends::on_friend_message(&self.handlers, &packet);
                ControlFlow::Continue(())
            }
            EMsg::ClientPersonaState => {
                persona::on_persona_state(&self.handlers, &packet);
                ControlFlow::Continue(())
            }
            EMsg::ClientUserNotifications => {
                notifications::on_user_notifications(&self.handlers, &packet);
                ControlFlow::Continue(())
            }
            EMsg::ClientItemAnnouncements => {
                notifications::on_item_announcements(&self.handlers, &packet);
                ControlFlow::Continue(())
            }
            _ => ControlFlow::Continue(()),
        };

        if let Some(handler) = &self.handlers.packet {
            handler(&packet);
        }
        flow
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use cmlink_protocol::messages::CMsgMulti;
    use cmlink_protocol::{PacketHeader, SteamId};
    use tokio::sync::watch;

    use super::*;
    use crate::config::ClientConfig;
    use crate::friends::{FriendRelationship, RelationshipEvent};
    use crate::handlers::EventHandlers;
    use crate::session::DisconnectEvent;

    // Helpers

    fn live_session(handlers: EventHandlers) -> Session {
        let session = Session::new(ClientConfig::default(), handlers);
        let (done, _) = watch::channel(false);
        session.state().done = done;
        session
    }

    fn reply_to(job_id: u64) -> Packet {
        let header = PacketHeader {
            jobid_target: Some(job_id),
            eresult: Some(1),
            ..PacketHeader::default()
        };
        Packet::proto(EMsg::ServiceMethodResponse, header, vec![])
    }

    fn multi_of(packets: &[Packet]) -> Packet {
        let mut payload = Vec::new();
        for p in packets {
            let wire = p.encode();
            payload.extend_from_slice(&(wire.len() as u32).to_le_bytes());
            payload.extend_from_slice(&wire);
        }
        let body = CMsgMulti {
            size_unzipped: Some(0),
            message_body: Some(payload),
        };
        Packet::from_message(EMsg::Multi, PacketHeader::default(), &body)
    }

    fn logged_off(result: i32) -> Packet {
        let body = CMsgClientLoggedOff {
            eresult: Some(result),
        };
        Packet::from_message(EMsg::ClientLoggedOff, PacketHeader::default(), &body)
    }

    #[tokio::test]
    async fn test_response_reaches_only_matching_job() {
        let session = live_session(EventHandlers::default());
        let first = session.register_job(1);
        let second = session.register_job(2);

        let flow = session.dispatch(reply_to(2));
        assert!(flow.is_continue());

        let reply = second.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.header.target_job(), 2);
        assert!(first.wait(Duration::from_millis(20)).await.is_err());
        assert_eq!(session.state().pending.len(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_response_goes_nowhere() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let session = live_session(EventHandlers {
            packet: Some(Arc::new(move |_: &Packet| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..EventHandlers::default()
        });
        let slot = session.register_job(1);

        let flow = session.dispatch(reply_to(77));

        assert!(flow.is_continue());
        assert_eq!(session.state().pending.len(), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        drop(slot);
    }

    #[test]
    fn test_multi_dispatches_subpackets_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let session = live_session(EventHandlers {
            packet: Some(Arc::new(move |p: &Packet| sink.lock().unwrap().push(p.emsg))),
            ..EventHandlers::default()
        });

        let a = Packet::proto(EMsg::ClientSessionToken, PacketHeader::default(), vec![1]);
        let b = Packet::proto(EMsg::ClientPersonaChangeResponse, PacketHeader::default(), vec![2]);
        let _ = session.dispatch(multi_of(&[a, b]));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EMsg::ClientSessionToken, EMsg::ClientPersonaChangeResponse]
        );
    }

    #[test]
    fn test_friends_list_in_multi() {
        use cmlink_protocol::messages::CMsgClientFriendsList;
        use cmlink_protocol::messages::cmsg_client_friends_list::Friend;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let session = live_session(EventHandlers {
            relationship: Some(Arc::new(move |e: &RelationshipEvent| {
                sink.lock().unwrap().push(*e)
            })),
            ..EventHandlers::default()
        });

        let body = CMsgClientFriendsList {
            bincremental: Some(false),
            friends: vec![
                Friend {
                    ulfriendid: Some(1),
                    efriendrelationship: Some(3),
                },
                Friend {
                    ulfriendid: Some(2),
                    efriendrelationship: Some(2),
                },
            ],
            ..CMsgClientFriendsList::default()
        };
        let list = Packet::from_message(EMsg::ClientFriendsList, PacketHeader::default(), &body);
        let _ = session.dispatch(multi_of(&[list]));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].steam_id, SteamId(1));
        assert_eq!(seen[0].relationship, FriendRelationship::Friend);
        assert_eq!(seen[1].relationship, FriendRelationship::RequestRecipient);
        assert!(seen.iter().all(|e| !e.incremental));
    }

    #[tokio::test]
    async fn test_logoff_breaks_and_reports_once() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let session = live_session(EventHandlers {
            disconnect: Some(Arc::new(move |e: &DisconnectEvent| {
                sink.lock().unwrap().push((e.server_initiated, e.result))
            })),
            ..EventHandlers::default()
        });

        assert!(session.dispatch(logged_off(6)).is_break());
        assert!(session.dispatch(logged_off(6)).is_break());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            *events.lock().unwrap(),
            vec![(true, Some(EResult::LoggedInElsewhere))]
        );
    }

    #[tokio::test]
    async fn test_logoff_inside_multi_stops_batch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let session = live_session(EventHandlers {
            packet: Some(Arc::new(move |p: &Packet| sink.lock().unwrap().push(p.emsg))),
            ..EventHandlers::default()
        });

        let after = Packet::proto(EMsg::ClientSessionToken, PacketHeader::default(), vec![]);
        let flow = session.dispatch(multi_of(&[logged_off(2), after]));

        assert!(flow.is_break());
        assert_eq!(*seen.lock().unwrap(), vec![EMsg::ClientLoggedOff]);
    }

    #[test]
    fn test_no_handlers_never_fault() {
        let session = live_session(EventHandlers::default());
        for emsg in [
            EMsg::ClientFriendsList,
            EMsg::ClientFriendMsgIncoming,
            EMsg::ClientPersonaState,
            EMsg::ClientUserNotifications,
            EMsg::ClientItemAnnouncements,
            EMsg(4242),
        ] {
            let packet = Packet::proto(emsg, PacketHeader::default(), vec![0xFF, 0xFF]);
            assert!(session.dispatch(packet).is_continue());
        }
    }

    #[test]
    fn test_malformed_multi_is_dropped() {
        let session = live_session(EventHandlers::default());
        let body = CMsgMulti {
            size_unzipped: Some(0),
            message_body: Some(vec![0x10, 0, 0, 0, 1]),
        };
        let packet = Packet::from_message(EMsg::Multi, PacketHeader::default(), &body);
        assert!(session.dispatch(packet).is_continue());
    }
}
