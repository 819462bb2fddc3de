//! Friends: relationships, chat, and the friend-list requests.

use cmlink_protocol::messages::{
    CMsgClientAddFriend, CMsgClientAddFriendResponse, CMsgClientFriendMsg,
    CMsgClientFriendMsgIncoming, CMsgClientFriendsList, CMsgClientRemoveFriend,
};
use cmlink_protocol::{EMsg, EResult, Packet, PacketHeader, ProtocolError, SteamId};

use crate::client::CmClient;
use crate::dispatch::decode_event;
use crate::handlers::EventHandlers;
use crate::{ClientError, RequestError};

/// Size of the legacy set-ignore request body.
const IGNORE_REQUEST_LEN: usize = 17;
/// Size of the legacy set-ignore response body.
const IGNORE_RESPONSE_LEN: usize = 12;

/// Kind of a chat entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatEntryType(pub i32);

#[allow(non_upper_case_globals)]
impl ChatEntryType {
    pub const Invalid: ChatEntryType = ChatEntryType(0);
    pub const ChatMsg: ChatEntryType = ChatEntryType(1);
    pub const Typing: ChatEntryType = ChatEntryType(2);
}

/// Relationship between the logged-in account and another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FriendRelationship(pub u32);

#[allow(non_upper_case_globals)]
impl FriendRelationship {
    pub const None: FriendRelationship = FriendRelationship(0);
    pub const Blocked: FriendRelationship = FriendRelationship(1);
    pub const RequestRecipient: FriendRelationship = FriendRelationship(2);
    pub const Friend: FriendRelationship = FriendRelationship(3);
    pub const RequestInitiator: FriendRelationship = FriendRelationship(4);
    pub const Ignored: FriendRelationship = FriendRelationship(5);
    pub const IgnoredFriend: FriendRelationship = FriendRelationship(6);
}

/// A chat message, received or echoed from another session of ours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendMessage {
    pub sender: SteamId,
    pub entry_type: ChatEntryType,
    /// Text with the wire terminator removed.
    pub message: String,
    pub from_limited_account: bool,
    /// Server time, seconds since the epoch.
    pub server_timestamp: u32,
    /// `true` for our own message echoed from another session.
    pub echo: bool,
}

/// One entry of a friends-list update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipEvent {
    pub steam_id: SteamId,
    pub relationship: FriendRelationship,
    /// `false` when the update is the full list.
    pub incremental: bool,
}

/// The server's answer to [`CmClient::add_friend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddFriendResult {
    pub result: EResult,
    pub steam_id: SteamId,
    pub persona_name: String,
}

impl FriendMessage {
    fn from_incoming(msg: CMsgClientFriendMsgIncoming, echo: bool) -> Self {
        Self {
            sender: SteamId(msg.steamid_from.unwrap_or(0)),
            entry_type: ChatEntryType(msg.chat_entry_type.unwrap_or(0)),
            message: strip_terminator(msg.message.unwrap_or_default()),
            from_limited_account: msg.from_limited_account.unwrap_or(false),
            server_timestamp: msg.rtime32_server_timestamp.unwrap_or(0),
            echo,
        }
    }
}

fn strip_terminator(mut bytes: Vec<u8>) -> String {
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

pub(crate) fn on_friends_list(handlers: &EventHandlers, packet: &Packet) {
    let Some(handler) = &handlers.relationship else {
        return;
    };
    let Some(list) = decode_event::<CMsgClientFriendsList>(packet, "ClientFriendsList") else {
        return;
    };
    let incremental = list.bincremental.unwrap_or(false);
    for friend in &list.friends {
        handler(&RelationshipEvent {
            steam_id: SteamId(friend.ulfriendid.unwrap_or(0)),
            relationship: FriendRelationship(friend.efriendrelationship.unwrap_or(0)),
            incremental,
        });
    }
}

pub(crate) fn on_friend_message(handlers: &EventHandlers, packet: &Packet) {
    let Some(handler) = &handlers.friend_message else {
        return;
    };
    let Some(msg) = decode_event::<CMsgClientFriendMsgIncoming>(packet, "ClientFriendMsgIncoming")
    else {
        return;
    };
    handler(&FriendMessage::from_incoming(
        msg,
        packet.emsg == EMsg::ClientFriendMsgEchoToSender,
    ));
}

fn ignore_request_body(own: SteamId, friend: SteamId, ignore: bool) -> Vec<u8> {
    let mut body = Vec::with_capacity(IGNORE_REQUEST_LEN);
    body.extend_from_slice(&own.to_u64().to_le_bytes());
    body.extend_from_slice(&friend.to_u64().to_le_bytes());
    body.push(u8::from(ignore));
    body
}

fn ignore_response_result(body: &[u8]) -> Result<EResult, ProtocolError> {
    if body.len() < IGNORE_RESPONSE_LEN {
        return Err(ProtocolError::Truncated {
            what: "ClientSetIgnoreFriendResponse",
            needed: IGNORE_RESPONSE_LEN,
            available: body.len(),
        });
    }
    let code = i32::from_le_bytes([body[8], body[9], body[10], body[11]]);
    Ok(EResult(code))
}

impl<D> CmClient<D> {
    /// Sends a chat message. Fire-and-forget.
    pub async fn send_message(&self, to: SteamId, message: &str) -> Result<(), ClientError> {
        self.send_chat(to, ChatEntryType::ChatMsg, message).await
    }

    /// Tells `to` that we are typing.
    pub async fn send_typing(&self, to: SteamId) -> Result<(), ClientError> {
        self.send_chat(to, ChatEntryType::Typing, "").await
    }

    async fn send_chat(
        &self,
        to: SteamId,
        entry_type: ChatEntryType,
        message: &str,
    ) -> Result<(), ClientError> {
        let mut text = message.as_bytes().to_vec();
        text.push(0);
        let body = CMsgClientFriendMsg {
            steamid: Some(to.to_u64()),
            chat_entry_type: Some(entry_type.0),
            message: Some(text),
            ..CMsgClientFriendMsg::default()
        };
        let packet = Packet::from_message(EMsg::ClientFriendMsg, PacketHeader::default(), &body);
        self.session.send("ClientFriendMsg", packet).await
    }

    /// Sends a friend request and waits for the server's answer.
    ///
    /// # Errors
    /// [`RequestError::Rejected`] if the server refuses the request.
    pub async fn add_friend(&self, steam_id: SteamId) -> Result<AddFriendResult, ClientError> {
        const WHAT: &str = "ClientAddFriend";

        let body = CMsgClientAddFriend {
            steamid_to_add: Some(steam_id.to_u64()),
            ..CMsgClientAddFriend::default()
        };
        let packet = Packet::from_message(EMsg::ClientAddFriend, PacketHeader::default(), &body);

        let slot = self.session.register_tag(EMsg::ClientAddFriendResponse);
        let reply = self.session.request(WHAT, packet, slot).await?;

        let response: CMsgClientAddFriendResponse = reply
            .decode_body("ClientAddFriendResponse")
            .map_err(|source| RequestError::Decode {
                what: WHAT.to_string(),
                source,
            })?;
        let result = EResult(response.eresult.unwrap_or(EResult::Fail.0));
        if !result.is_ok() {
            return Err(RequestError::Rejected {
                what: WHAT.to_string(),
                result,
            }
            .into());
        }
        Ok(AddFriendResult {
            result,
            steam_id: SteamId(response.steam_id_added.unwrap_or(0)),
            persona_name: response.persona_name_added.unwrap_or_default(),
        })
    }

    /// Removes a friend or cancels a request. Fire-and-forget.
    pub async fn remove_friend(&self, steam_id: SteamId) -> Result<(), ClientError> {
        let body = CMsgClientRemoveFriend {
            friendid: Some(steam_id.to_u64()),
        };
        let packet = Packet::from_message(EMsg::ClientRemoveFriend, PacketHeader::default(), &body);
        self.session.send("ClientRemoveFriend", packet).await
    }

    /// Blocks (`ignore = true`) or unblocks a user.
    ///
    /// # Errors
    /// [`RequestError::Decode`] if the response body is short,
    /// [`RequestError::Rejected`] if the server refuses.
    pub async fn ignore_friend(&self, steam_id: SteamId, ignore: bool) -> Result<(), ClientError> {
        const WHAT: &str = "ClientSetIgnoreFriend";

        let own = self.session.state().steam_id;
        let packet = Packet::legacy(
            EMsg::ClientSetIgnoreFriend,
            PacketHeader::default(),
            ignore_request_body(own, steam_id, ignore),
        );

        let slot = self.session.register_tag(EMsg::ClientSetIgnoreFriendResponse);
        let reply = self.session.request(WHAT, packet, slot).await?;

        let result = ignore_response_result(&reply.body).map_err(|source| RequestError::Decode {
            what: WHAT.to_string(),
            source,
        })?;
        if !result.is_ok() {
            return Err(RequestError::Rejected {
                what: WHAT.to_string(),
                result,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use cmlink_protocol::messages::cmsg_client_friends_list::Friend;

    use super::*;

    fn friends_list(incremental: bool, entries: &[(u64, u32)]) -> Packet {
        let body = CMsgClientFriendsList {
            bincremental: Some(incremental),
            friends: entries
                .iter()
                .map(|&(id, rel)| Friend {
                    ulfriendid: Some(id),
                    efriendrelationship: Some(rel),
                })
                .collect(),
            ..CMsgClientFriendsList::default()
        };
        Packet::from_message(EMsg::ClientFriendsList, PacketHeader::default(), &body)
    }

    #[test]
    fn test_full_list_yields_one_event_per_entry() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handlers = EventHandlers {
            relationship: Some(Arc::new(move |e: &RelationshipEvent| {
                sink.lock().unwrap().push(*e)
            })),
            ..EventHandlers::default()
        };

        let packet = friends_list(false, &[(100, 3), (200, 2)]);
        on_friends_list(&handlers, &packet);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                RelationshipEvent {
                    steam_id: SteamId(100),
                    relationship: FriendRelationship::Friend,
                    incremental: false,
                },
                RelationshipEvent {
                    steam_id: SteamId(200),
                    relationship: FriendRelationship::RequestRecipient,
                    incremental: false,
                },
            ]
        );
    }

    #[test]
    fn test_echo_flag_and_terminator() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handlers = EventHandlers {
            friend_message: Some(Arc::new(move |m: &FriendMessage| {
                sink.lock().unwrap().push(m.clone())
            })),
            ..EventHandlers::default()
        };

        let body = CMsgClientFriendMsgIncoming {
            steamid_from: Some(7),
            chat_entry_type: Some(1),
            message: Some(b"hello\0\0".to_vec()),
            rtime32_server_timestamp: Some(1_700_000_000),
            ..CMsgClientFriendMsgIncoming::default()
        };
        for emsg in [EMsg::ClientFriendMsgIncoming, EMsg::ClientFriendMsgEchoToSender] {
            on_friend_message(&handlers, &Packet::from_message(emsg, PacketHeader::default(), &body));
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].message, "hello");
        assert_eq!(seen[0].entry_type, ChatEntryType::ChatMsg);
        assert_eq!(seen[0].server_timestamp, 1_700_000_000);
        assert!(!seen[0].echo);
        assert!(seen[1].echo);
    }

    #[test]
    fn test_undecodable_chat_is_dropped() {
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        let handlers = EventHandlers {
            friend_message: Some(Arc::new(move |_: &FriendMessage| {
                *counter.lock().unwrap() += 1;
            })),
            ..EventHandlers::default()
        };
        let packet = Packet::proto(EMsg::ClientFriendMsgIncoming, PacketHeader::default(), vec![0xFF]);
        on_friend_message(&handlers, &packet);
        assert_eq!(*fired.lock().unwrap(), 0);
    }

    #[test]
    fn test_ignore_request_layout() {
        let body = ignore_request_body(SteamId(1), SteamId(2), true);
        assert_eq!(body.len(), IGNORE_REQUEST_LEN);
        assert_eq!(&body[0..8], &1u64.to_le_bytes());
        assert_eq!(&body[8..16], &2u64.to_le_bytes());
        assert_eq!(body[16], 1);
    }

    #[test]
    fn test_ignore_response_validated() {
        let mut body = 2u64.to_le_bytes().to_vec();
        body.extend_from_slice(&1i32.to_le_bytes());
        assert_eq!(ignore_response_result(&body).unwrap(), EResult::OK);

        let err = ignore_response_result(&body[..11]).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { needed: 12, available: 11, .. }));
    }
}
