//! Presence: persona state updates in, status changes out.

use std::fmt;

use cmlink_protocol::messages::{
    CMsgClientChangeStatus, CMsgClientPersonaState, CMsgClientRequestFriendData,
};
use cmlink_protocol::{EMsg, Packet, PacketHeader, SteamId};

use crate::ClientError;
use crate::client::CmClient;
use crate::dispatch::decode_event;
use crate::handlers::EventHandlers;

/// Fields asked for by [`CmClient::request_friend_data`]: status, player
/// name, presence, last seen and game data.
pub const DEFAULT_PERSONA_FIELDS: u32 = 339;

/// Online status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PersonaState(pub u32);

#[allow(non_upper_case_globals)]
impl PersonaState {
    pub const Offline: PersonaState = PersonaState(0);
    pub const Online: PersonaState = PersonaState(1);
    pub const Busy: PersonaState = PersonaState(2);
    pub const Away: PersonaState = PersonaState(3);
    pub const Snooze: PersonaState = PersonaState(4);
    pub const LookingToTrade: PersonaState = PersonaState(5);
    pub const LookingToPlay: PersonaState = PersonaState(6);
    pub const Invisible: PersonaState = PersonaState(7);

    pub fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            0 => "Offline",
            1 => "Online",
            2 => "Busy",
            3 => "Away",
            4 => "Snooze",
            5 => "LookingToTrade",
            6 => "LookingToPlay",
            7 => "Invisible",
            _ => return None,
        })
    }
}

impl fmt::Display for PersonaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "PersonaState({})", self.0),
        }
    }
}

/// Presence of one account, from a persona-state batch.
///
/// Fields the server left out of the update are zero or empty;
/// `status_flags` says which ones it meant to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaStateEvent {
    pub steam_id: SteamId,
    /// Which fields changed. Shared by every event of one batch.
    pub status_flags: u32,
    pub state: PersonaState,
    pub player_name: String,
    pub game_app_id: u32,
    pub game_name: String,
    pub last_logoff: u32,
    pub last_logon: u32,
}

pub(crate) fn on_persona_state(handlers: &EventHandlers, packet: &Packet) {
    let Some(handler) = &handlers.persona_state else {
        return;
    };
    let Some(batch) = decode_event::<CMsgClientPersonaState>(packet, "ClientPersonaState") else {
        return;
    };
    let status_flags = batch.status_flags.unwrap_or(0);
    for friend in batch.friends {
        handler(&PersonaStateEvent {
            steam_id: SteamId(friend.friendid.unwrap_or(0)),
            status_flags,
            state: PersonaState(friend.persona_state.unwrap_or(0)),
            player_name: friend.player_name.unwrap_or_default(),
            game_app_id: friend.game_played_app_id.unwrap_or(0),
            game_name: friend.game_name.unwrap_or_default(),
            last_logoff: friend.last_logoff.unwrap_or(0),
            last_logon: friend.last_logon.unwrap_or(0),
        });
    }
}

impl<D> CmClient<D> {
    /// Publishes our status. Fire-and-forget.
    pub async fn set_persona_state(&self, state: PersonaState) -> Result<(), ClientError> {
        let body = CMsgClientChangeStatus {
            persona_state: Some(state.0),
            persona_set_by_user: Some(true),
            ..CMsgClientChangeStatus::default()
        };
        let packet = Packet::from_message(EMsg::ClientChangeStatus, PacketHeader::default(), &body);
        self.session.send("ClientChangeStatus", packet).await
    }

    /// Asks for the presence of `friends`. Answers arrive as persona-state
    /// events.
    pub async fn request_friend_data(&self, friends: &[SteamId]) -> Result<(), ClientError> {
        let body = CMsgClientRequestFriendData {
            persona_state_requested: Some(DEFAULT_PERSONA_FIELDS),
            friends: friends.iter().map(|id| id.to_u64()).collect(),
        };
        let packet =
            Packet::from_message(EMsg::ClientRequestFriendData, PacketHeader::default(), &body);
        self.session.send("ClientRequestFriendData", packet).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use cmlink_protocol::messages::cmsg_client_persona_state::Friend;

    use super::*;

    #[test]
    fn test_persona_state_display() {
        assert_eq!(PersonaState::Online.to_string(), "Online");
        assert_eq!(PersonaState::LookingToPlay.to_string(), "LookingToPlay");
        assert_eq!(PersonaState(42).to_string(), "PersonaState(42)");
    }

    #[test]
    fn test_batch_shares_status_flags() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handlers = EventHandlers {
            persona_state: Some(Arc::new(move |e: &PersonaStateEvent| {
                sink.lock().unwrap().push(e.clone())
            })),
            ..EventHandlers::default()
        };

        let body = CMsgClientPersonaState {
            status_flags: Some(0x51),
            friends: vec![
                Friend {
                    friendid: Some(10),
                    persona_state: Some(1),
                    player_name: Some("alice".into()),
                    game_played_app_id: Some(440),
                    game_name: Some("TF2".into()),
                    ..Friend::default()
                },
                Friend {
                    friendid: Some(11),
                    persona_state: Some(3),
                    ..Friend::default()
                },
            ],
        };
        let packet = Packet::from_message(EMsg::ClientPersonaState, PacketHeader::default(), &body);
        on_persona_state(&handlers, &packet);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|e| e.status_flags == 0x51));
        assert_eq!(seen[0].player_name, "alice");
        assert_eq!(seen[0].game_app_id, 440);
        assert_eq!(seen[1].state, PersonaState::Away);
        assert_eq!(seen[1].player_name, "");
    }
}
