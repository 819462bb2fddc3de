//! Protobuf message bodies the client sends or understands.
//!
//! Hand-declared with `prost` derives instead of generated from `.proto`
//! files: only the fields this client touches are listed, and the decoder
//! skips the rest. Field numbers and wire types follow the server's
//! definitions, so these interoperate with the real CM.

// ---------------------------------------------------------------------------
// Envelope-level
// ---------------------------------------------------------------------------

/// Body of [`EMsg::Multi`](crate::EMsg::Multi): a batch of sub-messages.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgMulti {
    /// Non-zero when `message_body` is gzip-compressed.
    #[prost(uint32, optional, tag = "1")]
    pub size_unzipped: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub message_body: Option<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientHello {
    #[prost(uint32, optional, tag = "1")]
    pub protocol_version: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientLogon {
    #[prost(uint32, optional, tag = "1")]
    pub protocol_version: Option<u32>,
    #[prost(string, optional, tag = "6")]
    pub client_language: Option<String>,
    #[prost(uint32, optional, tag = "7")]
    pub client_os_type: Option<u32>,
    #[prost(bool, optional, tag = "8")]
    pub should_remember_password: Option<bool>,
    #[prost(string, optional, tag = "50")]
    pub account_name: Option<String>,
    #[prost(string, optional, tag = "108")]
    pub access_token: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientLogonResponse {
    #[prost(int32, optional, tag = "1")]
    pub eresult: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub legacy_out_of_game_heartbeat_seconds: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub heartbeat_seconds: Option<i32>,
    #[prost(fixed32, optional, tag = "5")]
    pub rtime32_server_time: Option<u32>,
    #[prost(uint32, optional, tag = "7")]
    pub cell_id: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientHeartBeat {
    #[prost(bool, optional, tag = "1")]
    pub send_reply: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientLogOff {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientLoggedOff {
    #[prost(int32, optional, tag = "1")]
    pub eresult: Option<i32>,
}

// ---------------------------------------------------------------------------
// Friends and chat
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientFriendsList {
    #[prost(bool, optional, tag = "1")]
    pub bincremental: Option<bool>,
    #[prost(message, repeated, tag = "2")]
    pub friends: Vec<cmsg_client_friends_list::Friend>,
    #[prost(uint32, optional, tag = "3")]
    pub max_friend_count: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub active_friend_count: Option<u32>,
}

pub mod cmsg_client_friends_list {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Friend {
        #[prost(fixed64, optional, tag = "1")]
        pub ulfriendid: Option<u64>,
        #[prost(uint32, optional, tag = "2")]
        pub efriendrelationship: Option<u32>,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientAddFriend {
    #[prost(fixed64, optional, tag = "1")]
    pub steamid_to_add: Option<u64>,
    #[prost(string, optional, tag = "2")]
    pub accountname_or_email_to_add: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientAddFriendResponse {
    #[prost(int32, optional, tag = "1")]
    pub eresult: Option<i32>,
    #[prost(fixed64, optional, tag = "2")]
    pub steam_id_added: Option<u64>,
    #[prost(string, optional, tag = "3")]
    pub persona_name_added: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientRemoveFriend {
    #[prost(fixed64, optional, tag = "1")]
    pub friendid: Option<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientFriendMsg {
    #[prost(fixed64, optional, tag = "1")]
    pub steamid: Option<u64>,
    #[prost(int32, optional, tag = "2")]
    pub chat_entry_type: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub message: Option<Vec<u8>>,
    #[prost(fixed32, optional, tag = "4")]
    pub rtime32_server_timestamp: Option<u32>,
    #[prost(bool, optional, tag = "5")]
    pub echo_to_sender: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientFriendMsgIncoming {
    #[prost(fixed64, optional, tag = "1")]
    pub steamid_from: Option<u64>,
    #[prost(int32, optional, tag = "2")]
    pub chat_entry_type: Option<i32>,
    #[prost(bool, optional, tag = "3")]
    pub from_limited_account: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub message: Option<Vec<u8>>,
    #[prost(fixed32, optional, tag = "5")]
    pub rtime32_server_timestamp: Option<u32>,
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientChangeStatus {
    #[prost(uint32, optional, tag = "1")]
    pub persona_state: Option<u32>,
    #[prost(string, optional, tag = "2")]
    pub player_name: Option<String>,
    #[prost(bool, optional, tag = "5")]
    pub persona_set_by_user: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientRequestFriendData {
    #[prost(uint32, optional, tag = "1")]
    pub persona_state_requested: Option<u32>,
    #[prost(fixed64, repeated, packed = "false", tag = "2")]
    pub friends: Vec<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientPersonaState {
    #[prost(uint32, optional, tag = "1")]
    pub status_flags: Option<u32>,
    #[prost(message, repeated, tag = "2")]
    pub friends: Vec<cmsg_client_persona_state::Friend>,
}

pub mod cmsg_client_persona_state {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Friend {
        #[prost(fixed64, optional, tag = "1")]
        pub friendid: Option<u64>,
        #[prost(uint32, optional, tag = "2")]
        pub persona_state: Option<u32>,
        #[prost(uint32, optional, tag = "3")]
        pub game_played_app_id: Option<u32>,
        #[prost(string, optional, tag = "15")]
        pub player_name: Option<String>,
        #[prost(uint32, optional, tag = "45")]
        pub last_logoff: Option<u32>,
        #[prost(uint32, optional, tag = "46")]
        pub last_logon: Option<u32>,
        #[prost(string, optional, tag = "55")]
        pub game_name: Option<String>,
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientUserNotifications {
    #[prost(message, repeated, tag = "1")]
    pub notifications: Vec<cmsg_client_user_notifications::Notification>,
}

pub mod cmsg_client_user_notifications {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Notification {
        #[prost(uint32, optional, tag = "1")]
        pub user_notification_type: Option<u32>,
        #[prost(uint32, optional, tag = "2")]
        pub count: Option<u32>,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientItemAnnouncements {
    #[prost(uint32, optional, tag = "1")]
    pub count_new_items: Option<u32>,
}

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct CMsgClientGamesPlayed {
    #[prost(message, repeated, tag = "1")]
    pub games_played: Vec<cmsg_client_games_played::GamePlayed>,
    #[prost(uint32, optional, tag = "2")]
    pub client_os_type: Option<u32>,
}

pub mod cmsg_client_games_played {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GamePlayed {
        #[prost(fixed64, optional, tag = "2")]
        pub game_id: Option<u64>,
        #[prost(string, optional, tag = "7")]
        pub game_extra_info: Option<String>,
    }
}

// ---------------------------------------------------------------------------
// Service methods
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct CAuthenticationAccessTokenGenerateForAppRequest {
    #[prost(string, optional, tag = "1")]
    pub refresh_token: Option<String>,
    #[prost(fixed64, optional, tag = "2")]
    pub steamid: Option<u64>,
    #[prost(int32, optional, tag = "3")]
    pub renewal_type: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CAuthenticationAccessTokenGenerateForAppResponse {
    #[prost(string, optional, tag = "1")]
    pub access_token: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub refresh_token: Option<String>,
}
