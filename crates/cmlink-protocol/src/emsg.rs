//! The EMsg tag registry.
//!
//! Every CM message starts with a numeric tag ("EMsg") that identifies
//! its type. The numbers are fixed by the server; the names exist only
//! for logs and `Display`.

use std::fmt;

/// Bit 31 of the raw EMsg field. Set when the message uses the protobuf
/// envelope, clear for the legacy fixed-layout envelope.
pub const PROTO_MASK: u32 = 0x8000_0000;

/// Protocol version sent in ClientHello and ClientLogon.
pub const PROTOCOL_VERSION: u32 = 65581;

/// A CM message type tag.
///
/// Newtype over the server's numeric value with associated constants for
/// the tags this client speaks. Unknown tags are still representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EMsg(pub u32);

macro_rules! emsg_registry {
    ($($name:ident = $value:literal,)*) => {
        #[allow(non_upper_case_globals)]
        impl EMsg {
            $(pub const $name: EMsg = EMsg($value);)*

            /// The registry name for this tag, if it is a known one.
            pub fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some(stringify!($name)),)*
                    _ => None,
                }
            }
        }
    };
}

emsg_registry! {
    Multi = 1,
    DestJobFailed = 113,
    ServiceMethod = 146,
    ServiceMethodResponse = 147,
    ServiceMethodCallFromClient = 151,
    ServiceMethodSendToClient = 152,
    ClientHeartBeat = 703,
    ClientLogOff = 706,
    ClientRemoveFriend = 714,
    ClientChangeStatus = 716,
    ClientFriendMsg = 718,
    ClientGamesPlayed = 742,
    ClientLogOnResponse = 751,
    ClientLoggedOff = 757,
    ClientPersonaState = 766,
    ClientFriendsList = 767,
    ClientAddFriend = 791,
    ClientAddFriendResponse = 792,
    ClientRequestFriendData = 815,
    ClientSessionToken = 850,
    ClientSetIgnoreFriend = 855,
    ClientSetIgnoreFriendResponse = 856,
    ChannelEncryptRequest = 1303,
    ChannelEncryptResponse = 1304,
    ChannelEncryptResult = 1305,
    ClientFriendMsgIncoming = 5427,
    ClientLogon = 5514,
    ClientItemAnnouncements = 5576,
    ClientRequestItemAnnouncements = 5577,
    ClientFriendMsgEchoToSender = 5578,
    ClientPersonaChangeResponse = 5584,
    ClientUserNotifications = 5599,
    ClientHello = 9805,
}

impl EMsg {
    /// Splits a raw wire value into the tag and its proto flag.
    pub fn from_raw(raw: u32) -> (Self, bool) {
        (Self(raw & !PROTO_MASK), raw & PROTO_MASK != 0)
    }

    /// The raw wire value, with the proto mask applied when `proto` is set.
    pub fn to_raw(self, proto: bool) -> u32 {
        if proto { self.0 | PROTO_MASK } else { self.0 }
    }
}

impl fmt::Display for EMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "EMsg({})", self.0),
        }
    }
}
