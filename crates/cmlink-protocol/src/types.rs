//! Core identity and result types shared by every layer.

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A 64-bit account identifier as the CM server sees it.
///
/// Newtype wrapper so an identity can't be confused with a job id or a
/// session id, all of which are plain integers on the wire. Only the
/// handful of bit operations the client needs live here; full parsing of
/// textual forms belongs to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SteamId(pub u64);

impl SteamId {
    const UNIVERSE_PUBLIC: u64 = 1;
    const TYPE_INDIVIDUAL: u64 = 1;
    const INSTANCE_DESKTOP: u64 = 1;

    /// The individual desktop identity for an account in the public universe.
    ///
    /// This is the form the logon request must carry, regardless of which
    /// instance the caller's own identity was issued for.
    pub fn individual(account_id: u32) -> Self {
        Self(
            (Self::UNIVERSE_PUBLIC << 56)
                | (Self::TYPE_INDIVIDUAL << 52)
                | (Self::INSTANCE_DESKTOP << 32)
                | u64::from(account_id),
        )
    }

    /// The low 32 bits: the account number.
    pub fn account_id(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// The raw 64-bit value.
    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for SteamId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EResult: the server's result code
// ---------------------------------------------------------------------------

/// A server result code carried in headers and response bodies.
///
/// Same newtype-with-constants shape as [`EMsg`](crate::EMsg): the server
/// may send codes this client has never heard of, so this is not a Rust
/// `enum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EResult(pub i32);

#[allow(non_upper_case_globals)]
impl EResult {
    pub const Invalid: EResult = EResult(0);
    pub const OK: EResult = EResult(1);
    pub const Fail: EResult = EResult(2);
    pub const NoConnection: EResult = EResult(3);
    pub const InvalidPassword: EResult = EResult(5);
    pub const LoggedInElsewhere: EResult = EResult(6);
    pub const InvalidProtocolVer: EResult = EResult(7);
    pub const InvalidParam: EResult = EResult(8);
    pub const FileNotFound: EResult = EResult(9);
    pub const Busy: EResult = EResult(10);
    pub const InvalidState: EResult = EResult(11);
    pub const InvalidName: EResult = EResult(12);
    pub const InvalidEmail: EResult = EResult(13);
    pub const DuplicateName: EResult = EResult(14);
    pub const AccessDenied: EResult = EResult(15);
    pub const Timeout: EResult = EResult(16);
    pub const Banned: EResult = EResult(17);
    pub const AccountNotFound: EResult = EResult(18);
    pub const InvalidSteamID: EResult = EResult(19);
    pub const ServiceUnavailable: EResult = EResult(20);
    pub const NotLoggedOn: EResult = EResult(21);
    pub const LimitExceeded: EResult = EResult(25);
    pub const DuplicateRequest: EResult = EResult(29);
    pub const Blocked: EResult = EResult(40);
    pub const Ignored: EResult = EResult(41);
    pub const NoMatch: EResult = EResult(42);
    pub const AccountDisabled: EResult = EResult(43);
    pub const TryAnotherCM: EResult = EResult(48);
    pub const RateLimitExceeded: EResult = EResult(84);
    pub const AccountLoginDeniedNeedTwoFactor: EResult = EResult(85);
    pub const TwoFactorCodeMismatch: EResult = EResult(88);

    /// Whether this is [`EResult::OK`].
    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            0 => "Invalid",
            1 => "OK",
            2 => "Fail",
            3 => "NoConnection",
            5 => "InvalidPassword",
            6 => "LoggedInElsewhere",
            7 => "InvalidProtocolVer",
            8 => "InvalidParam",
            9 => "FileNotFound",
            10 => "Busy",
            11 => "InvalidState",
            12 => "InvalidName",
            13 => "InvalidEmail",
            14 => "DuplicateName",
            15 => "AccessDenied",
            16 => "Timeout",
            17 => "Banned",
            18 => "AccountNotFound",
            19 => "InvalidSteamID",
            20 => "ServiceUnavailable",
            21 => "NotLoggedOn",
            25 => "LimitExceeded",
            29 => "DuplicateRequest",
            40 => "Blocked",
            41 => "Ignored",
            42 => "NoMatch",
            43 => "AccountDisabled",
            48 => "TryAnotherCM",
            84 => "RateLimitExceeded",
            85 => "AccountLoginDeniedNeedTwoFactor",
            88 => "TwoFactorCodeMismatch",
            _ => return None,
        })
    }
}

impl fmt::Display for EResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "EResult({})", self.0),
        }
    }
}

// ---------------------------------------------------------------------------
// PacketHeader: the protobuf envelope header
// ---------------------------------------------------------------------------

/// Job id value meaning "no job". Used for both source and target.
pub const NO_JOB: u64 = u64::MAX;

/// The header that precedes every protobuf-envelope message body.
///
/// Only the fields this client reads or writes are declared; unknown
/// fields on incoming headers are skipped by the decoder. Field numbers
/// match the server's `CMsgProtoBufHeader`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PacketHeader {
    #[prost(fixed64, optional, tag = "1")]
    pub steamid: Option<u64>,
    #[prost(int32, optional, tag = "2")]
    pub client_sessionid: Option<i32>,
    #[prost(fixed64, optional, tag = "10")]
    pub jobid_source: Option<u64>,
    #[prost(fixed64, optional, tag = "11")]
    pub jobid_target: Option<u64>,
    #[prost(string, optional, tag = "12")]
    pub target_job_name: Option<String>,
    #[prost(int32, optional, tag = "13")]
    pub eresult: Option<i32>,
    #[prost(string, optional, tag = "14")]
    pub error_message: Option<String>,
}

impl PacketHeader {
    /// The sender's identity, or the zero id when absent.
    pub fn steam_id(&self) -> SteamId {
        SteamId(self.steamid.unwrap_or(0))
    }

    /// The session id, or 0 when absent.
    pub fn session_id(&self) -> i32 {
        self.client_sessionid.unwrap_or(0)
    }

    /// The job this message answers, or [`NO_JOB`].
    pub fn target_job(&self) -> u64 {
        self.jobid_target.unwrap_or(NO_JOB)
    }

    /// The job this message starts, or [`NO_JOB`].
    pub fn source_job(&self) -> u64 {
        self.jobid_source.unwrap_or(NO_JOB)
    }

    /// The header result code. Absent means `Fail`, matching the server's
    /// declared default.
    pub fn result(&self) -> EResult {
        EResult(self.eresult.unwrap_or(EResult::Fail.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_individual_steam_id_layout() {
        let id = SteamId::individual(12345);
        assert_eq!(id.to_u64(), 76561197960278073);
        assert_eq!(id.account_id(), 12345);
    }

    #[test]
    fn test_eresult_display() {
        assert_eq!(EResult::OK.to_string(), "OK (1)");
        assert_eq!(EResult(9999).to_string(), "EResult(9999)");
        assert!(EResult::OK.is_ok());
        assert!(!EResult::Fail.is_ok());
    }

    #[test]
    fn test_header_defaults() {
        let hdr = PacketHeader::default();
        assert_eq!(hdr.target_job(), NO_JOB);
        assert_eq!(hdr.source_job(), NO_JOB);
        assert_eq!(hdr.result(), EResult::Fail);
        assert_eq!(hdr.steam_id(), SteamId(0));
    }
}
