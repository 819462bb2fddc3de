//! `CmClient`: connection lifecycle and logon.
//!
//! ```text
//! Disconnected --connect--> Connected --login--> LoggedIn
//!      ^                        |                   |
//!      +------ disconnect / server logoff / I/O error
//! ```
//!
//! `reconnect` tears the current connection down and connects again.
//! Logon is never replayed: call [`CmClient::login`] after it.

use std::sync::Arc;
use std::time::Duration;

use cmlink_protocol::messages::{CMsgClientHello, CMsgClientLogon, CMsgClientLogonResponse};
use cmlink_protocol::{EMsg, EResult, Packet, PacketHeader, SteamId};
use cmlink_transport::{CmConnection, Connection};
use rand::seq::IndexedRandom;
use tracing::{debug, info};

use crate::builder::CmClientBuilder;
use crate::discovery::{CmServer, ServerDiscovery};
use crate::session::Session;
use crate::{ClientConfig, ClientError, RequestError};

/// An async CM client.
///
/// Cloning is cheap and every clone drives the same connection.
///
/// # Example
///
/// ```rust,no_run
/// use cmlink::prelude::*;
///
/// # async fn run() -> Result<(), ClientError> {
/// let client = CmClient::builder()
///     .on_friend_message(|m| println!("{}: {}", m.sender, m.message))
///     .build(StaticServers::single("cm.example.net:443", TransportKind::WebSocket));
///
/// client.connect().await?;
/// client.login("account", "access-token", SteamId::individual(12345)).await?;
/// client.set_persona_state(PersonaState::Online).await?;
/// # Ok(())
/// # }
/// ```
pub struct CmClient<D> {
    pub(crate) discovery: Arc<D>,
    pub(crate) session: Arc<Session>,
}

impl<D> Clone for CmClient<D> {
    fn clone(&self) -> Self {
        Self {
            discovery: Arc::clone(&self.discovery),
            session: Arc::clone(&self.session),
        }
    }
}

impl CmClient<()> {
    /// Creates a new builder.
    pub fn builder() -> CmClientBuilder {
        CmClientBuilder::new()
    }
}

impl<D: ServerDiscovery> CmClient<D> {
    /// Picks a server and dials it.
    ///
    /// A connection left behind by a server logoff or an I/O failure is
    /// cleaned up first.
    ///
    /// # Errors
    /// - [`ClientError::AlreadyConnected`] while a live connection exists.
    /// - [`ClientError::NoServers`] if discovery offers none of the
    ///   configured transport.
    /// - [`ClientError::Transport`] if dialing or the handshake fails.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let _lifecycle = self.session.lifecycle.lock().await;
        self.connect_locked().await
    }

    /// Disconnects if needed, then connects again. Logon is not replayed.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        let _lifecycle = self.session.lifecycle.lock().await;
        self.session.teardown(false).await;
        self.connect_locked().await
    }

    async fn connect_locked(&self) -> Result<(), ClientError> {
        if self.session.has_connection() {
            if self.session.is_connected() {
                return Err(ClientError::AlreadyConnected);
            }
            self.session.teardown(false).await;
        }

        let kind = self.session.config.transport;
        let servers = self.discovery.servers().await?;
        let server = {
            let candidates: Vec<&CmServer> = servers.iter().filter(|s| s.kind == kind).collect();
            candidates.choose(&mut rand::rng()).map(|s| (*s).clone())
        }
        .ok_or(ClientError::NoServers(kind))?;

        info!(addr = %server.addr, transport = %kind, "connecting");
        let config = &self.session.config;
        let conn = CmConnection::connect(
            kind,
            &server.addr,
            config.max_ws_message_size,
            config.server_key.as_ref(),
        )
        .await?;
        info!(addr = conn.remote_addr(), "connected");

        self.session.attach(conn);
        Ok(())
    }
}

impl<D> CmClient<D> {
    /// Logs on with an access token obtained elsewhere.
    ///
    /// On success the identity and session id from the response are
    /// stamped on every later request, and heartbeats start.
    ///
    /// # Errors
    /// - [`ClientError::NotConnected`] without a connection.
    /// - [`ClientError::Login`] if the server rejects the logon. The
    ///   connection stays open.
    /// - [`ClientError::Request`] if the response never arrives.
    pub async fn login(
        &self,
        account_name: &str,
        access_token: &str,
        steam_id: SteamId,
    ) -> Result<(), ClientError> {
        const WHAT: &str = "ClientLogon";
        let config = &self.session.config;

        let hello = CMsgClientHello {
            protocol_version: Some(config.protocol_version),
        };
        self.session
            .send(
                "ClientHello",
                Packet::from_message(EMsg::ClientHello, PacketHeader::default(), &hello),
            )
            .await?;

        let header = PacketHeader {
            steamid: Some(SteamId::individual(steam_id.account_id()).to_u64()),
            client_sessionid: Some(0),
            ..PacketHeader::default()
        };
        let logon = CMsgClientLogon {
            protocol_version: Some(config.protocol_version),
            client_language: Some(config.client_language.clone()),
            client_os_type: Some(config.client_os_type),
            should_remember_password: Some(true),
            account_name: Some(account_name.to_string()),
            access_token: Some(access_token.to_string()),
        };
        let packet = Packet::from_message(EMsg::ClientLogon, header, &logon);

        // Registered before the send: the reply may beat the send's return.
        let slot = self.session.register_tag(EMsg::ClientLogOnResponse);
        let reply = self.session.request(WHAT, packet, slot).await?;

        let response: CMsgClientLogonResponse =
            reply
                .decode_body("ClientLogonResponse")
                .map_err(|source| RequestError::Decode {
                    what: WHAT.to_string(),
                    source,
                })?;
        let result = EResult(response.eresult.unwrap_or(EResult::Fail.0));
        if !result.is_ok() {
            return Err(ClientError::Login(result));
        }

        let steam_id = reply.header.steam_id();
        let session_id = reply.header.session_id();
        self.session.set_logged_in(steam_id, session_id);

        let interval = heartbeat_interval(&response, config.heartbeat_fallback);
        self.session.start_heartbeat(interval);
        info!(%steam_id, session_id, heartbeat = ?interval, "logged in");
        Ok(())
    }

    /// Logs off, closes the connection and waits for background work to
    /// stop. The disconnect callback fires once. Does nothing when not
    /// connected.
    pub async fn disconnect(&self) {
        let _lifecycle = self.session.lifecycle.lock().await;
        debug!("disconnect requested");
        self.session.teardown(true).await;
    }

    /// Our identity, once logged in.
    pub fn steam_id(&self) -> Option<SteamId> {
        let state = self.session.state();
        state.logged_in.then_some(state.steam_id)
    }

    /// The server-assigned session id, once logged in.
    pub fn session_id(&self) -> Option<i32> {
        let state = self.session.state();
        state.logged_in.then_some(state.session_id)
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.state().logged_in
    }

    pub fn config(&self) -> &ClientConfig {
        &self.session.config
    }
}

fn heartbeat_interval(response: &CMsgClientLogonResponse, fallback: Duration) -> Duration {
    match response.heartbeat_seconds.or(response.legacy_out_of_game_heartbeat_seconds) {
        Some(secs) if secs > 0 => Duration::from_secs(secs.unsigned_abs().into()),
        _ => fallback.max(Duration::from_secs(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_interval_prefers_server_value() {
        let response = CMsgClientLogonResponse {
            heartbeat_seconds: Some(9),
            legacy_out_of_game_heartbeat_seconds: Some(20),
            ..CMsgClientLogonResponse::default()
        };
        assert_eq!(
            heartbeat_interval(&response, Duration::from_secs(30)),
            Duration::from_secs(9)
        );
    }

    #[test]
    fn test_heartbeat_interval_falls_back() {
        let legacy_only = CMsgClientLogonResponse {
            legacy_out_of_game_heartbeat_seconds: Some(20),
            ..CMsgClientLogonResponse::default()
        };
        assert_eq!(
            heartbeat_interval(&legacy_only, Duration::from_secs(30)),
            Duration::from_secs(20)
        );

        let zero = CMsgClientLogonResponse {
            heartbeat_seconds: Some(0),
            ..CMsgClientLogonResponse::default()
        };
        assert_eq!(
            heartbeat_interval(&zero, Duration::from_secs(30)),
            Duration::from_secs(30)
        );
        assert_eq!(
            heartbeat_interval(&zero, Duration::ZERO),
            Duration::from_secs(1)
        );
    }
}
