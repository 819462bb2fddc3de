//! Client configuration.

use std::time::Duration;

use cmlink_protocol::PROTOCOL_VERSION;
use cmlink_transport::{DEFAULT_MAX_MESSAGE_SIZE, RsaPublicKey, TransportKind};
use serde::{Deserialize, Serialize};

/// Tunables for a [`CmClient`](crate::CmClient).
///
/// Every field has a default, so a partial document deserializes:
///
/// ```
/// # use cmlink::ClientConfig;
/// let cfg: ClientConfig = serde_json::from_str(r#"{ "transport": "tcp" }"#).unwrap();
/// assert_eq!(cfg.client_language, "english");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Which transport to dial. Discovery results of the other kind are
    /// ignored.
    pub transport: TransportKind,
    /// How long a request waits for its response.
    pub request_timeout: Duration,
    /// Heartbeat interval used when the logon response does not name one.
    pub heartbeat_fallback: Duration,
    /// Largest inbound WebSocket message accepted.
    pub max_ws_message_size: usize,
    /// Protocol version sent in hello and logon.
    pub protocol_version: u32,
    pub client_language: String,
    pub client_os_type: u32,
    /// Public key for the TCP encryption handshake, for servers outside
    /// the public universe. `None` uses the compiled-in CM key.
    #[serde(skip)]
    pub server_key: Option<RsaPublicKey>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::WebSocket,
            request_timeout: Duration::from_secs(30),
            heartbeat_fallback: Duration::from_secs(30),
            max_ws_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            protocol_version: PROTOCOL_VERSION,
            client_language: "english".to_string(),
            client_os_type: 20,
            server_key: None,
        }
    }
}
