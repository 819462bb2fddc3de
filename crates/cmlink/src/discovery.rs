//! Server discovery hook.
//!
//! cmlink doesn't fetch the CM server list itself; that takes an HTTP
//! client and belongs to whoever embeds this crate. Instead it defines
//! the [`ServerDiscovery`] trait: one async method returning candidate
//! servers. [`CmClient::connect`](crate::CmClient::connect) calls it,
//! keeps the candidates of the configured transport, and dials one at
//! random.
//!
//! [`CmServer::parse_directory`] turns the directory service's JSON
//! document into candidates, and [`StaticServers`] serves a fixed list.

use std::future::Future;

use cmlink_transport::TransportKind;
use serde::Deserialize;

use crate::ClientError;

/// One candidate CM endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmServer {
    /// `host:port` for TCP. For WebSocket either a bare host (dialed as
    /// `wss://{host}/cmsocket/`) or a full `ws://` / `wss://` URL.
    pub addr: String,
    pub kind: TransportKind,
}

impl CmServer {
    pub fn new(addr: impl Into<String>, kind: TransportKind) -> Self {
        Self {
            addr: addr.into(),
            kind,
        }
    }

    /// Parses a CM directory response.
    ///
    /// Entries of type `"websockets"` and `"netfilter"` map to the
    /// WebSocket and TCP transports; other types are skipped.
    ///
    /// # Errors
    /// [`ClientError::Discovery`] if the document is not valid JSON of the
    /// expected shape or lists no usable server.
    pub fn parse_directory(json: &str) -> Result<Vec<CmServer>, ClientError> {
        let doc: DirectoryDocument =
            serde_json::from_str(json).map_err(|e| ClientError::Discovery(e.to_string()))?;

        let servers: Vec<CmServer> = doc
            .response
            .serverlist
            .into_iter()
            .filter_map(|entry| {
                let kind = match entry.kind.as_str() {
                    "websockets" => TransportKind::WebSocket,
                    "netfilter" => TransportKind::Tcp,
                    other => {
                        tracing::debug!(endpoint = %entry.endpoint, kind = other, "skipping CM entry");
                        return None;
                    }
                };
                Some(CmServer::new(entry.endpoint, kind))
            })
            .collect();

        if servers.is_empty() {
            return Err(ClientError::Discovery("directory lists no servers".into()));
        }
        Ok(servers)
    }
}

#[derive(Deserialize)]
struct DirectoryDocument {
    response: DirectoryResponse,
}

#[derive(Deserialize)]
struct DirectoryResponse {
    #[serde(default)]
    serverlist: Vec<DirectoryEntry>,
}

#[derive(Deserialize)]
struct DirectoryEntry {
    endpoint: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Supplies candidate CM servers.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` so the client can be shared across tasks, and
/// the returned future is `Send` so `connect` can run on any worker.
///
/// # Example
///
/// ```
/// use cmlink::{ClientError, CmServer, ServerDiscovery, TransportKind};
///
/// /// Always offers the same local endpoint.
/// struct LocalCm;
///
/// impl ServerDiscovery for LocalCm {
///     async fn servers(&self) -> Result<Vec<CmServer>, ClientError> {
///         Ok(vec![CmServer::new("ws://127.0.0.1:27020", TransportKind::WebSocket)])
///     }
/// }
/// ```
pub trait ServerDiscovery: Send + Sync + 'static {
    /// Returns the current candidate list.
    fn servers(&self) -> impl Future<Output = Result<Vec<CmServer>, ClientError>> + Send;
}

/// A fixed server list.
#[derive(Debug, Clone, Default)]
pub struct StaticServers(Vec<CmServer>);

impl StaticServers {
    pub fn new(servers: Vec<CmServer>) -> Self {
        Self(servers)
    }

    /// A list holding a single server.
    pub fn single(addr: impl Into<String>, kind: TransportKind) -> Self {
        Self(vec![CmServer::new(addr, kind)])
    }
}

impl ServerDiscovery for StaticServers {
    async fn servers(&self) -> Result<Vec<CmServer>, ClientError> {
        Ok(self.0.clone())
    }
}
