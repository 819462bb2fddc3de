//! Logs on to a CM server and prints what arrives until Ctrl-C or the
//! server drops us.
//!
//! ```text
//! CM_ACCOUNT=name CM_ACCESS_TOKEN=... CM_STEAM_ID=7656119... \
//! CM_SERVER=cm.example.net:443 cargo run -p cm-login
//! ```
//!
//! `CM_TRANSPORT` picks `websocket` (default) or `tcp`. Instead of
//! `CM_SERVER`, `CM_DIRECTORY` may name a saved directory JSON document.

use cmlink::prelude::*;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Settings {
    account: String,
    access_token: String,
    steam_id: SteamId,
    transport: TransportKind,
    servers: ServerSource,
}

#[derive(Debug, PartialEq)]
enum ServerSource {
    Address(String),
    Directory(String),
}

impl Settings {
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let require = |key: &str| get(key).ok_or_else(|| format!("{key} is not set"));

        let steam_id = require("CM_STEAM_ID")?
            .parse::<u64>()
            .map(SteamId)
            .map_err(|e| format!("CM_STEAM_ID: {e}"))?;

        let transport = match get("CM_TRANSPORT").as_deref() {
            None | Some("websocket") => TransportKind::WebSocket,
            Some("tcp") => TransportKind::Tcp,
            Some(other) => return Err(format!("CM_TRANSPORT: unknown transport {other:?}")),
        };

        let servers = match (get("CM_SERVER"), get("CM_DIRECTORY")) {
            (Some(addr), _) => ServerSource::Address(addr),
            (None, Some(path)) => ServerSource::Directory(path),
            (None, None) => return Err("set CM_SERVER or CM_DIRECTORY".into()),
        };

        Ok(Self {
            account: require("CM_ACCOUNT")?,
            access_token: require("CM_ACCESS_TOKEN")?,
            steam_id,
            transport,
            servers,
        })
    }

    fn discovery(&self) -> Result<StaticServers, Box<dyn std::error::Error>> {
        let servers = match &self.servers {
            ServerSource::Address(addr) => vec![CmServer::new(addr.clone(), self.transport)],
            ServerSource::Directory(path) => CmServer::parse_directory(&std::fs::read_to_string(path)?)?,
        };
        Ok(StaticServers::new(servers))
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_lookup(|key| std::env::var(key).ok())?;
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();

    let client = CmClient::builder()
        .transport(settings.transport)
        .on_friend_message(|m| {
            let tag = if m.echo { "echo" } else { "chat" };
            println!("[{tag}] {}: {}", m.sender, m.message);
        })
        .on_relationship(|e| println!("[friend] {} -> {:?}", e.steam_id, e.relationship))
        .on_persona_state(|p| println!("[presence] {} {:?} is {}", p.steam_id, p.player_name, p.state))
        .on_trade_notification(|n| println!("[trade] {} pending offers", n.trade_offers_count))
        .on_item_notification(|n| println!("[items] {} new", n.new_item_count))
        .on_disconnect(move |e| {
            let _ = closed_tx.send(format!("{e:?}"));
        })
        .build(settings.discovery()?);

    client.connect().await?;
    client
        .login(&settings.account, &settings.access_token, settings.steam_id)
        .await?;
    client.set_persona_state(PersonaState::Online).await?;
    tracing::info!(steam_id = ?client.steam_id(), "online, Ctrl-C to quit");

    tokio::select! {
        reason = closed_rx.recv() => {
            tracing::warn!(reason = reason.as_deref().unwrap_or("unknown"), "connection ended");
        }
        _ = tokio::signal::ctrl_c() => {
            client.disconnect().await;
        }
    }
    Ok(())
}
