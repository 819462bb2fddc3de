//! End-to-end tests for `CmClient` over the encrypted TCP transport.
//!
//! The fake server holds the private half of a test key pair and the
//! client is built with the public half, so the server can unwrap the
//! session key and speak the encrypted channel.

use std::time::Duration;

use cmlink::prelude::*;
use cmlink_crypto::{ChannelCipher, SESSION_KEY_LEN};
use cmlink_protocol::handshake::{EncryptRequest, EncryptResponse, EncryptResult};
use cmlink_protocol::messages::CMsgClientLogonResponse;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Oaep, RsaPrivateKey};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const TEST_KEY_PEM: &str = include_str!("../../cmlink-crypto/testdata/test_rsa_1024.pem");
const MAGIC: &[u8; 4] = b"VT01";
const ACCOUNT_ID: u32 = 777;
const SESSION_ID: i32 = 42;

fn test_private_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(TEST_KEY_PEM).unwrap()
}

async fn write_frame(stream: &mut TcpStream, payload: &[u8]) {
    let mut frame = (payload.len() as u32).to_le_bytes().to_vec();
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(payload);
    stream.write_all(&frame).await.unwrap();
}

/// Next frame payload, or `None` once the client has closed.
async fn read_frame(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await.ok()?;
    assert_eq!(&header[4..], MAGIC);
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.ok()?;
    Some(payload)
}

/// Server side of one encrypted connection.
struct FakeCm {
    stream: TcpStream,
    cipher: ChannelCipher,
}

impl FakeCm {
    async fn accept(listener: &TcpListener, key: &RsaPrivateKey) -> Self {
        let (mut stream, _) = listener.accept().await.unwrap();
        let challenge = [0x5Au8; 16];

        let request = EncryptRequest {
            protocol_version: 1,
            universe: 1,
            challenge: Some(challenge),
        };
        write_frame(&mut stream, &request.encode()).await;

        let raw = read_frame(&mut stream).await.expect("encrypt response");
        let response = EncryptResponse::decode(&raw).unwrap();
        let blob = key
            .decrypt(Oaep::new::<sha1::Sha1>(), &response.encrypted_key)
            .unwrap();
        assert_eq!(&blob[SESSION_KEY_LEN..], &challenge);

        let result = EncryptResult { result: EResult::OK };
        write_frame(&mut stream, &result.encode()).await;

        let cipher = ChannelCipher::new(&blob[..SESSION_KEY_LEN], true).unwrap();
        Self { stream, cipher }
    }

    async fn recv(&mut self) -> Option<Packet> {
        let frame = read_frame(&mut self.stream).await?;
        let plain = self.cipher.decrypt(&frame).expect("client frame should decrypt");
        Some(Packet::decode(&plain).unwrap())
    }

    async fn send(&mut self, packet: &Packet) {
        let frame = self.cipher.encrypt(&packet.encode()).unwrap();
        write_frame(&mut self.stream, &frame).await;
    }

    async fn serve_login(&mut self) {
        assert_eq!(self.recv().await.expect("hello").emsg, EMsg::ClientHello);
        assert_eq!(self.recv().await.expect("logon").emsg, EMsg::ClientLogon);

        let header = PacketHeader {
            steamid: Some(SteamId::individual(ACCOUNT_ID).to_u64()),
            client_sessionid: Some(SESSION_ID),
            ..PacketHeader::default()
        };
        let body = CMsgClientLogonResponse {
            eresult: Some(EResult::OK.0),
            heartbeat_seconds: Some(30),
            ..CMsgClientLogonResponse::default()
        };
        self.send(&Packet::from_message(EMsg::ClientLogOnResponse, header, &body))
            .await;
    }
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

fn tcp_client(addr: &str, key: &RsaPrivateKey) -> (CmClient<StaticServers>, mpsc::UnboundedReceiver<bool>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let client = CmClient::builder()
        .transport(TransportKind::Tcp)
        .server_key(key.to_public_key())
        .request_timeout(Duration::from_secs(5))
        .on_disconnect(move |e| {
            let _ = tx.send(e.error.is_some());
        })
        .build(StaticServers::single(addr, TransportKind::Tcp));
    (client, rx)
}

async fn login(client: &CmClient<StaticServers>) {
    client
        .login("account", "token", SteamId::individual(ACCOUNT_ID))
        .await
        .expect("login should succeed");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_tcp_login_and_disconnect() {
    let key = test_private_key();
    let (listener, addr) = bind().await;
    let (client, mut disconnects) = tcp_client(&addr, &key);

    let server = tokio::spawn(async move {
        let mut cm = FakeCm::accept(&listener, &key).await;
        cm.serve_login().await;
        let logoff = cm.recv().await.expect("logoff notice");
        (logoff, cm.recv().await.is_none())
    });

    client.connect().await.expect("should connect");
    login(&client).await;
    assert_eq!(client.session_id(), Some(SESSION_ID));

    client.disconnect().await;
    let (logoff, closed) = server.await.unwrap();
    assert_eq!(logoff.emsg, EMsg::ClientLogOff);
    assert_eq!(logoff.header.session_id(), SESSION_ID);
    assert!(closed, "client should close the socket");

    let had_error = tokio::time::timeout(Duration::from_secs(5), disconnects.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(!had_error);
}

#[tokio::test]
async fn test_tcp_bad_magic_closes_connection() {
    let key = test_private_key();
    let (listener, addr) = bind().await;
    let (client, mut disconnects) = tcp_client(&addr, &key);

    let server = tokio::spawn(async move {
        let mut cm = FakeCm::accept(&listener, &key).await;
        cm.serve_login().await;

        let mut garbage = 3u32.to_le_bytes().to_vec();
        garbage.extend_from_slice(b"XXXX");
        garbage.extend_from_slice(b"abc");
        cm.stream.write_all(&garbage).await.unwrap();

        // The client drops the socket on its own; no disconnect() call.
        tokio::time::timeout(Duration::from_secs(5), read_frame(&mut cm.stream))
            .await
            .expect("client should close the socket")
    });

    client.connect().await.unwrap();
    login(&client).await;

    let had_error = tokio::time::timeout(Duration::from_secs(5), disconnects.recv())
        .await
        .expect("disconnect should be reported")
        .unwrap();
    assert!(had_error);
    assert!(server.await.unwrap().is_none());
    assert!(!client.is_connected());
    assert!(!client.is_logged_in());

    client.disconnect().await;
}
