//! Per-client connection state and its background tasks.
//!
//! A [`Session`] outlives individual connections. Each `connect` attaches
//! a fresh transport, a fresh done signal, and one read-loop task; `login`
//! adds one heartbeat task, replacing any earlier one. Teardown stops
//! both, waits for them, and resets the once-only latches so the same
//! session can connect again.
//!
//! Two latches guard the end of a connection:
//!
//! - `done_closed` makes "publish the done signal" happen once.
//! - `disconnect_fired` makes "run the disconnect callback" happen once.
//!
//! Both are tripped from either end: the read loop when the server logs
//! us off or the transport fails, and [`Session::teardown`] when the
//! caller disconnects. Whichever gets there first wins.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cmlink_protocol::messages::{CMsgClientHeartBeat, CMsgClientLogOff};
use cmlink_protocol::{EMsg, EResult, Packet, PacketHeader, SteamId};
use cmlink_transport::{CmConnection, Connection, MAX_FRAME_LEN, TransportError};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::handlers::EventHandlers;
use crate::latch::Latch;
use crate::pending::{PendingRegistry, PendingSlot, SlotKey};
use crate::{ClientError, RequestError};

/// Why a connection ended, passed to the disconnect callback.
#[derive(Debug)]
pub struct DisconnectEvent {
    /// The transport failure that ended the connection, if any.
    pub error: Option<TransportError>,
    /// `true` when the server sent a logoff.
    pub server_initiated: bool,
    /// The result code from the server's logoff.
    pub result: Option<EResult>,
}

impl DisconnectEvent {
    pub(crate) fn requested() -> Self {
        Self {
            error: None,
            server_initiated: false,
            result: None,
        }
    }

    pub(crate) fn logged_off(result: EResult) -> Self {
        Self {
            error: None,
            server_initiated: true,
            result: Some(result),
        }
    }

    pub(crate) fn failed(error: TransportError) -> Self {
        Self {
            error: Some(error),
            server_initiated: false,
            result: None,
        }
    }

    /// `true` when the caller asked for the disconnect.
    pub fn is_requested(&self) -> bool {
        self.error.is_none() && !self.server_initiated
    }
}

/// State shared between the caller, the read loop and the heartbeat.
pub(crate) struct SharedState {
    pub(crate) logged_in: bool,
    pub(crate) steam_id: SteamId,
    pub(crate) session_id: i32,
    pub(crate) conn: Option<Arc<CmConnection>>,
    /// `true` once the current connection is finished.
    pub(crate) done: watch::Sender<bool>,
    pub(crate) pending: PendingRegistry,
    /// Dropping this stops the running heartbeat.
    heartbeat_stop: Option<oneshot::Sender<()>>,
}

pub(crate) struct Session {
    pub(crate) config: ClientConfig,
    pub(crate) handlers: EventHandlers,
    state: Mutex<SharedState>,
    next_job_id: AtomicU64,
    next_slot_id: AtomicU64,
    done_closed: Latch,
    disconnect_fired: Latch,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Serializes connect, disconnect and reconnect.
    pub(crate) lifecycle: tokio::sync::Mutex<()>,
}

impl Session {
    pub(crate) fn new(config: ClientConfig, handlers: EventHandlers) -> Self {
        // No connection yet: the done signal starts out set.
        let (done, _) = watch::channel(true);
        Self {
            config,
            handlers,
            state: Mutex::new(SharedState {
                logged_in: false,
                steam_id: SteamId(0),
                session_id: 0,
                conn: None,
                done,
                pending: PendingRegistry::default(),
                heartbeat_stop: None,
            }),
            next_job_id: AtomicU64::new(1),
            next_slot_id: AtomicU64::new(1),
            done_closed: Latch::new(),
            disconnect_fired: Latch::new(),
            tasks: Mutex::new(Vec::new()),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Locks the shared state. Never held across an `.await`.
    pub(crate) fn state(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn next_job_id(&self) -> u64 {
        self.next_job_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state().conn.is_some() && !self.done_closed.is_tripped()
    }

    pub(crate) fn has_connection(&self) -> bool {
        self.state().conn.is_some()
    }

    /// Registers a slot for the response to job `job_id`.
    pub(crate) fn register_job(&self, job_id: u64) -> PendingSlot<'_> {
        self.register(SlotKey::Job(job_id))
    }

    /// Registers a slot for the next packet tagged `emsg`.
    pub(crate) fn register_tag(&self, emsg: EMsg) -> PendingSlot<'_> {
        let id = self.next_slot_id.fetch_add(1, Ordering::Relaxed);
        self.register(SlotKey::Tag { emsg, id })
    }

    fn register(&self, key: SlotKey) -> PendingSlot<'_> {
        let (tx, rx) = oneshot::channel();
        let done = {
            let mut state = self.state();
            state.pending.insert(key, tx);
            state.done.subscribe()
        };
        PendingSlot {
            session: self,
            key,
            rx,
            done,
        }
    }

    /// Sends `packet`, stamping identity and session once logged in.
    ///
    /// `what` names the request in any error.
    pub(crate) async fn send(&self, what: &str, mut packet: Packet) -> Result<(), ClientError> {
        let conn = {
            let state = self.state();
            if state.logged_in {
                packet.header.steamid = Some(state.steam_id.to_u64());
                packet.header.client_sessionid = Some(state.session_id);
            }
            state.conn.clone().ok_or(ClientError::NotConnected)?
        };

        let wire = packet.encode();
        if wire.len() > MAX_FRAME_LEN {
            return Err(RequestError::Encode {
                what: what.to_string(),
                size: wire.len(),
                limit: MAX_FRAME_LEN,
            }
            .into());
        }

        debug!(emsg = %packet.emsg, len = wire.len(), "sending packet");
        conn.send(&wire).await.map_err(|source| RequestError::Send {
            what: what.to_string(),
            source,
        })?;
        Ok(())
    }

    /// Sends `packet` and waits on `slot`, registered beforehand.
    pub(crate) async fn request(
        &self,
        what: &str,
        packet: Packet,
        slot: PendingSlot<'_>,
    ) -> Result<Packet, ClientError> {
        self.send(what, packet).await?;
        slot.wait(self.config.request_timeout)
            .await
            .map_err(|source| {
                RequestError::Await {
                    what: what.to_string(),
                    source,
                }
                .into()
            })
    }

    /// Installs a new connection and starts its read loop.
    pub(crate) fn attach(self: &Arc<Self>, conn: CmConnection) {
        let conn = Arc::new(conn);
        let (done_tx, done_rx) = watch::channel(false);
        {
            let mut state = self.state();
            state.conn = Some(Arc::clone(&conn));
            state.done = done_tx;
            state.logged_in = false;
            state.heartbeat_stop = None;
        }
        self.done_closed.reset();
        self.disconnect_fired.reset();

        let task = tokio::spawn(Arc::clone(self).read_loop(conn, done_rx));
        self.track(task);
    }

    /// Records a successful logon.
    pub(crate) fn set_logged_in(&self, steam_id: SteamId, session_id: i32) {
        let mut state = self.state();
        state.steam_id = steam_id;
        state.session_id = session_id;
        state.logged_in = true;
    }

    /// Starts the heartbeat, stopping any earlier one on this connection.
    pub(crate) fn start_heartbeat(self: &Arc<Self>, interval: Duration) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let done = {
            let mut state = self.state();
            state.heartbeat_stop = Some(stop_tx);
            state.done.subscribe()
        };
        let task = tokio::spawn(Arc::clone(self).heartbeat_loop(interval, done, stop_rx));
        self.track(task);
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    /// Publishes the done signal, once per connection.
    pub(crate) fn close_done(&self) {
        if self.done_closed.trip() {
            self.state().done.send_replace(true);
        }
    }

    /// Runs the disconnect callback, once per connection, on its own task.
    pub(crate) fn fire_disconnect(&self, event: DisconnectEvent) {
        if !self.disconnect_fired.trip() {
            return;
        }
        self.state().logged_in = false;
        if let Some(handler) = self.handlers.disconnect.clone() {
            tokio::spawn(async move { handler(&event) });
        }
    }

    /// Ends the current connection, if any, and waits for its tasks.
    ///
    /// With `notify` the disconnect callback fires (unless the connection
    /// already ended on its own and fired it).
    pub(crate) async fn teardown(&self, notify: bool) {
        let (conn, logoff) = {
            let mut state = self.state();
            let logoff = state.logged_in.then(|| PacketHeader {
                steamid: Some(state.steam_id.to_u64()),
                client_sessionid: Some(state.session_id),
                ..PacketHeader::default()
            });
            state.logged_in = false;
            (state.conn.clone(), logoff)
        };

        let Some(conn) = conn else {
            self.done_closed.reset();
            self.disconnect_fired.reset();
            return;
        };

        if let Some(header) = logoff {
            if !self.done_closed.is_tripped() {
                let packet = Packet::from_message(EMsg::ClientLogOff, header, &CMsgClientLogOff {});
                if let Err(e) = conn.send(&packet.encode()).await {
                    debug!(error = %e, "logoff notice not sent");
                }
            }
        }

        self.close_done();
        if notify {
            self.fire_disconnect(DisconnectEvent::requested());
        }
        if let Err(e) = conn.close().await {
            debug!(error = %e, "close failed");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }

        {
            let mut state = self.state();
            state.conn = None;
            state.pending.clear();
            state.heartbeat_stop = None;
        }
        self.done_closed.reset();
        self.disconnect_fired.reset();
        info!(addr = conn.remote_addr(), "disconnected");
    }

    async fn read_loop(self: Arc<Self>, conn: Arc<CmConnection>, mut done: watch::Receiver<bool>) {
        loop {
            let received = tokio::select! {
                biased;
                () = wait_closed(&mut done) => return,
                received = conn.recv() => received,
            };

            let error = match received {
                Ok(Some(data)) => {
                    let packet = match Packet::decode(&data) {
                        Ok(packet) => packet,
                        Err(e) => {
                            warn!(error = %e, len = data.len(), "dropping undecodable packet");
                            continue;
                        }
                    };
                    if self.dispatch(packet).is_break() {
                        if let Err(e) = conn.close().await {
                            debug!(error = %e, "close after logoff failed");
                        }
                        return;
                    }
                    continue;
                }
                Ok(None) => TransportError::ConnectionClosed("server closed the connection".into()),
                Err(e) => e,
            };

            if self.done_closed.is_tripped() {
                return;
            }
            error!(error = %error, "connection lost");
            self.close_done();
            if let Err(e) = conn.close().await {
                debug!(error = %e, "close after failure failed");
            }
            self.fire_disconnect(DisconnectEvent::failed(error));
            return;
        }
    }

    async fn heartbeat_loop(
        self: Arc<Self>,
        interval: Duration,
        mut done: watch::Receiver<bool>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = wait_closed(&mut done) => return,
                _ = &mut stop => {
                    debug!("heartbeat replaced");
                    return;
                }
                _ = ticker.tick() => {
                    let packet = Packet::from_message(
                        EMsg::ClientHeartBeat,
                        PacketHeader::default(),
                        &CMsgClientHeartBeat::default(),
                    );
                    if let Err(e) = self.send("ClientHeartBeat", packet).await {
                        warn!(error = %e, "heartbeat failed, stopping");
                        return;
                    }
                    debug!("heartbeat sent");
                }
            }
        }
    }

    /// Handles a server-sent logoff: ends the connection, reports it once.
    pub(crate) fn on_logged_off(&self, result: EResult) -> ControlFlow<()> {
        warn!(result = %result, "logged off by server");
        self.close_done();
        self.fire_disconnect(DisconnectEvent::logged_off(result));
        ControlFlow::Break(())
    }
}

/// Resolves once `done` reads `true` or its sender is gone.
///
/// The guard `wait_for` returns is not `Send` and must not reach a
/// `select!` output in a spawned task.
pub(crate) async fn wait_closed(done: &mut watch::Receiver<bool>) {
    let _ = done.wait_for(|closed| *closed).await;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::WaitError;

    fn counting_session() -> (Arc<Session>, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handlers = EventHandlers {
            disconnect: Some(Arc::new(move |_: &DisconnectEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..EventHandlers::default()
        };
        (Arc::new(Session::new(ClientConfig::default(), handlers)), fired)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_disconnect_fires_once_across_both_paths() {
        let (session, fired) = counting_session();

        let _ = session.on_logged_off(EResult::LoggedInElsewhere);
        session.close_done();
        session.fire_disconnect(DisconnectEvent::requested());
        settle().await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_path_first_then_server() {
        let (session, fired) = counting_session();

        session.close_done();
        session.fire_disconnect(DisconnectEvent::requested());
        let flow = session.on_logged_off(EResult::LoggedInElsewhere);
        settle().await;

        assert!(flow.is_break());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_teardown_without_connection_resets_latches() {
        let (session, fired) = counting_session();
        session.fire_disconnect(DisconnectEvent::requested());
        session.teardown(true).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // A later connection gets its own notification.
        session.fire_disconnect(DisconnectEvent::requested());
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_send_without_connection() {
        let (session, _) = counting_session();
        let packet = Packet::proto(EMsg::ClientHello, PacketHeader::default(), vec![]);
        let err = session.send("ClientHello", packet).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[tokio::test]
    async fn test_slot_sees_done_signal() {
        let (session, _) = counting_session();
        {
            let (done, _) = watch::channel(false);
            session.state().done = done;
        }
        let slot = session.register_tag(EMsg::ClientLogOnResponse);
        session.close_done();

        let err = slot.wait(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err, WaitError::Disconnected);
        assert_eq!(session.state().pending.len(), 0);
    }

    #[tokio::test]
    async fn test_slot_times_out_and_deregisters() {
        let (session, _) = counting_session();
        {
            let (done, _) = watch::channel(false);
            session.state().done = done;
        }
        let slot = session.register_job(session.next_job_id());
        assert_eq!(session.state().pending.len(), 1);

        let err = slot.wait(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err, WaitError::Timeout);
        assert_eq!(session.state().pending.len(), 0);
    }

    #[tokio::test]
    async fn test_second_heartbeat_replaces_first() {
        let (session, _) = counting_session();
        {
            let (done, _) = watch::channel(false);
            session.state().done = done;
        }

        session.start_heartbeat(Duration::from_secs(3600));
        session.start_heartbeat(Duration::from_secs(3600));
        settle().await;

        let live = |session: &Session| {
            let tasks = session.tasks.lock().unwrap();
            tasks.iter().filter(|t| !t.is_finished()).count()
        };
        assert_eq!(live(&session), 1);

        session.close_done();
        settle().await;
        assert_eq!(live(&session), 0);
    }

    #[test]
    fn test_job_ids_increase() {
        let session = Session::new(ClientConfig::default(), EventHandlers::default());
        let a = session.next_job_id();
        let b = session.next_job_id();
        assert!(b > a);
    }
}
