//! Broadcast subscription over Socket.IO.
//!
//! One spawned task owns the socket and the event sender. The handle only
//! keeps the state watch, a shutdown signal and the task itself.

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crmsync_core::config::{SyncConfig, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY_MS};
use crmsync_core::session::SessionManager;
use crmsync_core::{ChangeEvent, WireUpdate};

use crate::error::{RealtimeError, Result};
use crate::protocol::{connect_error_message, Handshake, Packet, SocketPacket};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const JOIN_EVENT: &str = "join-room";
const UPDATE_EVENT: &str = "data-update";
const SOCKET_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Why the channel task finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelExit {
    /// `close()` was called.
    Closed,
    /// The event receiver was dropped.
    ListenerDropped,
    /// Every reconnection attempt failed.
    RetriesExhausted,
    /// The server refused the namespace connect.
    Refused(String),
}

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Server origin, `http(s)://` or `ws(s)://`.
    pub url: String,
    pub room: String,
    /// Attempts after the first failure before giving up.
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    /// Bound on the WebSocket upgrade plus the Socket.IO handshake.
    pub connect_timeout: Duration,
}

impl RealtimeConfig {
    pub fn new(url: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            room: room.into(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn from_sync_config(config: &SyncConfig) -> Self {
        Self {
            url: config.socket_url.clone(),
            room: config.room.clone(),
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: config.reconnect_delay,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// WebSocket endpoint of the Socket.IO server.
    pub fn socket_endpoint(&self) -> Result<String> {
        let base = self.url.trim().trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            return Err(RealtimeError::InvalidUrl(self.url.clone()));
        };
        Ok(format!("{}{}", base, SOCKET_PATH))
    }
}

/// Handle to the subscription task.
pub struct RealtimeChannel {
    config: RealtimeConfig,
    session: Option<Arc<SessionManager>>,
    state: Arc<watch::Sender<ChannelState>>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<ChannelExit>>,
}

impl RealtimeChannel {
    /// Creates a stopped channel. Call [`RealtimeChannel::start`] to connect.
    pub fn new(config: RealtimeConfig) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            config,
            session: None,
            state: Arc::new(state),
            shutdown: None,
            task: None,
        }
    }

    /// Sends the session token, read on every attempt, with connect and join.
    pub fn with_session(mut self, session: Arc<SessionManager>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Spawns the subscription task; validated events go to `events`.
    pub fn start(&mut self, events: mpsc::Sender<ChangeEvent>) -> Result<()> {
        if self.is_running() {
            return Err(RealtimeError::AlreadyRunning);
        }
        let endpoint = self.config.socket_endpoint()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Worker {
            endpoint,
            config: self.config.clone(),
            session: self.session.clone(),
            state: Arc::clone(&self.state),
            events,
            shutdown: shutdown_rx,
        };
        self.shutdown = Some(shutdown_tx);
        self.task = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Starts again after the previous task finished, e.g. once retries ran
    /// out or the connect was refused.
    pub fn restart(&mut self, events: mpsc::Sender<ChangeEvent>) -> Result<()> {
        if self.is_running() {
            return Err(RealtimeError::AlreadyRunning);
        }
        self.task = None;
        self.start(events)
    }

    /// Waits for the task to finish on its own. Cancel-safe: dropping the
    /// future keeps the task attached to the handle.
    pub async fn wait(&mut self) -> Option<ChannelExit> {
        let task = self.task.as_mut()?;
        let joined = task.await;
        self.task = None;
        match joined {
            Ok(exit) => Some(exit),
            Err(err) => {
                warn!("[Realtime] Channel task failed: {}", err);
                self.state.send_replace(ChannelState::Disconnected);
                None
            }
        }
    }

    /// Signals shutdown, closes the socket and waits for the task.
    pub async fn close(&mut self) -> Option<ChannelExit> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        self.wait().await
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.state.send_replace(ChannelState::Disconnected);
        }
    }
}

/// How one connected session ended.
enum SessionEnd {
    Shutdown,
    ListenerDropped,
    Refused(String),
    /// Transport failure; `connected` tells whether the handshake completed.
    Lost {
        error: RealtimeError,
        connected: bool,
    },
}

struct Worker {
    endpoint: String,
    config: RealtimeConfig,
    session: Option<Arc<SessionManager>>,
    state: Arc<watch::Sender<ChannelState>>,
    events: mpsc::Sender<ChangeEvent>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) -> ChannelExit {
        let exit = self.run_until_exit().await;
        self.state.send_replace(ChannelState::Disconnected);
        match &exit {
            ChannelExit::Closed => info!("[Realtime] Channel closed"),
            ChannelExit::ListenerDropped => info!("[Realtime] Listener dropped; channel stopped"),
            ChannelExit::RetriesExhausted => warn!(
                "[Realtime] Giving up after {} reconnection attempts",
                self.config.reconnect_attempts
            ),
            ChannelExit::Refused(reason) => warn!("[Realtime] Connection refused: {}", reason),
        }
        exit
    }

    async fn run_until_exit(&mut self) -> ChannelExit {
        let mut retries = 0u32;
        self.state.send_replace(ChannelState::Connecting);

        loop {
            match self.connect_once().await {
                SessionEnd::Shutdown => return ChannelExit::Closed,
                SessionEnd::ListenerDropped => return ChannelExit::ListenerDropped,
                SessionEnd::Refused(reason) => return ChannelExit::Refused(reason),
                SessionEnd::Lost { error, connected } => {
                    if connected {
                        retries = 0;
                    }
                    warn!("[Realtime] Connection lost: {}", error);
                }
            }

            if retries >= self.config.reconnect_attempts {
                return ChannelExit::RetriesExhausted;
            }
            retries += 1;
            self.state.send_replace(ChannelState::Reconnecting);
            debug!(
                "[Realtime] Reconnecting in {:?} (attempt {}/{})",
                self.config.reconnect_delay, retries, self.config.reconnect_attempts
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                _ = self.shutdown.changed() => return ChannelExit::Closed,
            }
        }
    }

    fn token(&self) -> Option<String> {
        self.session.as_ref().and_then(|session| session.token())
    }

    /// One connection from upgrade to close.
    async fn connect_once(&mut self) -> SessionEnd {
        let lost = |error| SessionEnd::Lost {
            error,
            connected: false,
        };

        let auth = self.token().map(|token| json!({ "token": token }));
        let opened = tokio::select! {
            opened = timeout(self.config.connect_timeout, open(&self.endpoint, auth)) => opened,
            _ = self.shutdown.changed() => return SessionEnd::Shutdown,
        };
        let (mut socket, handshake) = match opened {
            Ok(Ok(opened)) => opened,
            Ok(Err(RealtimeError::Refused(reason))) => return SessionEnd::Refused(reason),
            Ok(Err(error)) => return lost(error),
            Err(_) => return lost(RealtimeError::timeout("socket handshake")),
        };

        self.state.send_replace(ChannelState::Connected);
        info!("[Realtime] Connected (sid {})", handshake.sid);

        let token = self.token();
        let mut join = json!({ "room": self.config.room });
        if let Some(token) = token {
            join["token"] = Value::String(token);
        }
        if let Err(error) = send(&mut socket, &Packet::event(JOIN_EVENT, join)).await {
            return SessionEnd::Lost {
                error,
                connected: true,
            };
        }
        debug!("[Realtime] Joined room '{}'", self.config.room);

        let end = self.listen(&mut socket, handshake.liveness_window()).await;
        if matches!(end, SessionEnd::Shutdown | SessionEnd::ListenerDropped) {
            let _ = send(&mut socket, &Packet::Message(SocketPacket::Disconnect)).await;
            let _ = socket.close(None).await;
        }
        end
    }

    async fn listen(&mut self, socket: &mut Socket, liveness: Duration) -> SessionEnd {
        let lost = |error| SessionEnd::Lost {
            error,
            connected: true,
        };

        loop {
            let frame = tokio::select! {
                frame = timeout(liveness, socket.next()) => frame,
                _ = self.shutdown.changed() => return SessionEnd::Shutdown,
            };
            let text = match frame {
                Err(_) => return lost(RealtimeError::timeout("no ping from server")),
                Ok(None) => return lost(RealtimeError::Closed),
                Ok(Some(Err(error))) => return lost(error.into()),
                Ok(Some(Ok(Message::Text(text)))) => text,
                Ok(Some(Ok(Message::Close(_)))) => return lost(RealtimeError::Closed),
                Ok(Some(Ok(_))) => continue,
            };

            let packet = match Packet::decode(&text) {
                Ok(packet) => packet,
                Err(err) => {
                    warn!("[Realtime] Dropping undecodable frame: {}", err);
                    continue;
                }
            };

            match packet {
                Packet::Ping => {
                    if let Err(error) = send(socket, &Packet::Pong).await {
                        return lost(error);
                    }
                }
                Packet::Close | Packet::Message(SocketPacket::Disconnect) => {
                    return lost(RealtimeError::Closed)
                }
                Packet::Message(SocketPacket::ConnectError(data)) => {
                    return SessionEnd::Refused(connect_error_message(&data))
                }
                Packet::Message(SocketPacket::Event { name, args }) if name == UPDATE_EVENT => {
                    let Some(event) = decode_update(args) else {
                        continue;
                    };
                    if self.events.send(event).await.is_err() {
                        return SessionEnd::ListenerDropped;
                    }
                }
                other => debug!("[Realtime] Ignoring {:?}", other),
            }
        }
    }
}

/// Validates a `data-update` payload; malformed ones are logged and dropped.
fn decode_update(args: Vec<Value>) -> Option<ChangeEvent> {
    let Some(payload) = args.into_iter().next() else {
        warn!("[Realtime] Dropping data-update without payload");
        return None;
    };
    let update: WireUpdate = match serde_json::from_value(payload) {
        Ok(update) => update,
        Err(err) => {
            warn!("[Realtime] Dropping malformed data-update: {}", err);
            return None;
        }
    };
    match update.into_event() {
        Ok(event) => {
            debug!(
                "[Realtime] {} {} {}",
                event.change.action().as_str(),
                event.change.kind(),
                event.change.id()
            );
            Some(event)
        }
        Err(err) => {
            warn!("[Realtime] Dropping invalid data-update: {}", err);
            None
        }
    }
}

/// Upgrades, reads the Engine.IO open packet and connects the namespace.
async fn open(endpoint: &str, auth: Option<Value>) -> Result<(Socket, Handshake)> {
    debug!("[Realtime] Connecting to {}", endpoint);
    let (mut socket, _) = connect_async(endpoint).await?;

    let handshake = loop {
        match next_packet(&mut socket).await? {
            Packet::Open(handshake) => break handshake,
            Packet::Noop => continue,
            other => {
                return Err(RealtimeError::protocol(format!(
                    "expected open packet, got {:?}",
                    other
                )))
            }
        }
    };

    send(&mut socket, &Packet::connect(auth)).await?;

    loop {
        match next_packet(&mut socket).await? {
            Packet::Message(SocketPacket::Connect(_)) => return Ok((socket, handshake)),
            Packet::Message(SocketPacket::ConnectError(data)) => {
                return Err(RealtimeError::Refused(connect_error_message(&data)))
            }
            Packet::Ping => send(&mut socket, &Packet::Pong).await?,
            Packet::Close => return Err(RealtimeError::Closed),
            other => debug!("[Realtime] Ignoring {:?} before connect", other),
        }
    }
}

async fn send(socket: &mut Socket, packet: &Packet) -> Result<()> {
    socket.send(Message::Text(packet.encode()?)).await?;
    Ok(())
}

async fn next_packet(socket: &mut Socket) -> Result<Packet> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return Packet::decode(&text),
            Some(Ok(Message::Close(_))) | None => return Err(RealtimeError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(err.into()),
        }
    }
}
