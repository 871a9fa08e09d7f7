//! Socket.IO notification channel with automatic reconnection.

use crate::protocol::{self, EnginePacket, OpenPayload, SocketPacket};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use pulse_config::RealtimeSettings;
use pulse_protocol_types::{ChannelError, ChannelHandle, NotificationRecord, RealtimeConnector};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event name the backend pushes notifications under.
const NOTIFICATION_EVENT: &str = "notification";

/// Event name that scopes the socket to one user.
const JOIN_EVENT: &str = "join";

const NOTIFICATION_BUFFER: usize = 64;
const COMMAND_BUFFER: usize = 16;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Realtime client configuration.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Server root, e.g. `http://localhost:5000`.
    pub base_url: String,
    /// Base reconnect delay in milliseconds.
    pub reconnect_base_delay_ms: u64,
    /// Maximum reconnect delay in milliseconds.
    pub reconnect_max_delay_ms: u64,
    /// Give up after this many consecutive failed reconnects. `None` retries
    /// forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Liveness window used when the server does not advertise one.
    pub ping_timeout_secs: u64,
}

impl RealtimeConfig {
    pub fn from_settings(base_url: impl Into<String>, settings: &RealtimeSettings) -> Self {
        Self {
            base_url: base_url.into(),
            reconnect_base_delay_ms: settings.reconnect_base_delay_ms,
            reconnect_max_delay_ms: settings.reconnect_max_delay_ms,
            max_reconnect_attempts: settings.max_reconnect_attempts,
            ping_timeout_secs: settings.ping_timeout_secs,
        }
    }

    /// Delay before reconnect attempt `attempt` (1-indexed).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .reconnect_base_delay_ms
            .saturating_mul(2u64.pow(exponent))
            .min(self.reconnect_max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Build the Engine.IO WebSocket endpoint for a server root.
pub fn socket_url(base_url: &str) -> Result<String, ChannelError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| ChannelError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ChannelError::InvalidEndpoint(format!(
                "unsupported scheme {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::InvalidEndpoint(base_url.to_string()))?;

    let path = format!("{}/socket.io/", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url.to_string())
}

/// Connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    Closed,
}

enum Command {
    Join(String),
    Shutdown,
}

/// Opens [`SocketIoChannel`]s to the backend.
#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    config: RealtimeConfig,
}

impl SocketIoConnector {
    pub fn new(config: RealtimeConfig) -> Self {
        Self { config }
    }

    /// Open a channel. The first handshake must succeed; later connection
    /// losses are recovered in the background.
    pub async fn open(&self) -> Result<SocketIoChannel, ChannelError> {
        let url = socket_url(&self.config.base_url)?;
        info!(url = %url, "Connecting realtime channel");

        let (socket, open) = handshake(&url).await?;
        info!(sid = %open.sid, "Realtime channel connected");

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (notification_tx, notification_rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);

        let driver = Driver {
            url,
            config: self.config.clone(),
            commands: command_rx,
            notifications: notification_tx,
            state: state_tx,
            room: None,
        };
        let task = tokio::spawn(driver.run(socket, open));

        Ok(SocketIoChannel {
            commands: command_tx,
            notifications: Some(notification_rx),
            state: state_rx,
            task: Some(task),
        })
    }
}

#[async_trait]
impl RealtimeConnector for SocketIoConnector {
    async fn connect(&self) -> Result<Box<dyn ChannelHandle>, ChannelError> {
        Ok(Box::new(self.open().await?))
    }
}

/// One open Socket.IO connection, owned by whoever opened it.
pub struct SocketIoChannel {
    commands: mpsc::Sender<Command>,
    notifications: Option<mpsc::Receiver<NotificationRecord>>,
    state: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl SocketIoChannel {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

impl std::fmt::Debug for SocketIoChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketIoChannel")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChannelHandle for SocketIoChannel {
    async fn join(&mut self, user_id: &str) -> Result<(), ChannelError> {
        self.commands
            .send(Command::Join(user_id.to_string()))
            .await
            .map_err(|_| ChannelError::Closed)
    }

    fn take_notifications(&mut self) -> Option<mpsc::Receiver<NotificationRecord>> {
        self.notifications.take()
    }

    async fn disconnect(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };

        let _ = self.commands.send(Command::Shutdown).await;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!("Realtime driver did not stop in time, aborting");
            task.abort();
        }
        info!("Realtime channel disconnected");
    }
}

impl Drop for SocketIoChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Read frames until one decodes. Returns `Closed` when the socket ends.
async fn next_packet(socket: &mut Socket) -> Result<EnginePacket, ChannelError> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return protocol::decode(&text),
            Some(Ok(Message::Close(_))) | None => return Err(ChannelError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ChannelError::Connection(e.to_string())),
        }
    }
}

async fn send_text(socket: &mut Socket, frame: String) -> Result<(), ChannelError> {
    socket
        .send(Message::Text(frame.into()))
        .await
        .map_err(|e| ChannelError::Connection(e.to_string()))
}

/// WebSocket connect, Engine.IO open, Socket.IO namespace connect.
async fn handshake(url: &str) -> Result<(Socket, OpenPayload), ChannelError> {
    let attempt = async {
        let (mut socket, _) = connect_async(url)
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        let open = loop {
            match next_packet(&mut socket).await? {
                EnginePacket::Open(open) => break open,
                other => debug!(packet = ?other, "Ignoring packet before open"),
            }
        };

        send_text(&mut socket, protocol::CONNECT.to_string()).await?;

        loop {
            match next_packet(&mut socket).await? {
                EnginePacket::Message(SocketPacket::Connect(_)) => break,
                EnginePacket::Message(SocketPacket::ConnectError(reason)) => {
                    return Err(ChannelError::Connection(format!(
                        "namespace connect refused: {}",
                        reason
                    )));
                }
                EnginePacket::Ping => send_text(&mut socket, protocol::PONG.to_string()).await?,
                other => debug!(packet = ?other, "Ignoring packet before connect"),
            }
        }

        Ok((socket, open))
    };

    tokio::time::timeout(HANDSHAKE_TIMEOUT, attempt)
        .await
        .map_err(|_| ChannelError::Connection("handshake timed out".to_string()))?
}

enum Step {
    Frame(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    Command(Option<Command>),
    Silent,
}

enum Outcome {
    Shutdown,
    Lost(String),
}

/// Background task owning the socket.
struct Driver {
    url: String,
    config: RealtimeConfig,
    commands: mpsc::Receiver<Command>,
    notifications: mpsc::Sender<NotificationRecord>,
    state: watch::Sender<ConnectionState>,
    /// User the channel is scoped to; re-joined after every reconnect.
    room: Option<String>,
}

impl Driver {
    async fn run(mut self, mut socket: Socket, mut open: OpenPayload) {
        loop {
            match self.serve(&mut socket, &open).await {
                Outcome::Shutdown => {
                    let _ = send_text(&mut socket, protocol::DISCONNECT.to_string()).await;
                    let _ = socket.close(None).await;
                    break;
                }
                Outcome::Lost(reason) => {
                    warn!(reason = %reason, "Realtime connection lost");
                    let _ = self.state.send(ConnectionState::Reconnecting);
                }
            }

            match self.reconnect().await {
                Some((next_socket, next_open)) => {
                    socket = next_socket;
                    open = next_open;
                }
                None => break,
            }
        }

        let _ = self.state.send(ConnectionState::Closed);
        debug!("Realtime driver stopped");
    }

    /// Pump one live connection until it ends or shutdown is requested.
    async fn serve(&mut self, socket: &mut Socket, open: &OpenPayload) -> Outcome {
        let window = Duration::from_millis(
            open.liveness_window_ms()
                .unwrap_or(self.config.ping_timeout_secs.saturating_mul(1000)),
        );

        if let Some(room) = self.room.clone() {
            if let Err(e) = self.join(socket, &room).await {
                return Outcome::Lost(e.to_string());
            }
        }

        let mut deadline = Instant::now() + window;
        loop {
            let step = tokio::select! {
                frame = socket.next() => Step::Frame(frame),
                command = self.commands.recv() => Step::Command(command),
                _ = tokio::time::sleep_until(deadline) => Step::Silent,
            };

            match step {
                Step::Frame(Some(Ok(Message::Text(text)))) => {
                    deadline = Instant::now() + window;
                    if let Some(outcome) = self.handle_frame(socket, &text).await {
                        return outcome;
                    }
                }
                Step::Frame(Some(Ok(Message::Close(_)))) | Step::Frame(None) => {
                    return Outcome::Lost("socket closed".to_string());
                }
                Step::Frame(Some(Ok(_))) => {
                    deadline = Instant::now() + window;
                }
                Step::Frame(Some(Err(e))) => return Outcome::Lost(e.to_string()),
                Step::Command(Some(Command::Join(user_id))) => {
                    self.room = Some(user_id.clone());
                    if let Err(e) = self.join(socket, &user_id).await {
                        return Outcome::Lost(e.to_string());
                    }
                }
                Step::Command(Some(Command::Shutdown)) | Step::Command(None) => {
                    return Outcome::Shutdown;
                }
                Step::Silent => return Outcome::Lost("ping timeout".to_string()),
            }
        }
    }

    async fn join(&self, socket: &mut Socket, user_id: &str) -> Result<(), ChannelError> {
        debug!(user_id = %user_id, "Joining notification room");
        send_text(
            socket,
            protocol::encode_event(JOIN_EVENT, &[Value::String(user_id.to_string())]),
        )
        .await
    }

    async fn handle_frame(&mut self, socket: &mut Socket, text: &str) -> Option<Outcome> {
        let packet = match protocol::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable realtime frame");
                return None;
            }
        };

        match packet {
            EnginePacket::Ping => {
                if let Err(e) = send_text(socket, protocol::PONG.to_string()).await {
                    return Some(Outcome::Lost(e.to_string()));
                }
            }
            EnginePacket::Close => return Some(Outcome::Lost("server closed".to_string())),
            EnginePacket::Message(SocketPacket::Disconnect) => {
                return Some(Outcome::Lost("server disconnected namespace".to_string()));
            }
            EnginePacket::Message(SocketPacket::ConnectError(reason)) => {
                return Some(Outcome::Lost(format!("connect error: {}", reason)));
            }
            EnginePacket::Message(SocketPacket::Event { name, mut args })
                if name == NOTIFICATION_EVENT =>
            {
                if args.is_empty() {
                    warn!("Notification event without payload");
                    return None;
                }
                match serde_json::from_value::<NotificationRecord>(args.swap_remove(0)) {
                    Ok(record) => {
                        debug!(notification_id = %record.id, "Notification pushed");
                        // A dropped receiver only means nobody is listening.
                        let _ = self.notifications.send(record).await;
                    }
                    Err(e) => warn!(error = %e, "Dropping malformed notification"),
                }
            }
            other => debug!(packet = ?other, "Ignoring realtime packet"),
        }
        None
    }

    /// Reconnect with capped exponential backoff. Returns `None` on shutdown
    /// or when the attempt budget is spent.
    async fn reconnect(&mut self) -> Option<(Socket, OpenPayload)> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(max) = self.config.max_reconnect_attempts {
                if attempt > max {
                    error!(attempts = max, "Realtime reconnect attempts exhausted");
                    return None;
                }
            }

            let delay = self.config.reconnect_delay(attempt);
            info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling realtime reconnect");

            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    command = self.commands.recv() => match command {
                        Some(Command::Join(user_id)) => self.room = Some(user_id),
                        Some(Command::Shutdown) | None => return None,
                    },
                }
            }

            match handshake(&self.url).await {
                Ok((socket, open)) => {
                    info!(sid = %open.sid, attempt, "Realtime channel reconnected");
                    let _ = self.state.send(ConnectionState::Connected);
                    return Some((socket, open));
                }
                Err(e) => warn!(attempt, error = %e, "Realtime reconnect failed"),
            }
        }
    }
}
