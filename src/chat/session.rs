use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use super::frame::{ClientFrame, ServerFrame};
use super::message::{ChatMessage, FileRef};
use super::status::{status_text, ConnectionStatus};
use crate::api::RoomService;
use crate::config::ChatConfig;
use crate::error::{ApiError, AppError, ChatError};
use crate::notify::Notifier;
use crate::storage::{self, LocalStore};
use crate::Result;

const EVENT_CAPACITY: usize = 256;
const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

/// Change notifications for front ends rendering a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionEvent {
    Status { status: ConnectionStatus, text: String },
    Message(ChatMessage),
    Dialog { visible: bool },
}

/// The socket currently owned by the session. Dropping it (and with it the
/// sender) makes the driver close the socket without reconnecting.
struct Link {
    id: u64,
    tx: mpsc::UnboundedSender<Message>,
}

struct State {
    cur_room_id: String,
    client_id: String,
    client_token: String,
    last_room_id: String,
    status: ConnectionStatus,
    status_text: String,
    dialog_visible: bool,
    creating: bool,
    joining: bool,
    rejoining: bool,
    retry_count: u32,
    need_reconnect: bool,
    link: Option<Link>,
    messages: Vec<ChatMessage>,
}

struct Inner {
    config: ChatConfig,
    rooms: Arc<dyn RoomService>,
    store: Arc<LocalStore>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<State>,
    events: broadcast::Sender<SessionEvent>,
    generation: AtomicU64,
}

/// A chat-room connection: room credentials, socket lifecycle and the local
/// message log. Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

impl ChatSession {
    pub fn new(
        config: ChatConfig,
        rooms: Arc<dyn RoomService>,
        store: Arc<LocalStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let last_room_id = store.get(storage::ROOM_ID).unwrap_or_default();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                config,
                rooms,
                store,
                notifier,
                state: Mutex::new(State {
                    cur_room_id: String::new(),
                    client_id: String::new(),
                    client_token: String::new(),
                    last_room_id,
                    status: ConnectionStatus::NotConnected,
                    status_text: status_text(ConnectionStatus::NotConnected, 0),
                    dialog_visible: false,
                    creating: false,
                    joining: false,
                    rejoining: false,
                    retry_count: 1,
                    need_reconnect: true,
                    link: None,
                    messages: Vec::new(),
                }),
                events,
                generation: AtomicU64::new(0),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    // ---- rooms ----

    pub async fn create_room(&self) -> bool {
        self.state().creating = true;

        match self.inner.rooms.create_room().await {
            Ok(room) => {
                self.adopt_room(&room.room_id, &room.client_id, &room.client_token)
                    .await;
                self.state().creating = false;
                info!(room_id = %room.room_id, "room created");
                self.inner
                    .notifier
                    .success("Room created", &format!("Room id: {}", room.room_id));
                true
            }
            Err(e) => {
                error!(error = %e, "failed to create room");
                self.inner.notifier.error("Create failed", &e.user_message());
                self.state().creating = false;
                false
            }
        }
    }

    pub async fn join_room(&self, room_id: &str) -> bool {
        self.state().joining = true;

        match self.inner.rooms.join_room(room_id).await {
            Ok(creds) => {
                self.adopt_room(room_id, &creds.client_id, &creds.client_token)
                    .await;
                self.state().joining = false;
                info!(%room_id, "joined room");
                self.inner
                    .notifier
                    .success("Joined room", &format!("Room id: {}", room_id));
                true
            }
            Err(e) => {
                error!(%room_id, error = %e, "failed to join room");
                self.inner.notifier.error("Join failed", &join_failure_message(&e));
                self.state().joining = false;
                false
            }
        }
    }

    async fn adopt_room(&self, room_id: &str, client_id: &str, client_token: &str) {
        let persisted = self
            .inner
            .store
            .clone()
            .set_many_async(vec![
                (storage::ROOM_ID.to_string(), room_id.to_string()),
                (storage::CLIENT_ID.to_string(), client_id.to_string()),
                (storage::CLIENT_TOKEN.to_string(), client_token.to_string()),
            ])
            .await;
        if let Err(e) = persisted {
            warn!(error = %e, "could not persist room credentials");
        }

        let mut state = self.state();
        state.cur_room_id = room_id.to_string();
        state.client_id = client_id.to_string();
        state.client_token = client_token.to_string();
        state.last_room_id = room_id.to_string();
    }

    /// Restores the credentials of the last room from storage and makes it
    /// current. Returns whether there was a room to go back to.
    pub fn rejoin_room(&self) -> bool {
        let token = self.inner.store.get(storage::CLIENT_TOKEN).unwrap_or_default();
        let client_id = self.inner.store.get(storage::CLIENT_ID).unwrap_or_default();

        let mut state = self.state();
        state.client_token = token;
        state.client_id = client_id;
        if state.last_room_id.is_empty() {
            return false;
        }
        state.cur_room_id = state.last_room_id.clone();
        state.rejoining = true;
        true
    }

    // ---- connection ----

    fn socket_url(&self, room_id: &str) -> Result<Url> {
        let base = self.inner.config.ws_base_url.trim();
        if base.is_empty() {
            return Err(ChatError::MissingBaseUrl.into());
        }
        let mut url = Url::parse(&format!("{}/connect", base.trim_end_matches('/')))?;
        url.query_pairs_mut().append_pair("roomId", room_id);
        Ok(url)
    }

    /// Opens a socket to `room_id`, replacing any existing one. The handshake
    /// and all traffic run on a background task; progress is reported
    /// through [`ChatSession::subscribe`].
    pub fn connect(&self, room_id: &str) -> Result<()> {
        self.teardown();
        self.set_connection_status(ConnectionStatus::Connecting);

        let url = match self.socket_url(room_id) {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "cannot open chat socket");
                self.inner.notifier.error("Connection failed", &e.user_message());
                self.set_connection_status(ConnectionStatus::ConnectFail);
                return Err(e);
            }
        };

        let id = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let token = {
            let mut state = self.state();
            state.need_reconnect = true;
            state.link = Some(Link { id, tx });
            state.client_token.clone()
        };

        info!(link = id, %url, "opening chat socket");
        let session = self.clone();
        tokio::spawn(async move { session.drive(id, url, token, rx).await });
        Ok(())
    }

    /// Drops the current socket without scheduling a reconnect.
    fn teardown(&self) -> bool {
        let link = self.state().link.take();
        match link {
            Some(link) => {
                debug!(link = link.id, "tearing down chat socket");
                true
            }
            None => false,
        }
    }

    fn is_current(&self, id: u64) -> bool {
        self.state().link.as_ref().map(|l| l.id) == Some(id)
    }

    async fn drive(
        self,
        id: u64,
        url: Url,
        token: String,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        let ws = match connect_async(url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                warn!(link = id, error = %e, "chat socket failed to open");
                self.link_lost(id);
                return;
            }
        };
        if !self.is_current(id) {
            debug!(link = id, "socket superseded while opening");
            return;
        }

        let (mut sink, mut stream) = ws.split();

        let auth = ClientFrame::Authenticate { token }.to_message();
        match auth {
            Ok(msg) => {
                if let Err(e) = sink.send(msg).await {
                    warn!(link = id, error = %e, "failed to send auth request");
                    self.link_lost(id);
                    return;
                }
            }
            Err(e) => error!(link = id, error = %e, "failed to encode auth request"),
        }

        let period = self.inner.config.heartbeat_interval().max(MIN_HEARTBEAT);
        let mut heartbeat = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                outgoing = rx.recv() => match outgoing {
                    Some(msg) => {
                        if let Err(e) = sink.send(msg).await {
                            warn!(link = id, error = %e, "failed to send frame");
                            break;
                        }
                    }
                    None => {
                        // Torn down by the session.
                        if let Err(e) = sink.close().await {
                            debug!(link = id, error = %e, "error closing chat socket");
                        }
                        return;
                    }
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !self.handle_frame(id, &text) {
                            if let Err(e) = sink.close().await {
                                debug!(link = id, error = %e, "error closing chat socket");
                            }
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(link = id, ?frame, "server closed chat socket");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(link = id, error = %e, "chat socket error");
                        break;
                    }
                    None => break,
                },
                _ = heartbeat.tick() => {
                    match ClientFrame::Ping.to_message() {
                        Ok(ping) => {
                            if let Err(e) = sink.send(ping).await {
                                warn!(link = id, error = %e, "failed to send heartbeat");
                                break;
                            }
                            debug!(link = id, "heartbeat sent");
                        }
                        Err(e) => error!(error = %e, "failed to encode heartbeat"),
                    }
                }
            }
        }

        self.link_lost(id);
    }

    /// Applies one inbound frame. Returns false when the server asked us to
    /// leave.
    fn handle_frame(&self, id: u64, text: &str) -> bool {
        if !self.is_current(id) {
            return true;
        }

        let frame = match ServerFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(link = id, error = %e, "dropping unparsable frame");
                return true;
            }
        };

        match frame {
            ServerFrame::AuthResult => {
                {
                    let mut state = self.state();
                    state.retry_count = 1;
                    state.need_reconnect = true;
                    state.creating = false;
                    state.joining = false;
                    state.rejoining = false;
                }
                self.set_connection_status(ConnectionStatus::Connected);
                info!(link = id, "chat socket authenticated");
                self.inner
                    .notifier
                    .success("Connected", "WebSocket connection established");
            }
            ServerFrame::Text(content) => self.add_message(ChatMessage::text(content, false)),
            ServerFrame::File(file) => self.add_message(ChatMessage::file(file, false)),
            ServerFrame::Error(message) => {
                warn!(link = id, %message, "server error");
                self.inner.notifier.error("Error", &message);
            }
            ServerFrame::Close(reason) => {
                self.inner.notifier.error("Connection failed", &reason);
                self.state().need_reconnect = false;
                self.set_connection_status(ConnectionStatus::ConnectFail);
                self.set_dialog_visible(true);
                return false;
            }
            ServerFrame::Other(event) => debug!(link = id, %event, "ignoring frame"),
        }
        true
    }

    /// Runs once per socket, when the current one closes or fails.
    fn link_lost(&self, id: u64) {
        let max_retries = self.inner.config.max_retries;
        let retry = {
            let mut state = self.state();
            if state.link.as_ref().map(|l| l.id) != Some(id) {
                return;
            }
            state.link = None;

            if !state.need_reconnect
                || state.retry_count > max_retries
                || state.cur_room_id.is_empty()
            {
                state.creating = false;
                state.joining = false;
                state.rejoining = false;
                None
            } else {
                let attempt = state.retry_count;
                state.retry_count += 1;
                Some((attempt, state.cur_room_id.clone()))
            }
        };

        let Some((attempt, room_id)) = retry else {
            info!(link = id, "chat socket lost; giving up");
            self.set_dialog_visible(true);
            self.set_connection_status(ConnectionStatus::ConnectFail);
            return;
        };

        warn!(link = id, attempt, "chat socket lost; reconnecting");
        self.inner.notifier.error(
            "Connection interrupted",
            &format!("Connection interrupted, reconnection attempt {}", attempt),
        );
        self.set_status_with_retry(ConnectionStatus::ConnectInterrupted, attempt);

        let generation = self.inner.generation.load(Ordering::SeqCst);
        let delay = self.inner.config.reconnect_delay();
        let session = self.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            if !session.retry_still_wanted(generation) {
                debug!("pending reconnect abandoned");
                return;
            }
            if let Err(e) = session.connect(&room_id) {
                error!(error = %e, "reconnect failed");
            }
        });
    }

    fn retry_still_wanted(&self, generation: u64) -> bool {
        let state = self.state();
        self.inner.generation.load(Ordering::SeqCst) == generation
            && state.need_reconnect
            && state.link.is_none()
            && state.status == ConnectionStatus::ConnectInterrupted
    }

    /// Closes the socket on purpose. No reconnect follows and any pending
    /// retry is dropped.
    pub fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let retry_pending = {
            let mut state = self.state();
            state.need_reconnect = false;
            state.status == ConnectionStatus::ConnectInterrupted
        };
        if self.teardown() || retry_pending {
            self.set_connection_status(ConnectionStatus::NotConnected);
            info!("chat disconnected");
        }
    }

    // ---- messages ----

    fn live_sender(&self) -> Option<mpsc::UnboundedSender<Message>> {
        let state = self.state();
        match (&state.link, state.status) {
            (Some(link), ConnectionStatus::Connected) => Some(link.tx.clone()),
            _ => None,
        }
    }

    fn send_frame(&self, frame: ClientFrame, local: ChatMessage) -> Result<()> {
        let Some(tx) = self.live_sender() else {
            self.inner
                .notifier
                .error("Send failed", "WebSocket connection is not established");
            return Err(ChatError::NotConnected.into());
        };
        tx.send(frame.to_message()?)
            .map_err(|e| ChatError::Send(e.to_string()))?;
        self.add_message(local);
        Ok(())
    }

    pub fn send_message(&self, content: &str) -> Result<()> {
        self.send_frame(
            ClientFrame::Text(content.to_string()),
            ChatMessage::text(content, true),
        )
    }

    pub fn send_file_message(&self, file: FileRef) -> Result<()> {
        self.send_frame(ClientFrame::File(file.clone()), ChatMessage::file(file, true))
    }

    pub fn add_message(&self, message: ChatMessage) {
        self.state().messages.push(message.clone());
        self.emit(SessionEvent::Message(message));
    }

    // ---- state ----

    pub fn set_connection_status(&self, status: ConnectionStatus) {
        let retry = self.state().retry_count;
        self.set_status_with_retry(status, retry);
    }

    fn set_status_with_retry(&self, status: ConnectionStatus, retry: u32) {
        let text = status_text(status, retry);
        {
            let mut state = self.state();
            state.status = status;
            state.status_text = text.clone();
        }
        self.emit(SessionEvent::Status { status, text });
    }

    pub fn set_dialog_visible(&self, visible: bool) {
        self.state().dialog_visible = visible;
        self.emit(SessionEvent::Dialog { visible });
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state().status
    }

    pub fn status_text(&self) -> String {
        self.state().status_text.clone()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state().messages.clone()
    }

    pub fn retry_count(&self) -> u32 {
        self.state().retry_count
    }

    pub fn current_room(&self) -> String {
        self.state().cur_room_id.clone()
    }

    pub fn last_room(&self) -> String {
        self.state().last_room_id.clone()
    }

    pub fn client_id(&self) -> String {
        self.state().client_id.clone()
    }

    pub fn dialog_visible(&self) -> bool {
        self.state().dialog_visible
    }

    pub fn need_reconnect(&self) -> bool {
        self.state().need_reconnect
    }

    pub fn is_creating(&self) -> bool {
        self.state().creating
    }

    pub fn is_joining(&self) -> bool {
        self.state().joining
    }

    pub fn is_rejoining(&self) -> bool {
        self.state().rejoining
    }

    pub fn has_socket(&self) -> bool {
        self.state().link.is_some()
    }
}

/// A 404 without a server-supplied message means the room is gone.
fn join_failure_message(err: &AppError) -> String {
    match err {
        AppError::ApiError(ApiError::Status { status: 404, message })
            if message.is_empty() || message == "Not Found" =>
        {
            "room does not exist".to_string()
        }
        other => other.user_message(),
    }
}
