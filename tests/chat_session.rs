use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use homepage_client::api::{RoomCredentials, RoomData, RoomService};
use homepage_client::chat::{ChatSession, ConnectionStatus, FileRef, MessageKind, SessionEvent};
use homepage_client::config::ChatConfig;
use homepage_client::error::{AppError, ChatError};
use homepage_client::notify::{Level, NotificationCenter};
use homepage_client::storage::{self, LocalStore};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const WAIT: Duration = Duration::from_secs(10);
const SETTLE: Duration = Duration::from_millis(300);

struct NoRooms;

#[async_trait]
impl RoomService for NoRooms {
    async fn create_room(&self) -> homepage_client::Result<RoomData> {
        Err(AppError::InternalError("not used".into()))
    }

    async fn join_room(&self, _room_id: &str) -> homepage_client::Result<RoomCredentials> {
        Err(AppError::InternalError("not used".into()))
    }
}

/// Accepts WebSocket connections and hands each to `handler` along with its
/// index and request URI. Returns the base URL and the accept counter.
async fn spawn_server<F, Fut>(handler: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(usize, String, WebSocketStream<TcpStream>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let handler = handler.clone();
            tokio::spawn(async move {
                let (uri_tx, uri_rx) = std::sync::mpsc::channel();
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let _ = uri_tx.send(req.uri().to_string());
                    Ok(resp)
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };
                let uri = uri_rx.try_recv().unwrap_or_default();
                handler(index, uri, ws).await;
            });
        }
    });

    (format!("ws://{}", addr), accepted)
}

fn session(base_url: &str, heartbeat_secs: u64, max_retries: u32) -> (ChatSession, Arc<NotificationCenter>) {
    let store = Arc::new(LocalStore::in_memory());
    store.set(storage::ROOM_ID, "room-1").unwrap();
    store.set(storage::CLIENT_ID, "client-1").unwrap();
    store.set(storage::CLIENT_TOKEN, "secret-token").unwrap();

    let center = Arc::new(NotificationCenter::default());
    let session = ChatSession::new(
        ChatConfig {
            ws_base_url: base_url.to_string(),
            heartbeat_interval_secs: heartbeat_secs,
            reconnect_delay_ms: 50,
            max_retries,
        },
        Arc::new(NoRooms),
        store,
        center.clone(),
    );
    assert!(session.rejoin_room());
    (session, center)
}

async fn wait_for<F>(events: &mut broadcast::Receiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream ended: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

fn is_status(status: ConnectionStatus) -> impl FnMut(&SessionEvent) -> bool {
    move |e| matches!(e, SessionEvent::Status { status: s, .. } if *s == status)
}

async fn auth_then_send(ws: &mut WebSocketStream<TcpStream>, frames: &[Value]) -> Value {
    let first = ws.next().await.unwrap().unwrap().into_text().unwrap();
    ws.send(Message::Text(json!({"event": "im-auth-resp", "data": "ok"}).to_string()))
        .await
        .unwrap();
    for frame in frames {
        ws.send(Message::Text(frame.to_string())).await.unwrap();
    }
    serde_json::from_str(&first).unwrap()
}

#[test_log::test(tokio::test)]
async fn authenticates_and_exchanges_messages() {
    let (log_tx, mut log_rx) = mpsc::unbounded_channel::<Value>();
    let (url, accepted) = spawn_server(move |_, uri, mut ws| {
        let log = log_tx.clone();
        async move {
            log.send(json!({ "uri": uri })).unwrap();
            let auth = auth_then_send(
                &mut ws,
                &[
                    json!({"event": "im-message", "type": "text", "data": "hello from peer"}),
                    Value::String("not a frame".into()),
                    json!({"event": "im-unknown", "data": 1}),
                    json!({
                        "event": "im-message",
                        "type": "file",
                        "data": json!({"key": "k1", "name": "cv.pdf", "size": 2048}).to_string()
                    }),
                ],
            )
            .await;
            log.send(auth).unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    log.send(serde_json::from_str(&text).unwrap()).unwrap();
                }
            }
        }
    })
    .await;

    let (session, center) = session(&url, 30, 4);
    let mut events = session.subscribe();
    session.connect("room-1").unwrap();

    wait_for(&mut events, is_status(ConnectionStatus::Connected)).await;
    assert_eq!(center.latest().unwrap().level, Level::Success);

    let uri = log_rx.recv().await.unwrap();
    assert_eq!(uri["uri"], "/connect?roomId=room-1");
    let auth = log_rx.recv().await.unwrap();
    assert_eq!(auth, json!({"event": "im-auth-req", "data": "secret-token"}));

    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::Message(m) if m.kind == MessageKind::File)
    })
    .await;

    session.send_message("hi back").unwrap();
    session
        .send_file_message(FileRef { key: "k2".into(), name: "a.txt".into(), size: 5 })
        .unwrap();

    let sent = timeout(WAIT, log_rx.recv()).await.unwrap().unwrap();
    assert_eq!(sent, json!({"event": "im-message", "type": "text", "data": "hi back"}));
    let sent = timeout(WAIT, log_rx.recv()).await.unwrap().unwrap();
    assert_eq!(sent["type"], "file");

    let messages = session.messages();
    let contents: Vec<(&str, bool)> = messages
        .iter()
        .map(|m| (m.content.as_str(), m.send_by_self))
        .collect();
    assert_eq!(
        contents,
        vec![
            ("hello from peer", false),
            ("cv.pdf", false),
            ("hi back", true),
            ("a.txt", true),
        ]
    );
    assert_eq!(messages[1].file.as_ref().unwrap().size, 2048);
    assert_eq!(session.retry_count(), 1);
    assert!(session.need_reconnect());
    assert!(!session.is_rejoining());
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    session.disconnect();
}

#[tokio::test]
async fn sends_heartbeat_frames() {
    let (ping_tx, mut ping_rx) = mpsc::unbounded_channel::<Value>();
    let (url, _) = spawn_server(move |_, _, mut ws| {
        let pings = ping_tx.clone();
        async move {
            auth_then_send(&mut ws, &[]).await;
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    let _ = pings.send(serde_json::from_str(&text).unwrap());
                }
            }
        }
    })
    .await;

    let (session, _) = session(&url, 1, 4);
    session.connect("room-1").unwrap();

    let ping = timeout(WAIT, ping_rx.recv()).await.unwrap().unwrap();
    assert_eq!(ping, json!({"event": "im-ping", "type": "im-ping", "data": "im-ping"}));

    session.disconnect();
}

#[test_log::test(tokio::test)]
async fn gives_up_after_max_retries() {
    let (url, accepted) = spawn_server(|_, _, ws| async move {
        drop(ws);
    })
    .await;

    let (session, _) = session(&url, 30, 2);
    let mut events = session.subscribe();
    session.connect("room-1").unwrap();

    let mut interrupted = Vec::new();
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Status { status: ConnectionStatus::ConnectInterrupted, text }) => {
                    interrupted.push(text)
                }
                Ok(SessionEvent::Dialog { visible: true }) => break,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(e) => panic!("event stream ended: {}", e),
            }
        }
    })
    .await
    .expect("session never gave up");

    sleep(SETTLE).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
    assert_eq!(
        interrupted,
        vec![
            "Connection interrupted, reconnection attempt 1".to_string(),
            "Connection interrupted, reconnection attempt 2".to_string(),
        ]
    );
    assert_eq!(session.status(), ConnectionStatus::ConnectFail);
    assert_eq!(session.retry_count(), 3);
    assert!(session.dialog_visible());
    assert!(!session.has_socket());
}

#[tokio::test]
async fn server_close_is_fatal() {
    let (url, accepted) = spawn_server(|_, _, mut ws| async move {
        auth_then_send(
            &mut ws,
            &[json!({"event": "im-close", "data": "room closed by owner"})],
        )
        .await;
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let (session, center) = session(&url, 30, 4);
    let mut events = session.subscribe();
    session.connect("room-1").unwrap();

    wait_for(&mut events, |e| matches!(e, SessionEvent::Dialog { visible: true })).await;
    sleep(SETTLE).await;

    assert_eq!(session.status(), ConnectionStatus::ConnectFail);
    assert!(!session.need_reconnect());
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    let note = center.latest().unwrap();
    assert_eq!(note.level, Level::Error);
    assert_eq!(note.description, "room closed by owner");

    let err = session.send_message("anyone?").unwrap_err();
    assert!(matches!(err, AppError::ChatError(ChatError::NotConnected)));
}

#[tokio::test]
async fn disconnect_closes_without_reconnecting() {
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<()>();
    let (url, accepted) = spawn_server(move |_, _, mut ws| {
        let closed = closed_tx.clone();
        async move {
            auth_then_send(&mut ws, &[]).await;
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
            let _ = closed.send(());
        }
    })
    .await;

    let (session, _) = session(&url, 30, 4);
    let mut events = session.subscribe();
    session.connect("room-1").unwrap();
    wait_for(&mut events, is_status(ConnectionStatus::Connected)).await;

    session.disconnect();
    assert_eq!(session.status(), ConnectionStatus::NotConnected);
    assert!(!session.need_reconnect());

    timeout(WAIT, closed_rx.recv()).await.unwrap().unwrap();
    sleep(SETTLE).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(session.status(), ConnectionStatus::NotConnected);
    assert!(!session.dialog_visible());
}

#[tokio::test]
async fn reconnects_after_interruption() {
    let (url, accepted) = spawn_server(|index, _, mut ws| async move {
        auth_then_send(&mut ws, &[]).await;
        if index == 0 {
            drop(ws);
            return;
        }
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let (session, _) = session(&url, 30, 4);
    let mut events = session.subscribe();
    session.connect("room-1").unwrap();

    wait_for(&mut events, is_status(ConnectionStatus::Connected)).await;
    wait_for(&mut events, is_status(ConnectionStatus::ConnectInterrupted)).await;
    wait_for(&mut events, is_status(ConnectionStatus::Connected)).await;

    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(session.retry_count(), 1);
    assert!(session.has_socket());

    session.disconnect();
}

#[tokio::test]
async fn reconnecting_replaces_the_socket() {
    let (url, accepted) = spawn_server(|_, _, mut ws| async move {
        auth_then_send(&mut ws, &[]).await;
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let (session, _) = session(&url, 30, 4);
    let mut events = session.subscribe();

    session.connect("room-1").unwrap();
    wait_for(&mut events, is_status(ConnectionStatus::Connected)).await;
    session.connect("room-1").unwrap();
    wait_for(&mut events, is_status(ConnectionStatus::Connected)).await;
    sleep(SETTLE).await;

    // Replacing the first socket must not schedule a retry.
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(session.status(), ConnectionStatus::Connected);
    assert_eq!(session.retry_count(), 1);

    session.disconnect();
}
