use homepage_client::api::{ApiClient, ChatRequest};
use homepage_client::assistant::{ChatEvent, ChatStreamHandler, Conversation, APOLOGY};
use homepage_client::config::ApiConfig;
use homepage_client::emotion::Motion;
use homepage_client::error::{ApiError, AppError, StreamError};
use homepage_client::storage::{self, LocalStore};
use serde_json::json;
use std::sync::Arc;
use wiremock::{
    matchers::{body_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn client_for(server: &MockServer) -> ApiClient {
    let store = Arc::new(LocalStore::in_memory());
    store.set(storage::TOKEN, "tok").unwrap();
    ApiClient::new(
        &ApiConfig {
            base_url: server.uri(),
            timeout_secs: 5,
        },
        store,
    )
    .expect("client")
}

// `set_body_raw` keeps the mime type; `set_body_string` would reset it to text/plain.
fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream; charset=utf-8")
}

#[derive(Default)]
struct Recorder {
    events: Vec<ChatEvent>,
    finished: usize,
    errors: Vec<String>,
}

impl ChatStreamHandler for Recorder {
    fn on_event(&mut self, event: ChatEvent) {
        self.events.push(event);
    }

    fn on_finished(&mut self) {
        self.finished += 1;
    }

    fn on_error(&mut self, error: &AppError) {
        self.errors.push(error.to_string());
    }
}

fn request(message: &str) -> ChatRequest {
    ChatRequest {
        message: message.into(),
        conversation_id: None,
    }
}

#[test_log::test(tokio::test)]
async fn streams_events_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/aichat"))
        .and(header("authorization", "Bearer tok"))
        .and(body_json(json!({ "message": "hi" })))
        .respond_with(sse(concat!(
            "data: {\"event_type\":\"conversation_id\",\"data\":\"conv-1\"}\n\n",
            "data: {\"event_type\":\"message\",\"data\":\"Hel\"}\n\n",
            "data: {\"event_type\":\"message\",\"data\":\"lo\"}\n\n",
            "data: plain words\n\n",
            "data: {\"event_type\":\"workflow\",\"data\":\"finished\"}"
        )))
        .mount(&server)
        .await;

    let api = client_for(&server);
    let mut recorder = Recorder::default();
    api.ai_chat(&request("hi"), &mut recorder).await.unwrap();

    assert_eq!(
        recorder.events,
        vec![
            ChatEvent::ConversationId("conv-1".into()),
            ChatEvent::Message("Hel".into()),
            ChatEvent::Message("lo".into()),
            ChatEvent::Message("plain words".into()),
            ChatEvent::Workflow("finished".into()),
        ]
    );
    assert_eq!(recorder.finished, 1);
    assert!(recorder.errors.is_empty());
}

#[tokio::test]
async fn http_failure_reports_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/aichat"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({ "error": "slow down" })))
        .mount(&server)
        .await;

    let api = client_for(&server);
    let mut recorder = Recorder::default();
    let err = api.ai_chat(&request("hi"), &mut recorder).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::ApiError(ApiError::Status { status: 429, ref message }) if message == "slow down"
    ));
    assert_eq!(recorder.finished, 0);
    assert_eq!(recorder.errors, vec!["API error: HTTP 429: slow down".to_string()]);
}

#[tokio::test]
async fn json_reply_instead_of_stream_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/aichat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 1001 })))
        .mount(&server)
        .await;

    let api = client_for(&server);
    let mut recorder = Recorder::default();
    let err = api.ai_chat(&request("hi"), &mut recorder).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::StreamError(StreamError::NotEventStream(ref m)) if m == "code=1001"
    ));
    assert_eq!(recorder.errors.len(), 1);
    assert_eq!(recorder.finished, 0);
}

#[tokio::test]
async fn conversation_strips_tags_and_tracks_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/aichat"))
        .and(body_json(json!({ "message": "hello" })))
        .respond_with(sse(concat!(
            "data: {\"event_type\":\"conversation_id\",\"data\":\"conv-9\"}\n",
            "data: {\"status\":\"running\",\"node\":\"llm\"}\n",
            "data: {\"event_type\":\"message\",\"data\":\"Hi there<<wa\"}\n",
            "data: {\"event_type\":\"message\",\"data\":\"ve>>! Nice to meet you<<joy>>\"}\n",
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/aichat"))
        .and(body_json(json!({ "message": "again", "conversation_id": "conv-9" })))
        .respond_with(sse("data: {\"event_type\":\"message\",\"data\":\"Sure <<\"}\n"))
        .expect(1)
        .mount(&server)
        .await;

    let api = client_for(&server);
    let mut conversation = Conversation::new(api);

    let mut streamed = String::new();
    conversation
        .send_with("hello", |text| streamed.push_str(text))
        .await
        .unwrap();

    let reply = conversation.last_reply().unwrap();
    assert_eq!(reply.text, "Hi there! Nice to meet you");
    assert_eq!(streamed, reply.text);
    assert_eq!(conversation.conversation_id(), Some("conv-9"));
    assert_eq!(conversation.emotions(), ["wave", "joy"]);
    assert_eq!(
        conversation.motions(),
        [
            Motion { group: "Tap", index: 0 },
            Motion { group: "Flick", index: 0 },
        ]
    );
    assert!(!conversation.is_loading());

    // The second turn reuses the conversation id; a dangling opening is
    // flushed as text when the stream ends.
    conversation.send("again").await.unwrap();
    assert_eq!(conversation.last_reply().unwrap().text, "Sure <<");
    assert_eq!(conversation.entries().len(), 4);
}

#[tokio::test]
async fn conversation_apologises_on_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/aichat"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut conversation = Conversation::new(client_for(&server));
    assert!(conversation.send("hello").await.is_err());

    let entries = conversation.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].is_user);
    assert_eq!(entries[1].text, APOLOGY);
    assert!(!conversation.is_loading());
}

#[tokio::test]
async fn blank_input_is_ignored() {
    let server = MockServer::start().await;
    let mut conversation = Conversation::new(client_for(&server));
    conversation.send("   ").await.unwrap();
    assert!(conversation.entries().is_empty());
}
