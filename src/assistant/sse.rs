//! Incremental decoder for the assistant's `data:` event stream.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data:";

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A piece of reply text.
    Message(String),
    ConversationId(String),
    Workflow(String),
    /// Any other JSON payload. `event_type` is empty when the payload had none.
    Other { event_type: String, data: Value },
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    event_type: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl From<RawEvent> for ChatEvent {
    fn from(raw: RawEvent) -> Self {
        let payload = raw.data.or(raw.message).unwrap_or(Value::Null);
        match raw.event_type.as_str() {
            "message" => ChatEvent::Message(value_text(&payload)),
            "conversation_id" => ChatEvent::ConversationId(value_text(&payload)),
            "workflow" | "workflow_status" => ChatEvent::Workflow(value_text(&payload)),
            _ => ChatEvent::Other {
                event_type: raw.event_type,
                data: payload,
            },
        }
    }
}

/// Turns arbitrarily split byte chunks into [`ChatEvent`]s.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of a UTF-8 sequence cut off at the end of the last chunk.
    pending: Vec<u8>,
    /// Text after the last newline.
    line: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<ChatEvent> {
        self.pending.extend_from_slice(chunk);
        let text = self.take_decoded();
        self.line.push_str(&text);

        let mut events = Vec::new();
        while let Some(pos) = self.line.find('\n') {
            let line: String = self.line.drain(..=pos).collect();
            if let Some(event) = parse_line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    /// Processes whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<ChatEvent> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.line.push_str(&tail);
        }
        let line = std::mem::take(&mut self.line);
        parse_line(line.trim_end_matches('\r')).into_iter().collect()
    }

    fn take_decoded(&mut self) -> String {
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    text.push_str(s);
                    self.pending.clear();
                    return text;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    text.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            warn!(bytes = bad, "invalid UTF-8 in event stream");
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete sequence; wait for the next chunk.
                            self.pending.drain(..valid);
                            return text;
                        }
                    }
                }
            }
        }
    }
}

fn parse_line(line: &str) -> Option<ChatEvent> {
    if line.trim().is_empty() || !line.starts_with(DATA_PREFIX) {
        return None;
    }
    let payload = line[DATA_PREFIX.len()..].trim();

    let value = match serde_json::from_str::<Value>(payload) {
        Ok(value) => value,
        Err(e) if !payload.is_empty() => {
            debug!(error = %e, "event data is not JSON; using raw text");
            return Some(ChatEvent::Message(payload.to_string()));
        }
        Err(_) => return None,
    };

    if !value.get("event_type").is_some_and(Value::is_string) {
        debug!(%value, "event without event_type");
        return Some(ChatEvent::Other {
            event_type: String::new(),
            data: value,
        });
    }
    match serde_json::from_value::<RawEvent>(value) {
        Ok(raw) => Some(raw.into()),
        Err(e) => {
            warn!(error = %e, "dropping malformed event");
            None
        }
    }
}
