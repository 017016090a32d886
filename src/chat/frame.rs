use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use super::message::FileRef;
use crate::error::ChatError;

pub const AUTH_REQ: &str = "im-auth-req";
pub const AUTH_RESP: &str = "im-auth-resp";
pub const MESSAGE: &str = "im-message";
pub const PING: &str = "im-ping";
pub const ERROR: &str = "im-error";
pub const CLOSE: &str = "im-close";

const TEXT: &str = "text";
const FILE: &str = "file";

/// Wire shape shared by both directions: `{event, type, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

impl RawFrame {
    fn data_string(&self) -> String {
        match &self.data {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Authenticate { token: String },
    Text(String),
    File(FileRef),
    Ping,
}

impl ClientFrame {
    fn to_raw(&self) -> Result<RawFrame, ChatError> {
        Ok(match self {
            ClientFrame::Authenticate { token } => RawFrame {
                event: AUTH_REQ.into(),
                kind: None,
                data: Value::String(token.clone()),
            },
            ClientFrame::Text(text) => RawFrame {
                event: MESSAGE.into(),
                kind: Some(TEXT.into()),
                data: Value::String(text.clone()),
            },
            ClientFrame::File(file) => {
                // The file reference travels as a JSON string, not an object.
                let encoded = serde_json::to_string(file)
                    .map_err(|e| ChatError::InvalidFormat(e.to_string()))?;
                RawFrame {
                    event: MESSAGE.into(),
                    kind: Some(FILE.into()),
                    data: Value::String(encoded),
                }
            }
            ClientFrame::Ping => RawFrame {
                event: PING.into(),
                kind: Some(PING.into()),
                data: Value::String(PING.into()),
            },
        })
    }

    pub fn encode(&self) -> Result<String, ChatError> {
        serde_json::to_string(&self.to_raw()?).map_err(|e| ChatError::InvalidFormat(e.to_string()))
    }

    pub fn to_message(&self) -> Result<Message, ChatError> {
        Ok(Message::Text(self.encode()?))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    AuthResult,
    Text(String),
    File(FileRef),
    Error(String),
    Close(String),
    /// An event this client does not handle.
    Other(String),
}

impl ServerFrame {
    pub fn decode(text: &str) -> Result<Self, ChatError> {
        let raw: RawFrame =
            serde_json::from_str(text).map_err(|e| ChatError::InvalidFormat(e.to_string()))?;

        Ok(match raw.event.as_str() {
            AUTH_RESP => ServerFrame::AuthResult,
            MESSAGE => match raw.kind.as_deref() {
                Some(TEXT) => ServerFrame::Text(raw.data_string()),
                Some(FILE) => {
                    let file: FileRef = match &raw.data {
                        Value::String(s) => serde_json::from_str(s),
                        other => serde_json::from_value(other.clone()),
                    }
                    .map_err(|e| ChatError::InvalidFormat(format!("file message: {}", e)))?;
                    ServerFrame::File(file)
                }
                other => {
                    debug!(kind = ?other, "unknown message type");
                    ServerFrame::Other(format!("{}:{}", MESSAGE, other.unwrap_or_default()))
                }
            },
            ERROR => ServerFrame::Error(raw.data_string()),
            CLOSE => ServerFrame::Close(raw.data_string()),
            _ => ServerFrame::Other(raw.event),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_json(frame: &ClientFrame) -> Value {
        serde_json::from_str(&frame.encode().unwrap()).unwrap()
    }

    #[test]
    fn client_frames_on_the_wire() {
        assert_eq!(
            as_json(&ClientFrame::Authenticate { token: "tok".into() }),
            json!({"event": "im-auth-req", "data": "tok"})
        );
        assert_eq!(
            as_json(&ClientFrame::Text("hi".into())),
            json!({"event": "im-message", "type": "text", "data": "hi"})
        );
        assert_eq!(
            as_json(&ClientFrame::Ping),
            json!({"event": "im-ping", "type": "im-ping", "data": "im-ping"})
        );
    }

    #[test]
    fn file_payload_is_a_json_string() {
        let frame = ClientFrame::File(FileRef {
            key: "k1".into(),
            name: "cv.pdf".into(),
            size: 2048,
        });
        let value = as_json(&frame);
        assert_eq!(value["type"], "file");
        let inner: Value = serde_json::from_str(value["data"].as_str().unwrap()).unwrap();
        assert_eq!(inner, json!({"key": "k1", "name": "cv.pdf", "size": 2048}));
    }

    #[test]
    fn decodes_server_frames() {
        assert_eq!(
            ServerFrame::decode(r#"{"event":"im-auth-resp","data":"ok"}"#).unwrap(),
            ServerFrame::AuthResult
        );
        assert_eq!(
            ServerFrame::decode(r#"{"event":"im-message","type":"text","data":"yo"}"#).unwrap(),
            ServerFrame::Text("yo".into())
        );
        assert_eq!(
            ServerFrame::decode(
                r#"{"event":"im-message","type":"file","data":"{\"key\":\"a\",\"name\":\"b.txt\",\"size\":3}"}"#
            )
            .unwrap(),
            ServerFrame::File(FileRef { key: "a".into(), name: "b.txt".into(), size: 3 })
        );
        assert_eq!(
            ServerFrame::decode(r#"{"event":"im-close","data":"room expired"}"#).unwrap(),
            ServerFrame::Close("room expired".into())
        );
        assert_eq!(
            ServerFrame::decode(r#"{"event":"im-pong"}"#).unwrap(),
            ServerFrame::Other("im-pong".into())
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(ServerFrame::decode("not json").is_err());
        assert!(ServerFrame::decode(r#"{"event":"im-message","type":"file","data":"{"}"#).is_err());
    }
}
