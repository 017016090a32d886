use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A shared file, as announced in the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub content: String,
    pub send_by_self: bool,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn text(content: impl Into<String>, send_by_self: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            send_by_self,
            kind: MessageKind::Text,
            file: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// File messages display the file name, or "file" when it has none.
    pub fn file(file: FileRef, send_by_self: bool) -> Self {
        let content = if file.name.is_empty() {
            "file".to_string()
        } else {
            file.name.clone()
        };
        Self {
            id: Uuid::new_v4(),
            content,
            send_by_self,
            kind: MessageKind::File,
            file: Some(file),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}
