use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::client::ChatStreamHandler;
use super::sse::ChatEvent;
use crate::api::{ApiClient, ChatRequest};
use crate::emotion::{motion_strategy, MessageParser, Motion};
use crate::error::AppError;
use crate::Result;

pub const THINKING: &str = "Thinking...";
pub const APOLOGY: &str = "Sorry, something went wrong. Please try again later.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: Uuid,
    pub text: String,
    pub is_user: bool,
}

impl Entry {
    fn new(text: impl Into<String>, is_user: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            is_user,
        }
    }
}

/// A dialog with the assistant avatar.
pub struct Conversation {
    api: ApiClient,
    entries: Vec<Entry>,
    conversation_id: Option<String>,
    loading: bool,
    emotions: Vec<String>,
    motions: Vec<Motion>,
}

/// Applies one streamed reply to the placeholder entry.
struct Turn<'a, F> {
    entry: &'a mut Entry,
    conversation_id: &'a mut Option<String>,
    emotions: &'a mut Vec<String>,
    motions: &'a mut Vec<Motion>,
    parser: MessageParser,
    started: bool,
    on_text: F,
}

impl<F: FnMut(&str)> Turn<'_, F> {
    fn append(&mut self, text: &str) {
        if !self.started {
            self.entry.text.clear();
            self.started = true;
        }
        if !text.is_empty() {
            self.entry.text.push_str(text);
            (self.on_text)(text);
        }
    }
}

impl<F: FnMut(&str)> ChatStreamHandler for Turn<'_, F> {
    fn on_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Message(chunk) => {
                let parsed = self.parser.parse(&chunk);
                self.append(&parsed.display_text);
                for emotion in parsed.emotions {
                    let motion = motion_strategy(&emotion);
                    debug!(%emotion, group = motion.group, index = motion.index, "avatar motion");
                    self.motions.push(motion);
                    self.emotions.push(emotion);
                }
            }
            ChatEvent::ConversationId(id) => {
                debug!(conversation_id = %id, "conversation id received");
                *self.conversation_id = Some(id);
            }
            ChatEvent::Workflow(status) => debug!(%status, "workflow update"),
            ChatEvent::Other { event_type, .. } => debug!(%event_type, "ignoring event"),
        }
    }

    fn on_finished(&mut self) {
        let rest = self.parser.finalize();
        self.append(&rest);
    }

    fn on_error(&mut self, _error: &AppError) {
        self.parser.clear();
        self.entry.text = APOLOGY.to_string();
    }
}

impl Conversation {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            entries: Vec::new(),
            conversation_id: None,
            loading: false,
            emotions: Vec::new(),
            motions: Vec::new(),
        }
    }

    pub async fn send(&mut self, input: &str) -> Result<()> {
        self.send_with(input, |_| {}).await
    }

    /// Like [`Conversation::send`], calling `on_text` with each piece of
    /// reply text as it becomes displayable.
    pub async fn send_with<F>(&mut self, input: &str, on_text: F) -> Result<()>
    where
        F: FnMut(&str),
    {
        if input.trim().is_empty() {
            return Ok(());
        }

        let request = ChatRequest {
            message: input.to_string(),
            conversation_id: self.conversation_id.clone(),
        };
        self.entries.push(Entry::new(input, true));
        self.entries.push(Entry::new(THINKING, false));
        self.loading = true;
        info!(conversation_id = ?self.conversation_id, "asking assistant");

        let result = {
            let Self {
                api,
                entries,
                conversation_id,
                emotions,
                motions,
                ..
            } = self;
            let Some(entry) = entries.last_mut() else {
                return Err(AppError::InternalError("placeholder entry missing".into()));
            };
            let mut turn = Turn {
                entry,
                conversation_id,
                emotions,
                motions,
                parser: MessageParser::new(),
                started: false,
                on_text,
            };
            api.ai_chat(&request, &mut turn).await
        };

        self.loading = false;
        result
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// The assistant's most recent reply.
    pub fn last_reply(&self) -> Option<&Entry> {
        self.entries.iter().rev().find(|e| !e.is_user)
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Emotion tags seen so far, in order.
    pub fn emotions(&self) -> &[String] {
        &self.emotions
    }

    pub fn motions(&self) -> &[Motion] {
        &self.motions
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.conversation_id = None;
        self.emotions.clear();
        self.motions.clear();
    }
}
