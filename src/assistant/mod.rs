//! Assistant module
//!
//! Streaming chat with the site's virtual assistant: the event-stream
//! decoder, the `/aichat` call and the conversation state that strips
//! emotion tags from replies.

mod client;
mod conversation;
mod sse;

pub use client::ChatStreamHandler;
pub use conversation::{Conversation, Entry, APOLOGY, THINKING};
pub use sse::{ChatEvent, SseDecoder};
