//! Emotion tags embedded in assistant replies.
//!
//! Replies carry inline markers such as `<<joy>>`. They are stripped from the
//! visible text and mapped to avatar motions.

mod motion;
mod parser;
pub mod tools;

pub use motion::{motion_strategy, Motion, IDLE};
pub use parser::{parse_message_once, MessageParser, ParsedChunk, MAX_TAG_LEN};
