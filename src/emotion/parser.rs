//! Incremental parser for inline `<<emotion>>` control tags.
//!
//! Assistant replies arrive token by token, so a tag can be split across
//! chunks (`"<<jo"` then `"y>> hello"`). The parser emits plain text as soon
//! as it is known not to belong to a tag and holds back a possible tag
//! opening until it is closed or ruled out.

const OPEN: &str = "<<";
const CLOSE: &str = ">>";

/// Longest tag body, in characters.
pub const MAX_TAG_LEN: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedChunk {
    /// Text that can be shown right away.
    pub display_text: String,
    /// Complete tags found in this chunk, in order.
    pub emotions: Vec<String>,
    /// Text held back for the next chunk.
    pub remaining_buffer: String,
}

#[derive(Debug, Default, Clone)]
pub struct MessageParser {
    buffer: String,
}

impl MessageParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, chunk: &str) -> ParsedChunk {
        self.buffer.push_str(chunk);
        let buf = std::mem::take(&mut self.buffer);

        let mut emotions = Vec::new();
        let mut display_text = String::with_capacity(buf.len());
        let mut held_from = None;
        let mut i = 0;

        while i < buf.len() {
            let Some(rel_open) = buf[i..].find(OPEN) else {
                // A trailing '<' may be the first half of an opening.
                if buf.ends_with('<') {
                    let last = buf.len() - 1;
                    display_text.push_str(&buf[i..last]);
                    held_from = Some(last);
                } else {
                    display_text.push_str(&buf[i..]);
                }
                break;
            };
            let open = i + rel_open;
            display_text.push_str(&buf[i..open]);
            let body_start = open + OPEN.len();

            match buf[body_start..].find(CLOSE) {
                None => {
                    if buf[body_start..].chars().count() >= MAX_TAG_LEN {
                        // Too long to still become a tag.
                        display_text.push_str(OPEN);
                        i = body_start;
                    } else {
                        held_from = Some(open);
                        break;
                    }
                }
                Some(rel_close) => {
                    let close = body_start + rel_close;
                    let tag = buf[body_start..close].trim();
                    let len = tag.chars().count();
                    if len > 0 && len <= MAX_TAG_LEN {
                        emotions.push(tag.to_string());
                        i = close + CLOSE.len();
                    } else {
                        display_text.push_str(OPEN);
                        i = body_start;
                    }
                }
            }
        }

        if let Some(open) = held_from {
            self.buffer = buf[open..].to_string();
        }

        ParsedChunk {
            display_text,
            emotions,
            remaining_buffer: self.buffer.clone(),
        }
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Releases whatever is still held back; call when the stream ends.
    pub fn finalize(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

/// Parses a complete message; any held-back text is treated as plain text.
pub fn parse_message_once(full_message: &str) -> ParsedChunk {
    let mut parser = MessageParser::new();
    let mut result = parser.parse(full_message);
    result.display_text.push_str(&parser.finalize());
    result.remaining_buffer.clear();
    result
}
