use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use super::parser::MAX_TAG_LEN;

const DEFAULT_EMOTIONS: &[&str] = &[
    "joy", "happy", "sad", "sorry", "think", "idea", "shock", "surprise", "shy", "idle", "wave",
    "normal",
];

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<<([^<>]+?)>>").expect("static tag pattern"))
}

/// Case-insensitive set of tags the avatar knows how to act out.
#[derive(Debug, Clone)]
pub struct EmotionValidator {
    valid: HashSet<String>,
}

impl Default for EmotionValidator {
    fn default() -> Self {
        Self::new(DEFAULT_EMOTIONS.iter().copied())
    }
}

impl EmotionValidator {
    pub fn new<I, S>(emotions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            valid: emotions
                .into_iter()
                .map(|e| e.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn is_valid(&self, emotion: &str) -> bool {
        self.valid.contains(&emotion.to_lowercase())
    }

    pub fn add_emotions<I, S>(&mut self, emotions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.valid
            .extend(emotions.into_iter().map(|e| e.as_ref().to_lowercase()));
    }

    pub fn all(&self) -> Vec<String> {
        let mut all: Vec<String> = self.valid.iter().cloned().collect();
        all.sort();
        all
    }
}

/// Tags in `message`, in order, without altering it.
pub fn extract_emotions(message: &str) -> Vec<String> {
    tag_regex()
        .captures_iter(message)
        .filter_map(|caps| {
            let tag = caps[1].trim();
            let len = tag.chars().count();
            (len > 0 && len <= MAX_TAG_LEN).then(|| tag.to_string())
        })
        .collect()
}

pub fn strip_emotions(message: &str) -> String {
    tag_regex().replace_all(message, "").trim().to_string()
}

fn count_unrepeated(message: &str, pair: &str, single: char) -> usize {
    let mut count = 0;
    let mut rest = message;
    while let Some(pos) = rest.find(pair) {
        let after = &rest[pos + pair.len()..];
        if after.starts_with(single) {
            rest = &rest[pos + single.len_utf8()..];
        } else {
            count += 1;
            rest = after;
        }
    }
    count
}

/// True when every `<<` has a matching `>>`.
pub fn is_valid_format(message: &str) -> bool {
    count_unrepeated(message, "<<", '<') == count_unrepeated(message, ">>", '>')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageStats {
    pub total_length: usize,
    pub text_length: usize,
    pub emotion_count: usize,
    pub emotions: Vec<String>,
}

pub fn stats(message: &str) -> MessageStats {
    let emotions = extract_emotions(message);
    MessageStats {
        total_length: message.chars().count(),
        text_length: strip_emotions(message).chars().count(),
        emotion_count: emotions.len(),
        emotions,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagPosition {
    Start,
    End,
}

pub fn create_message(text: &str, emotions: &[&str], position: TagPosition) -> String {
    let tags: String = emotions.iter().map(|e| format!("<<{}>>", e)).collect();
    match position {
        TagPosition::End => format!("{}{}", text, tags),
        TagPosition::Start => format!("{}{}", tags, text),
    }
}

/// Inserts a tag before the character at `position`, or appends it when the
/// position is past the end.
pub fn insert_emotion_at(text: &str, emotion: &str, position: usize) -> String {
    let tag = format!("<<{}>>", emotion);
    match text.char_indices().nth(position) {
        Some((byte, _)) => format!("{}{}{}", &text[..byte], tag, &text[byte..]),
        None => format!("{}{}", text, tag),
    }
}

pub fn replace_emotions(text: &str, replacements: &[(&str, &str)]) -> String {
    replacements
        .iter()
        .fold(text.to_string(), |acc, (from, to)| {
            acc.replace(&format!("<<{}>>", from), &format!("<<{}>>", to))
        })
}

/// Makes angle brackets inert so user text can't inject tags.
pub fn escape(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}

pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<").replace("&gt;", ">")
}

/// Keeps ASCII letters, digits, `_` and CJK ideographs; at most 10 characters.
pub fn sanitize_emotion_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || ('\u{4E00}'..='\u{9FA5}').contains(c))
        .take(MAX_TAG_LEN)
        .collect()
}

/// Calls `processor` once for every distinct tag across `messages`, in
/// first-seen order.
pub fn batch_process_emotions<F>(messages: &[&str], mut processor: F)
where
    F: FnMut(&str),
{
    let mut seen = HashSet::new();
    for message in messages {
        for emotion in extract_emotions(message) {
            if seen.insert(emotion.clone()) {
                processor(&emotion);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmotionFrequency {
    pub emotion: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerSummary {
    pub total_messages: usize,
    pub unique_emotions: usize,
    pub total_emotions: usize,
    pub most_frequent: Vec<String>,
}

/// Usage statistics over a history of tagged messages.
#[derive(Debug, Default, Clone)]
pub struct EmotionAnalyzer {
    counts: HashMap<String, usize>,
    total_messages: usize,
}

impl EmotionAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn analyze_message(&mut self, message: &str) {
        for emotion in extract_emotions(message) {
            *self.counts.entry(emotion).or_insert(0) += 1;
        }
        self.total_messages += 1;
    }

    /// Most used first; ties broken alphabetically.
    pub fn frequency(&self) -> Vec<EmotionFrequency> {
        let mut freq: Vec<EmotionFrequency> = self
            .counts
            .iter()
            .map(|(emotion, &count)| EmotionFrequency {
                emotion: emotion.clone(),
                count,
                percentage: if self.total_messages == 0 {
                    0.0
                } else {
                    count as f64 / self.total_messages as f64 * 100.0
                },
            })
            .collect();
        freq.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.emotion.cmp(&b.emotion)));
        freq
    }

    pub fn most_frequent(&self, n: usize) -> Vec<String> {
        self.frequency()
            .into_iter()
            .take(n)
            .map(|f| f.emotion)
            .collect()
    }

    pub fn summary(&self) -> AnalyzerSummary {
        AnalyzerSummary {
            total_messages: self.total_messages,
            unique_emotions: self.counts.len(),
            total_emotions: self.counts.values().sum(),
            most_frequent: self.most_frequent(3),
        }
    }

    pub fn reset(&mut self) {
        self.counts.clear();
        self.total_messages = 0;
    }
}

type Handler = Box<dyn Fn() + Send + Sync>;

/// Case-insensitive registry of reactions to tags.
#[derive(Default)]
pub struct EmotionMapper {
    handlers: HashMap<String, Handler>,
}

impl EmotionMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, emotion: &str, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.handlers.insert(emotion.to_lowercase(), Box::new(handler));
    }

    /// Runs the handler for `emotion`; returns whether one was registered.
    pub fn handle(&self, emotion: &str) -> bool {
        match self.handlers.get(&emotion.to_lowercase()) {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }

    pub fn handle_batch<S: AsRef<str>>(&self, emotions: &[S]) {
        for emotion in emotions {
            self.handle(emotion.as_ref());
        }
    }

    pub fn has(&self, emotion: &str) -> bool {
        self.handlers.contains_key(&emotion.to_lowercase())
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}
