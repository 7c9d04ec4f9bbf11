//! Normalization of heterogeneous webhook responses into a [`Reply`].
//!
//! Workflow engines answer in many shapes. The recognized shapes are tried
//! in a fixed order, each as a separate strategy:
//!
//! | Order | Shape | Example |
//! |-------|-------|---------|
//! | 1 | object with a string `text` | `{"text":"hi"}` |
//! | 2 | object with a string fallback key | `{"message":"hi"}` |
//! | 3 | bare JSON string | `"hi"` |
//! | 4 | anything else, verbatim | `not json`, `{"foo":1}` |
//!
//! Normalization is pure and total: every input yields a reply.

use serde_json::Value;
use voicehook_types::Reply;

/// Keys consulted, in order, when an object has no string `text` field.
pub const FALLBACK_KEYS: [&str; 4] = ["message", "response", "content", "result"];

/// Which shape a webhook response was recognized as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyShape {
    TextField(String),
    FallbackKey { key: &'static str, text: String },
    JsonString(String),
    RawText(String),
}

impl ReplyShape {
    pub fn label(&self) -> &'static str {
        match self {
            Self::TextField(_) => "text_field",
            Self::FallbackKey { .. } => "fallback_key",
            Self::JsonString(_) => "json_string",
            Self::RawText(_) => "raw_text",
        }
    }

    pub fn into_reply(self) -> Reply {
        match self {
            Self::TextField(text)
            | Self::FallbackKey { text, .. }
            | Self::JsonString(text)
            | Self::RawText(text) => Reply::new(text),
        }
    }
}

type Strategy = fn(&Value) -> Option<ReplyShape>;

/// Structured strategies in priority order. Raw text is the implicit last one.
const STRATEGIES: [Strategy; 3] = [text_field, fallback_key, json_string];

fn text_field(value: &Value) -> Option<ReplyShape> {
    value
        .as_object()?
        .get("text")?
        .as_str()
        .map(|text| ReplyShape::TextField(text.to_string()))
}

fn fallback_key(value: &Value) -> Option<ReplyShape> {
    let object = value.as_object()?;
    FALLBACK_KEYS.iter().find_map(|&key| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(|text| ReplyShape::FallbackKey {
                key,
                text: text.to_string(),
            })
    })
}

fn json_string(value: &Value) -> Option<ReplyShape> {
    value
        .as_str()
        .map(|text| ReplyShape::JsonString(text.to_string()))
}

/// Recognizes the shape of a raw webhook response body.
pub fn classify(raw: &str) -> ReplyShape {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return ReplyShape::RawText(raw.to_string());
    };
    STRATEGIES
        .iter()
        .find_map(|strategy| strategy(&value))
        .unwrap_or_else(|| ReplyShape::RawText(raw.to_string()))
}

/// Converts a raw webhook response body into its canonical reply.
pub fn normalize(raw: &str) -> Reply {
    classify(raw).into_reply()
}
