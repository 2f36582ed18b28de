//! Domain models for archived chat threads.
//!
//! These records are what the document store serializes to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Extension key carrying an inline image payload (data URI or bare base64).
pub const EXTRA_IMAGE_BASE64: &str = "image_base64";

/// Extension key carrying an absolute path to a persisted image asset.
pub const EXTRA_FILE_PATH: &str = "file_path";

/// Kind of content carried by a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text body.
    #[default]
    Text,
    /// Image, resolved through the `extra` map.
    Image,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            _ => Err(format!("Unknown message type: {s}. Use: text, image")),
        }
    }
}

/// A single entry in a thread. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: String,
    /// Free-form author role ("user", "ai", ...).
    pub role: String,
    /// Content kind.
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// Body text, possibly empty.
    #[serde(default)]
    pub text: String,
    /// Open-ended extension map.
    #[serde(default)]
    pub extra: Map<String, Value>,
    /// When this message was appended.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// String value stored under `key` in the extension map.
    #[must_use]
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Whether this is an image message.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.kind == MessageKind::Image
    }
}

/// Input for appending a message.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    /// Author role.
    pub role: String,
    /// Optional body text (stored as empty when absent).
    pub text: Option<String>,
    /// Content kind.
    pub kind: MessageKind,
    /// Optional extension map.
    pub extra: Option<Map<String, Value>>,
}

impl NewMessage {
    /// Text message from `role`.
    #[must_use]
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: Some(text.into()),
            kind: MessageKind::Text,
            extra: None,
        }
    }

    /// Image message carrying an inline base64 payload.
    #[must_use]
    pub fn image_base64(
        role: impl Into<String>,
        caption: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        let mut extra = Map::new();
        extra.insert(EXTRA_IMAGE_BASE64.to_string(), Value::String(payload.into()));
        Self {
            role: role.into(),
            text: Some(caption.into()),
            kind: MessageKind::Image,
            extra: Some(extra),
        }
    }
}

/// A named, ordered conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Unique identifier for this thread.
    pub id: String,
    /// Display name.
    pub name: String,
    /// When this thread was created.
    pub created_at: DateTime<Utc>,
    /// When a message was last appended.
    pub modified_at: DateTime<Utc>,
    /// Messages in insertion order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Thread {
    /// Get total message count.
    #[must_use]
    pub const fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Get image message count.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_image()).count()
    }

    /// First text body, used as a preview in listings.
    #[must_use]
    pub fn preview(&self) -> &str {
        self.messages
            .iter()
            .find(|m| !m.text.is_empty())
            .map_or("[Empty thread]", |m| m.text.as_str())
    }

    /// Short id prefix for table display.
    #[must_use]
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}
