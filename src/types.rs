//! Domain types shared by every pipeline component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque person identity: either a stored name or an auto-generated
/// `Unnamed_<hex8>` assigned on first sighting.
pub type PersonId = String;

/// Generate a fresh `Unnamed_<hex8>` identity.
pub fn new_unnamed_person_id() -> PersonId {
    let suffix: u32 = rand::random();
    format!("Unnamed_{suffix:08x}")
}

/// A face embedding: a fixed-length vector of 32-bit floats.
///
/// The canonical comparison is cosine similarity; see [`crate::embedding`].
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dims(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// The persisted centroid for a person: `(embedding, count)`.
///
/// Invariant: `count >= 1`; `embedding` is never zero-norm.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub person_id: PersonId,
    pub embedding: Embedding,
    pub count: u32,
}

/// A per-frame recognition result, transient (never persisted directly).
#[derive(Debug, Clone)]
pub struct PersonObservation {
    pub person_id: Option<PersonId>,
    pub similarity: f32,
    pub timestamp: DateTime<Utc>,
}

/// A confirmed transition of the currently-present person.
///
/// Invariant: `from != to`.
#[derive(Debug, Clone)]
pub struct SwitchEvent {
    pub from: Option<PersonId>,
    pub to: Option<PersonId>,
    pub at: DateTime<Utc>,
}

/// The role of a [`Message`] in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A single conversational turn. Immutable after append.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub person_id: Option<PersonId>,
}

/// Per-client conversational context bound to the currently-present person.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub conversation_id: String,
    pub messages: Vec<Message>,
    pub current_person_id: Option<PersonId>,
    pub person_present: bool,
    pub last_speech_time: DateTime<Utc>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            conversation_id: uuid::Uuid::new_v4().to_string(),
            messages: Vec::new(),
            current_person_id: None,
            person_present: false,
            last_speech_time: Utc::now(),
        }
    }

    /// Append a message, keeping `last_speech_time` monotone.
    pub fn append(&mut self, message: Message) {
        if message.timestamp > self.last_speech_time {
            self.last_speech_time = message.timestamp;
        }
        self.messages.push(message);
    }

    /// Drop all messages, starting a fresh conversation id.
    pub fn clear_for_switch(&mut self) {
        self.messages.clear();
        self.conversation_id = uuid::Uuid::new_v4().to_string();
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

/// An append-only summary of a person's dialogue, ordered by `created_at`.
#[derive(Debug, Clone)]
pub struct Summary {
    pub person_id: PersonId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// The display name fallback used when a person has no stored name.
pub const UNKNOWN_PERSON_NAME: &str = "Unknown";

/// The display name used when no person is currently present.
pub const NO_PERSON_NAME: &str = "No person detected";

/// The blurb shown when a switch notification carries no recap.
pub const DEFAULT_NO_RECAP_BLURB: &str = "Last seen: 5 min ago";

/// Sentinel returned by the agent when a tool invocation should suppress the
/// assistant's textual reply.
pub const NO_FURTHER_RESPONSE: &str = "NO_FURTHER_RESPONSE";
