//! The LLM agent and summarizer are external collaborators (§1); this
//! module defines the boundary this crate owns: the [`AgentClient`] trait,
//! the explicit [`ToolContext`] value that replaces the source's
//! global-callback "ambient authority" pattern (§9), and an HTTP-backed
//! reference implementation.

mod http;

pub use http::HttpAgentClient;

use crate::error::Result;
use crate::fanout::Notification;
use crate::store::Store;
use crate::types::{Message, PersonId, NO_FURTHER_RESPONSE};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Explicit, per-turn context an agent's tool loop needs to act on the
/// world, replacing process-global callbacks (§9 "Dynamic binding of tool
/// callbacks").
#[derive(Clone)]
pub struct ToolContext {
    pub store: Store,
    pub conversation_id: String,
    pub current_person_id: Option<PersonId>,
    pub notify: mpsc_sender::NotifySender,
}

/// A thin wrapper so `ToolContext` stays `Clone` without exposing the raw
/// channel type at every call site.
pub mod mpsc_sender {
    use super::Notification;
    use tokio::sync::mpsc::UnboundedSender;

    #[derive(Clone)]
    pub struct NotifySender(pub UnboundedSender<Notification>);

    impl NotifySender {
        pub fn send(&self, notification: Notification) {
            let _ = self.0.send(notification);
        }
    }
}

impl ToolContext {
    /// Tool effect: rename the currently-bound person (mirrors
    /// `update_name_tool`/`change_name`, §B.5).
    pub fn update_name(&self, new_name: &str) -> Result<bool> {
        match &self.current_person_id {
            Some(person_id) => self.store.set_name(person_id, new_name),
            None => Ok(false),
        }
    }

    /// Tool effect: push a notification to this client (§4.5).
    pub fn notify(&self, title: &str, message: &str) {
        self.notify.send(Notification {
            title: title.to_owned(),
            message: message.to_owned(),
        });
    }

    /// Tool effect: create a todo linked to the current conversation (§8 S5).
    pub fn add_todo(&self, description: &str) -> Result<i64> {
        self.store
            .insert_todo(description, self.current_person_id.as_ref(), &self.conversation_id)
    }
}

/// Outcome of one agent turn (§4.5 step 2-3).
#[derive(Debug, Clone)]
pub enum AgentReply {
    /// The agent produced a textual reply to speak back to the user.
    Text(String),
    /// A tool ran during this turn; the reply is suppressed.
    ToolRan,
}

impl AgentReply {
    pub fn from_raw(text: String, tool_invoked: bool) -> Self {
        if tool_invoked || text.trim() == NO_FURTHER_RESPONSE {
            Self::ToolRan
        } else {
            Self::Text(text)
        }
    }
}

/// Structured summary of a departing person's turn (§4.4 step 1): the
/// prose recap plus the `key_topics`/`action_items` breakdown that feeds
/// `person_memories` and `todos` (§8 "live, not just schema").
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TurnSummary {
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    pub prose: String,
}

/// The LLM agent boundary: full message history in, a reply or tool-run
/// sentinel out. The core treats the agent as a black box (§4.5 step 2).
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn reply(&self, history: &[Message], ctx: &ToolContext) -> Result<AgentReply>;

    /// Synthesize a recap from a person's summaries, most-recent-first
    /// (§4.4 step 4). `None` on timeout or failure.
    async fn recap(&self, summaries_most_recent_first: &[String]) -> Option<String>;

    /// Structured turn summary for the departing person (§4.4 step 1):
    /// participants, topics, action items, and a prose summary.
    async fn summarize(&self, transcript: &str) -> Option<TurnSummary>;
}

pub type SharedAgentClient = Arc<dyn AgentClient>;
