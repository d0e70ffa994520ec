//! Component E: Transcript Router.
//!
//! Accepts finalized ASR transcripts, attaches the current `PersonId`,
//! invokes the agent, and applies the tool-suppression rule (§4.5).

use crate::agent::{AgentClient, AgentReply, ToolContext};
use crate::error::Result;
use crate::types::{Message, PersonId, Role};
use chrono::{DateTime, Utc};

/// Route one finalized transcript through the agent and update
/// `conversation_messages` in place (§4.5 steps 1-4).
///
/// Returns the assistant reply text when one was produced, or `None` when
/// a tool invocation suppressed it.
pub async fn route_transcript(
    agent: &dyn AgentClient,
    conversation_messages: &mut Vec<Message>,
    current_person_id: Option<PersonId>,
    transcript: String,
    at: DateTime<Utc>,
    ctx: &ToolContext,
) -> Result<Option<String>> {
    conversation_messages.push(Message {
        role: Role::User,
        content: transcript,
        timestamp: at,
        person_id: current_person_id,
    });

    match agent.reply(conversation_messages, ctx).await? {
        AgentReply::ToolRan => Ok(None),
        AgentReply::Text(text) => {
            conversation_messages.push(Message {
                role: Role::Assistant,
                content: text.clone(),
                timestamp: Utc::now(),
                person_id: None,
            });
            Ok(Some(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mpsc_sender::NotifySender;
    use crate::store::Store;
    use async_trait::async_trait;

    struct ReplyAgent(&'static str);
    #[async_trait]
    impl AgentClient for ReplyAgent {
        async fn reply(&self, _history: &[Message], _ctx: &ToolContext) -> Result<AgentReply> {
            Ok(AgentReply::Text(self.0.to_owned()))
        }
        async fn recap(&self, _s: &[String]) -> Option<String> {
            None
        }
        async fn summarize(&self, _t: &str) -> Option<crate::agent::TurnSummary> {
            None
        }
    }

    struct ToolAgent;
    #[async_trait]
    impl AgentClient for ToolAgent {
        async fn reply(&self, _history: &[Message], ctx: &ToolContext) -> Result<AgentReply> {
            ctx.add_todo("buy milk")?;
            Ok(AgentReply::ToolRan)
        }
        async fn recap(&self, _s: &[String]) -> Option<String> {
            None
        }
        async fn summarize(&self, _t: &str) -> Option<crate::agent::TurnSummary> {
            None
        }
    }

    fn ctx(conversation_id: &str) -> ToolContext {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        ToolContext {
            store: Store::open_in_memory().unwrap(),
            conversation_id: conversation_id.to_owned(),
            current_person_id: None,
            notify: NotifySender(tx),
        }
    }

    #[tokio::test]
    async fn plain_reply_appends_both_messages() {
        let mut history = Vec::new();
        let agent = ReplyAgent("hello there");
        let ctx = ctx("conv-1");
        let reply = route_transcript(&agent, &mut history, None, "hi".to_owned(), Utc::now(), &ctx)
            .await
            .unwrap();
        assert_eq!(reply, Some("hello there".to_owned()));
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn s5_tool_invocation_suppresses_assistant_message() {
        let mut history = Vec::new();
        let agent = ToolAgent;
        let ctx = ctx("conv-2");
        let reply = route_transcript(
            &agent,
            &mut history,
            None,
            "remind me to buy milk".to_owned(),
            Utc::now(),
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(reply, None);
        assert_eq!(history.len(), 1, "only the user message should be appended");
        assert_eq!(
            ctx.store.todo_count_for_conversation("conv-2").unwrap(),
            1
        );
    }
}
