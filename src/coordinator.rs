//! Component D: Interaction Coordinator.
//!
//! One per connected client. Owns a [`ConversationState`] and reacts to
//! [`SwitchEvent`]s with the four-step handling in §4.4: detached
//! background summarization, history clear, new conversation id, recap
//! load with timeout, and notification emission.

use crate::agent::SharedAgentClient;
use crate::fanout::Notification;
use crate::recognition::FaceEmbedder;
use crate::recognition::RecognitionWorker;
use crate::store::Store;
use crate::types::{
    ConversationState, Message, PersonId, Role, SwitchEvent, DEFAULT_NO_RECAP_BLURB,
    NO_PERSON_NAME, UNKNOWN_PERSON_NAME,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// The notification emitted to a client on a person switch (§4.4 step 5).
#[derive(Debug, Clone)]
pub struct SwitchNotification {
    pub person_id: Option<PersonId>,
    pub person_name: String,
    pub recap: Option<String>,
    pub blurb: String,
}

/// Per-client owner of a [`ConversationState`], driving the switch protocol.
pub struct InteractionCoordinator<E: FaceEmbedder> {
    state: Mutex<ConversationState>,
    store: Store,
    agent: SharedAgentClient,
    recognition: Arc<RecognitionWorker<E>>,
    notify_tx: mpsc::UnboundedSender<Notification>,
    switch_notify_tx: mpsc::UnboundedSender<SwitchNotification>,
}

impl<E: FaceEmbedder + 'static> InteractionCoordinator<E> {
    pub fn new(
        store: Store,
        agent: SharedAgentClient,
        recognition: Arc<RecognitionWorker<E>>,
        notify_tx: mpsc::UnboundedSender<Notification>,
        switch_notify_tx: mpsc::UnboundedSender<SwitchNotification>,
    ) -> Self {
        Self {
            state: Mutex::new(ConversationState::new()),
            store,
            agent,
            recognition,
            notify_tx,
            switch_notify_tx,
        }
    }

    /// Read-only snapshot helper for tests and the router.
    pub async fn conversation_id(&self) -> String {
        self.state.lock().await.conversation_id.clone()
    }

    pub async fn current_person_id(&self) -> Option<PersonId> {
        self.state.lock().await.current_person_id.clone()
    }

    pub async fn message_count(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    /// The current conversation's full message history (§4.5 step 2: "invoke
    /// the agent with the full message history").
    pub async fn history(&self) -> Vec<Message> {
        self.state.lock().await.messages.clone()
    }

    pub async fn append_message(&self, message: Message) {
        self.state.lock().await.append(message);
    }

    /// Overwrite the current conversation id (§6 `set_interaction_id`).
    pub async fn set_conversation_id(&self, conversation_id: String) {
        self.state.lock().await.conversation_id = conversation_id;
    }

    /// Handle one confirmed [`SwitchEvent`] (§4.4).
    pub async fn handle_switch(self: &Arc<Self>, event: SwitchEvent) {
        // Step 1: summarize outgoing, detached — must never block the
        // foreground notification path.
        if let Some(from) = event.from.clone() {
            let (outgoing_messages, outgoing_conversation_id): (Vec<Message>, String) = {
                let state = self.state.lock().await;
                let messages = state
                    .messages
                    .iter()
                    .filter(|m| m.person_id.as_ref() == Some(&from))
                    .cloned()
                    .collect();
                (messages, state.conversation_id.clone())
            };
            if !outgoing_messages.is_empty() {
                let this = Arc::clone(self);
                let from_for_task = from.clone();
                tokio::spawn(async move {
                    this.summarize_and_store(from_for_task, outgoing_conversation_id, outgoing_messages)
                        .await;
                });
            }
            if let Err(e) = self.recognition.finalize_departure(&from) {
                tracing::warn!(error = %e, person_id = %from, "final centroid write failed");
            }
        }

        // Step 2 + 3: clear history, new conversation id.
        {
            let mut state = self.state.lock().await;
            state.clear_for_switch();
            state.current_person_id = event.to.clone();
            state.person_present = event.to.is_some();
        }

        // Step 4: load recap for incoming.
        let recap = match &event.to {
            Some(person_id) => self.load_recap(person_id).await,
            None => None,
        };

        // Step 5: notify.
        let person_name = self.display_name(&event.to);
        let notification = SwitchNotification {
            person_id: event.to.clone(),
            person_name,
            recap,
            blurb: DEFAULT_NO_RECAP_BLURB.to_owned(),
        };
        let _ = self.switch_notify_tx.send(notification);
    }

    async fn summarize_and_store(&self, person_id: PersonId, conversation_id: String, messages: Vec<Message>) {
        let transcript = render_transcript(&messages);
        let Some(summary) = self.agent.summarize(&transcript).await else {
            tracing::warn!(%person_id, "summarization failed, skipping store write");
            return;
        };
        if let Err(e) = self
            .store
            .insert_summary(&person_id, &summary.prose, chrono::Utc::now())
        {
            tracing::warn!(error = %e, %person_id, "failed to persist summary");
        }
        if let Err(e) = self.store.set_recap(&person_id, &summary.prose) {
            tracing::warn!(error = %e, %person_id, "failed to persist recap");
        }
        for topic in &summary.topics {
            if let Err(e) = self.store.insert_person_memory(
                &person_id,
                topic,
                Some("extracted from conversation summary"),
                &conversation_id,
            ) {
                tracing::warn!(error = %e, %person_id, "failed to persist person memory");
            }
        }
        for action_item in &summary.action_items {
            if let Err(e) = self
                .store
                .insert_todo(action_item, Some(&person_id), &conversation_id)
            {
                tracing::warn!(error = %e, %person_id, "failed to persist todo");
            }
        }
    }

    async fn load_recap(&self, person_id: &PersonId) -> Option<String> {
        match self.store.person_exists(person_id) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                tracing::warn!(error = %e, %person_id, "store lookup failed during recap load");
                return None;
            }
        }

        let summaries = match self.store.summaries_for_person(person_id) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, %person_id, "failed to load summaries for recap");
                return None;
            }
        };
        let texts: Vec<String> = summaries.into_iter().map(|s| s.text).collect();
        self.agent.recap(&texts).await
    }

    fn display_name(&self, person_id: &Option<PersonId>) -> String {
        match person_id {
            None => NO_PERSON_NAME.to_owned(),
            Some(id) => match self.store.get_name(id) {
                Ok(Some(name)) => name,
                Ok(None) => UNKNOWN_PERSON_NAME.to_owned(),
                Err(e) => {
                    tracing::warn!(error = %e, person_id = %id, "name lookup failed");
                    UNKNOWN_PERSON_NAME.to_owned()
                }
            },
        }
    }
}

fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentClient, AgentReply, ToolContext};
    use crate::recognition::RecognitionWorker;
    use crate::config::RecognitionConfig;
    use crate::types::Embedding;
    use async_trait::async_trait;
    use chrono::Utc;

    struct StubEmbedder;
    impl FaceEmbedder for StubEmbedder {
        fn embed(&self, _jpeg: &[u8]) -> Option<(Embedding, f32)> {
            None
        }
    }

    struct StubAgent;
    #[async_trait]
    impl AgentClient for StubAgent {
        async fn reply(&self, _history: &[Message], _ctx: &ToolContext) -> crate::error::Result<AgentReply> {
            Ok(AgentReply::Text("ok".to_owned()))
        }
        async fn recap(&self, summaries: &[String]) -> Option<String> {
            summaries.first().cloned()
        }
        async fn summarize(&self, transcript: &str) -> Option<crate::agent::TurnSummary> {
            Some(crate::agent::TurnSummary {
                participants: vec![],
                topics: vec!["demo topic".to_owned()],
                action_items: vec!["demo action".to_owned()],
                prose: format!("summary of: {transcript}"),
            })
        }
    }

    fn build() -> (
        Arc<InteractionCoordinator<StubEmbedder>>,
        mpsc::UnboundedReceiver<SwitchNotification>,
        Store,
    ) {
        let store = Store::open_in_memory().unwrap();
        let recognition = Arc::new(RecognitionWorker::new(
            RecognitionConfig::default(),
            store.clone(),
            StubEmbedder,
        ));
        let (notify_tx, _notify_rx) = mpsc::unbounded_channel();
        let (switch_tx, switch_rx) = mpsc::unbounded_channel();
        let coordinator = Arc::new(InteractionCoordinator::new(
            store.clone(),
            Arc::new(StubAgent),
            recognition,
            notify_tx,
            switch_tx,
        ));
        (coordinator, switch_rx, store)
    }

    #[tokio::test]
    async fn switch_to_person_clears_history_and_assigns_new_conversation_id() {
        let (coordinator, mut switch_rx, _store) = build();
        let old_conv = coordinator.conversation_id().await;

        coordinator
            .append_message(Message {
                role: Role::User,
                content: "hi".to_owned(),
                timestamp: Utc::now(),
                person_id: None,
            })
            .await;

        coordinator
            .handle_switch(SwitchEvent {
                from: None,
                to: Some("Unnamed_12345678".to_owned()),
                at: Utc::now(),
            })
            .await;

        assert_eq!(coordinator.message_count().await, 0);
        assert_ne!(coordinator.conversation_id().await, old_conv);

        let notification = switch_rx.recv().await.unwrap();
        assert_eq!(notification.person_id, Some("Unnamed_12345678".to_owned()));
        assert_eq!(notification.person_name, UNKNOWN_PERSON_NAME);
        assert!(notification.recap.is_none());
    }

    #[tokio::test]
    async fn switch_to_none_uses_no_person_detected_label() {
        let (coordinator, mut switch_rx, _store) = build();
        coordinator
            .handle_switch(SwitchEvent {
                from: None,
                to: None,
                at: Utc::now(),
            })
            .await;
        let notification = switch_rx.recv().await.unwrap();
        assert_eq!(notification.person_name, NO_PERSON_NAME);
    }

    #[tokio::test]
    async fn summarize_and_store_persists_topics_and_action_items() {
        let (coordinator, _switch_rx, store) = build();
        let person_id = "Unnamed_55555555".to_owned();
        store
            .insert_new_face(&person_id, &crate::types::Embedding::new(vec![1.0]))
            .unwrap();

        coordinator
            .summarize_and_store(
                person_id.clone(),
                "conv-xyz".to_owned(),
                vec![Message {
                    role: Role::User,
                    content: "remind me to call the vet".to_owned(),
                    timestamp: Utc::now(),
                    person_id: Some(person_id.clone()),
                }],
            )
            .await;

        assert_eq!(
            store.summaries_for_person(&person_id).unwrap().len(),
            1,
            "prose summary recorded"
        );
        assert_eq!(
            store.todo_count_for_conversation("conv-xyz").unwrap(),
            1,
            "action item persisted as a todo"
        );
    }
}
