//! Cross-module scenario tests (the S-numbered scenarios and quantified
//! properties from the top-level design): these exercise two or more
//! components wired together rather than one component in isolation.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use vxl_core::agent::mpsc_sender::NotifySender;
use vxl_core::agent::{AgentClient, AgentReply, ToolContext};
use vxl_core::config::{RecognitionConfig, StoreConfig};
use vxl_core::coordinator::InteractionCoordinator;
use vxl_core::recognition::{FaceEmbedder, RecognitionWorker};
use vxl_core::router::route_transcript;
use vxl_core::store::Store;
use vxl_core::types::{Embedding, Message, SwitchEvent};

struct FixedEmbedder {
    vector: Vec<f32>,
    score: f32,
}

impl FaceEmbedder for FixedEmbedder {
    fn embed(&self, _jpeg: &[u8]) -> Option<(Embedding, f32)> {
        Some((Embedding::new(self.vector.clone()), self.score))
    }
}

fn store_config(path: &std::path::Path) -> StoreConfig {
    StoreConfig {
        db_path: path.to_path_buf(),
        min_connections: 1,
        max_connections: 5,
    }
}

/// S2: a person seen before a process restart is recognized again without a
/// new PersonId — the store round-trips, not the in-memory cache.
#[tokio::test]
async fn s2_return_of_known_person_reuses_existing_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("vxl.db");

    let first_id = {
        let store = Store::open(&store_config(&db_path)).expect("open store");
        let worker = RecognitionWorker::new(
            RecognitionConfig::default(),
            store,
            FixedEmbedder { vector: vec![1.0, 0.0, 0.0], score: 0.9 },
        );
        worker.process_frame(&[]).await.person_id.expect("new id")
    };

    // Simulate a process restart: reopen the same database file.
    let store = Store::open(&store_config(&db_path)).expect("reopen store");
    let worker = RecognitionWorker::new(
        RecognitionConfig::default(),
        store,
        FixedEmbedder { vector: vec![1.0, 0.0, 0.0], score: 0.9 },
    );
    let observation = worker.process_frame(&[]).await;

    assert_eq!(observation.person_id, Some(first_id));
    assert!(observation.similarity >= 0.2);
}

struct NotifyingAgent;

#[async_trait]
impl AgentClient for NotifyingAgent {
    async fn reply(&self, _history: &[Message], ctx: &ToolContext) -> vxl_core::Result<AgentReply> {
        ctx.notify("Hi", "Hello");
        Ok(AgentReply::ToolRan)
    }
    async fn recap(&self, _summaries: &[String]) -> Option<String> {
        None
    }
    async fn summarize(&self, _transcript: &str) -> Option<vxl_core::agent::TurnSummary> {
        None
    }
}

/// S6: an agent-invoked notification tool reaches the client's mailbox
/// exactly once, and no assistant Message is appended for that turn.
#[tokio::test]
async fn s6_agent_notification_reaches_fanout_mailbox() {
    let store = Store::open_in_memory().expect("open store");
    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::unbounded_channel();
    let ctx = ToolContext {
        store,
        conversation_id: "conv-s6".to_owned(),
        current_person_id: None,
        notify: NotifySender(notify_tx),
    };

    let mut history = Vec::new();
    let reply = route_transcript(
        &NotifyingAgent,
        &mut history,
        None,
        "say hi to me".to_owned(),
        Utc::now(),
        &ctx,
    )
    .await
    .expect("route");

    assert_eq!(reply, None, "tool-suppressed turn returns no spoken reply");
    assert_eq!(history.len(), 1, "only the user message is recorded");

    let notification = notify_rx.try_recv().expect("one notification queued");
    assert_eq!(notification.title, "Hi");
    assert_eq!(notification.message, "Hello");
    assert!(notify_rx.try_recv().is_err(), "exactly one notification");
}

struct SilentEmbedder;
impl FaceEmbedder for SilentEmbedder {
    fn embed(&self, _jpeg: &[u8]) -> Option<(Embedding, f32)> {
        None
    }
}

struct StubAgent;
#[async_trait]
impl AgentClient for StubAgent {
    async fn reply(&self, _history: &[Message], _ctx: &ToolContext) -> vxl_core::Result<AgentReply> {
        Ok(AgentReply::Text("ok".to_owned()))
    }
    async fn recap(&self, _summaries: &[String]) -> Option<String> {
        None
    }
    async fn summarize(&self, _transcript: &str) -> Option<vxl_core::agent::TurnSummary> {
        None
    }
}

struct TodoAgent;
#[async_trait]
impl AgentClient for TodoAgent {
    async fn reply(&self, _history: &[Message], ctx: &ToolContext) -> vxl_core::Result<AgentReply> {
        ctx.add_todo("buy milk")?;
        Ok(AgentReply::ToolRan)
    }
    async fn recap(&self, _summaries: &[String]) -> Option<String> {
        None
    }
    async fn summarize(&self, _transcript: &str) -> Option<vxl_core::agent::TurnSummary> {
        None
    }
}

/// Property 5 (isolation): two clients reacting to the same SwitchEvent each
/// get their own fresh conversation_id, and a tool call by one client's
/// transcript never appears in the other's history.
#[tokio::test]
async fn property_5_concurrent_clients_stay_isolated() {
    let store = Store::open_in_memory().expect("open store");
    let recognition = Arc::new(RecognitionWorker::new(
        RecognitionConfig::default(),
        store.clone(),
        SilentEmbedder,
    ));

    let (notify_a_tx, _notify_a_rx) = tokio::sync::mpsc::unbounded_channel();
    let (switch_a_tx, mut switch_a_rx) = tokio::sync::mpsc::unbounded_channel();
    let coordinator_a = Arc::new(InteractionCoordinator::new(
        store.clone(),
        Arc::new(StubAgent),
        Arc::clone(&recognition),
        notify_a_tx,
        switch_a_tx,
    ));

    let (notify_b_tx, _notify_b_rx) = tokio::sync::mpsc::unbounded_channel();
    let (switch_b_tx, mut switch_b_rx) = tokio::sync::mpsc::unbounded_channel();
    let coordinator_b = Arc::new(InteractionCoordinator::new(
        store.clone(),
        Arc::new(StubAgent),
        Arc::clone(&recognition),
        notify_b_tx,
        switch_b_tx,
    ));

    let conv_a_before = coordinator_a.conversation_id().await;
    let conv_b_before = coordinator_b.conversation_id().await;

    let event = SwitchEvent {
        from: None,
        to: Some("Unnamed_99999999".to_owned()),
        at: Utc::now(),
    };
    coordinator_a.handle_switch(event.clone()).await;
    coordinator_b.handle_switch(event).await;

    let conv_a_after = coordinator_a.conversation_id().await;
    let conv_b_after = coordinator_b.conversation_id().await;
    assert_ne!(conv_a_before, conv_a_after);
    assert_ne!(conv_b_before, conv_b_after);
    assert_ne!(conv_a_after, conv_b_after);

    switch_a_rx.recv().await.expect("a notified");
    switch_b_rx.recv().await.expect("b notified");

    // A tool call via client A's transcript never touches client B's store view.
    let ctx_a = ToolContext {
        store: store.clone(),
        conversation_id: coordinator_a.conversation_id().await,
        current_person_id: coordinator_a.current_person_id().await,
        notify: NotifySender(tokio::sync::mpsc::unbounded_channel().0),
    };
    let mut history_a = Vec::new();
    route_transcript(
        &TodoAgent,
        &mut history_a,
        coordinator_a.current_person_id().await,
        "remind me to buy milk".to_owned(),
        Utc::now(),
        &ctx_a,
    )
    .await
    .expect("route");

    assert_eq!(
        store
            .todo_count_for_conversation(&coordinator_a.conversation_id().await)
            .unwrap(),
        1
    );
    assert_eq!(
        store
            .todo_count_for_conversation(&coordinator_b.conversation_id().await)
            .unwrap(),
        0
    );
    assert_eq!(coordinator_b.message_count().await, 0);
}

/// Property 3 (at-most-one writer): the final centroid write for a
/// departing person happens synchronously inside `handle_switch`, strictly
/// before the departure notification is enqueued to the client mailbox.
#[tokio::test]
async fn property_3_final_write_precedes_departure_notification() {
    let store = Store::open_in_memory().expect("open store");
    let recognition = Arc::new(RecognitionWorker::new(
        RecognitionConfig::default(),
        store.clone(),
        FixedEmbedder { vector: vec![1.0, 0.0], score: 0.9 },
    ));

    let person_id = recognition
        .process_frame(&[])
        .await
        .person_id
        .expect("new person");
    recognition.process_frame(&[]).await; // fold a second observation in

    let (notify_tx, _notify_rx) = tokio::sync::mpsc::unbounded_channel();
    let (switch_tx, mut switch_rx) = tokio::sync::mpsc::unbounded_channel();
    let coordinator = Arc::new(InteractionCoordinator::new(
        store.clone(),
        Arc::new(StubAgent),
        Arc::clone(&recognition),
        notify_tx,
        switch_tx,
    ));

    coordinator
        .handle_switch(SwitchEvent {
            from: Some(person_id.clone()),
            to: None,
            at: Utc::now(),
        })
        .await;

    let gallery = store.load_gallery().expect("load gallery");
    let entry = gallery.iter().find(|g| g.person_id == person_id).expect("entry exists");
    assert_eq!(entry.count, 2, "folded average persisted before notify");

    let notification = switch_rx.recv().await.expect("departure notification queued");
    assert_eq!(notification.person_id, None);
}
