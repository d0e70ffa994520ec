//! WebSocket server: the glasses-facing protocol described in §6. Binary
//! frames are 16-bit PCM audio forwarded verbatim to the cloud ASR; text
//! frames are the JSON protocol (`ping`/`set_interaction_id`/`change_name`
//! inbound, `connected`/`pong`/`notification`/`switch_interaction_person`/
//! `error` outbound).
//!
//! Every accepted connection spawns three tasks (§5): an audio-read task, a
//! notification-drain task, and a client-event task. The client-event task
//! drains both `SwitchEvent`s and finalized transcripts from a single
//! `tokio::select!` loop so a switch is always fully applied to the
//! coordinator before the next transcript is routed into the new person's
//! history — two independent tasks racing on the same coordinator state
//! cannot give that ordering guarantee. All three are torn down together on
//! disconnect via a shared cancellation token.

mod protocol;

pub use protocol::{InboundMessage, OutboundMessage};

use crate::agent::{mpsc_sender::NotifySender, SharedAgentClient, ToolContext};
use crate::asr::{AsrClient, Transcript};
use crate::coordinator::{InteractionCoordinator, SwitchNotification};
use crate::fanout::{ClientMailboxes, Fanout};
use crate::recognition::FaceEmbedder;
use crate::router::route_transcript;
use crate::store::Store;
use crate::types::{Message, PersonId, SwitchEvent};
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

type WsSink = futures_util::stream::SplitSink<WebSocket, WsMessage>;

/// Shared server-wide state handed to every connection handler.
pub struct ServerState<E: FaceEmbedder + 'static> {
    pub store: Store,
    pub agent: SharedAgentClient,
    pub fanout: Fanout,
    pub recognition: Arc<crate::recognition::RecognitionWorker<E>>,
    pub asr: Arc<dyn AsrClient>,
}

// Manual impl: every field is an `Arc`/`Clone` type independent of `E`, but
// `#[derive(Clone)]` would add a spurious `E: Clone` bound since `E` appears
// as a generic parameter of a field type.
impl<E: FaceEmbedder + 'static> Clone for ServerState<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            agent: self.agent.clone(),
            fanout: self.fanout.clone(),
            recognition: self.recognition.clone(),
            asr: self.asr.clone(),
        }
    }
}

/// Build the axum router exposing the WebSocket upgrade endpoint.
pub fn router<E: FaceEmbedder + 'static>(state: ServerState<E>) -> Router {
    Router::new()
        .route("/ws", get(upgrade_handler::<E>))
        .with_state(state)
}

async fn upgrade_handler<E: FaceEmbedder + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<ServerState<E>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        handle_connection(socket, state).await;
    })
}

async fn handle_connection<E: FaceEmbedder + 'static>(socket: WebSocket, state: ServerState<E>) {
    let client_id: PersonId = uuid::Uuid::new_v4().to_string();
    let cancel = CancellationToken::new();

    let mailboxes = ClientMailboxes::new();
    state.fanout.register(client_id.clone(), mailboxes.switches_tx);

    let (switch_notify_tx, switch_notify_rx) = tokio::sync::mpsc::unbounded_channel::<SwitchNotification>();
    let coordinator = Arc::new(InteractionCoordinator::new(
        state.store.clone(),
        Arc::clone(&state.agent),
        Arc::clone(&state.recognition),
        mailboxes.notifications_tx,
        switch_notify_tx,
    ));

    let (ws_sink, ws_stream) = socket.split();
    let ws_sink = Arc::new(Mutex::new(ws_sink));
    send_json(&ws_sink, &OutboundMessage::Connected {
        message: "connected".to_owned(),
    })
    .await;

    let (transcript_tx, transcript_rx) = tokio::sync::mpsc::unbounded_channel::<Transcript>();
    let asr_sender = match state.asr.connect(transcript_tx).await {
        Ok(sender) => Some(Arc::from(sender)),
        Err(e) => {
            tracing::warn!(error = %e, %client_id, "asr connect failed, audio will not be forwarded");
            None
        }
    };

    let mut tasks = tokio::task::JoinSet::new();

    // Notification-drain task.
    tasks.spawn(drain_notifications(mailboxes.notifications_rx, Arc::clone(&ws_sink), cancel.clone()));

    // Client-event task: SwitchEvents and finalized transcripts are both
    // drained here, in one task, so the ordering guarantee in §5 holds —
    // a switch is fully applied before the next transcript is routed.
    tasks.spawn(client_event_loop(
        mailboxes.switches_rx,
        transcript_rx,
        Arc::clone(&coordinator),
        switch_notify_rx,
        Arc::clone(&ws_sink),
        state.store.clone(),
        Arc::clone(&state.agent),
        client_id.clone(),
        cancel.clone(),
    ));

    // Audio-read task (also handles inbound text protocol messages).
    tasks.spawn(read_loop(
        ws_stream,
        Arc::clone(&ws_sink),
        coordinator,
        state.store.clone(),
        asr_sender,
        client_id.clone(),
        cancel.clone(),
    ));

    // Connection teardown: once any task ends (disconnect or error), cancel
    // the rest deterministically (§4.6). In-flight background summary tasks
    // spawned by the coordinator are intentionally not cancelled here — they
    // continue to completion per §5.
    tasks.join_next().await;
    cancel.cancel();
    while tasks.join_next().await.is_some() {}

    state.fanout.deregister(&client_id);
}

async fn drain_notifications(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<crate::fanout::Notification>,
    sink: Arc<Mutex<WsSink>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            maybe = rx.recv() => {
                let Some(notification) = maybe else { return };
                send_json(&sink, &OutboundMessage::Notification {
                    title: notification.title,
                    message: notification.message,
                }).await;
            }
        }
    }
}

/// One client's interleaved switch/transcript traffic: confirmed
/// `SwitchEvent`s broadcast from the fanout, finalized ASR transcripts, and
/// the `SwitchNotification`s the coordinator emits in response to the
/// former, all drained by the single task below.
#[allow(clippy::large_enum_variant)]
enum ClientEvent {
    Switch(SwitchEvent),
    Transcript(Transcript),
}

/// Drains `SwitchEvent`s and transcripts through the same task so the §5
/// ordering guarantee holds: a switch event is fully applied to the
/// coordinator before the next transcript is routed into the new person's
/// history. Also forwards the resulting `SwitchNotification`s to the client.
async fn client_event_loop<E: FaceEmbedder + 'static>(
    switch_events_rx: tokio::sync::mpsc::UnboundedReceiver<SwitchEvent>,
    transcript_rx: tokio::sync::mpsc::UnboundedReceiver<Transcript>,
    coordinator: Arc<InteractionCoordinator<E>>,
    mut notify_rx: tokio::sync::mpsc::UnboundedReceiver<SwitchNotification>,
    sink: Arc<Mutex<WsSink>>,
    store: Store,
    agent: SharedAgentClient,
    client_id: PersonId,
    cancel: CancellationToken,
) {
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel::<ClientEvent>();
    let forward_cancel = cancel.clone();
    let mut forwarders = tokio::task::JoinSet::new();
    forwarders.spawn(forward(switch_events_rx, events_tx.clone(), ClientEvent::Switch, forward_cancel.clone()));
    forwarders.spawn(forward(transcript_rx, events_tx, ClientEvent::Transcript, forward_cancel));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    ClientEvent::Switch(event) => coordinator.handle_switch(event).await,
                    ClientEvent::Transcript(transcript) => {
                        route_one_transcript(&coordinator, &store, &agent, &client_id, transcript).await;
                    }
                }
            }
            notification = notify_rx.recv() => {
                let Some(notification) = notification else { break };
                send_json(&sink, &OutboundMessage::SwitchInteractionPerson {
                    person_id: notification.person_id,
                    person_name: notification.person_name,
                    blurb: notification.blurb,
                    recap: notification.recap,
                }).await;
            }
        }
    }

    forwarders.shutdown().await;
}

/// Relay one source channel into the shared [`ClientEvent`] queue, tagging
/// each item on the way through.
async fn forward<T: Send + 'static>(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<T>,
    tx: tokio::sync::mpsc::UnboundedSender<ClientEvent>,
    wrap: fn(T) -> ClientEvent,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            maybe = rx.recv() => {
                let Some(item) = maybe else { return };
                if tx.send(wrap(item)).is_err() {
                    return;
                }
            }
        }
    }
}

/// Route one finalized transcript through the agent, seeding the call with
/// the coordinator's actual accumulated history (§4.5 step 2) and appending
/// whatever the turn produced back onto it.
async fn route_one_transcript<E: FaceEmbedder + 'static>(
    coordinator: &Arc<InteractionCoordinator<E>>,
    store: &Store,
    agent: &SharedAgentClient,
    client_id: &PersonId,
    transcript: Transcript,
) {
    let current_person_id = coordinator.current_person_id().await;
    let conversation_id = coordinator.conversation_id().await;
    let (notify_tx, _notify_rx) = tokio::sync::mpsc::unbounded_channel();
    let ctx = ToolContext {
        store: store.clone(),
        conversation_id,
        current_person_id: current_person_id.clone(),
        notify: NotifySender(notify_tx),
    };

    let mut pending: Vec<Message> = coordinator.history().await;
    let already_recorded = pending.len();
    let result = route_transcript(
        agent.as_ref(),
        &mut pending,
        current_person_id,
        transcript.text,
        transcript.at,
        &ctx,
    )
    .await;
    if let Err(e) = result {
        tracing::warn!(error = %e, %client_id, "agent turn failed");
    }
    for message in pending.into_iter().skip(already_recorded) {
        coordinator.append_message(message).await;
    }
}

async fn read_loop<E: FaceEmbedder + 'static>(
    mut stream: futures_util::stream::SplitStream<WebSocket>,
    sink: Arc<Mutex<WsSink>>,
    coordinator: Arc<InteractionCoordinator<E>>,
    store: Store,
    asr_sender: Option<Arc<dyn crate::asr::AsrSender>>,
    client_id: PersonId,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            frame = stream.next() => {
                let Some(Ok(frame)) = frame else { return };
                match frame {
                    WsMessage::Binary(pcm) => {
                        if let Some(sender) = &asr_sender
                            && let Err(e) = sender.send_audio(&pcm).await
                        {
                            tracing::warn!(error = %e, %client_id, "audio forward failed");
                        }
                    }
                    WsMessage::Text(text) => {
                        handle_text_message(&text, &sink, &coordinator, &store).await;
                    }
                    WsMessage::Close(_) => return,
                    _ => {}
                }
            }
        }
    }
}

async fn handle_text_message<E: FaceEmbedder + 'static>(
    text: &str,
    sink: &Arc<Mutex<WsSink>>,
    coordinator: &Arc<InteractionCoordinator<E>>,
    store: &Store,
) {
    let inbound: InboundMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            send_json(sink, &OutboundMessage::Error { message: e.to_string() }).await;
            return;
        }
    };

    match inbound {
        InboundMessage::Ping => {
            send_json(sink, &OutboundMessage::Pong).await;
        }
        InboundMessage::SetInteractionId { interaction_id } => {
            coordinator.set_conversation_id(interaction_id).await;
        }
        InboundMessage::ChangeName { new_name, person_name } => {
            let current = coordinator.current_person_id().await;
            let success = rename_person(store, current, person_name, &new_name);
            send_json(sink, &OutboundMessage::ChangeNameResponse { success }).await;
        }
    }
}

/// Rename by the currently-bound person id (preferred), falling back to
/// matching by stored name (§6 `change_name`).
fn rename_person(store: &Store, current: Option<PersonId>, fallback_name: Option<String>, new_name: &str) -> bool {
    if let Some(person_id) = current
        && store.set_name(&person_id, new_name).unwrap_or(false)
    {
        return true;
    }
    if let Some(existing_name) = fallback_name {
        return store
            .set_name_by_existing_name(&existing_name, new_name)
            .unwrap_or(false);
    }
    false
}

async fn send_json(sink: &Arc<Mutex<WsSink>>, message: &OutboundMessage) {
    let Ok(text) = serde_json::to_string(message) else {
        return;
    };
    let mut guard = sink.lock().await;
    let _ = guard.send(WsMessage::Text(text.into())).await;
}
