//! Component F: Client Fanout.
//!
//! Delivers [`SwitchEvent`]s and agent-emitted notifications to every
//! connected client via per-client async mailboxes, isolating slow
//! consumers from one another (§4.6).

use crate::types::{PersonId, SwitchEvent};
use tokio::sync::mpsc;

/// A notification pushed to the client by an agent tool (notification,
/// update-name) via the side-channel callback described in §4.5.
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

/// One client's pair of unbounded, independently-drained mailboxes.
pub struct ClientMailboxes {
    pub notifications_tx: mpsc::UnboundedSender<Notification>,
    pub notifications_rx: mpsc::UnboundedReceiver<Notification>,
    pub switches_tx: mpsc::UnboundedSender<SwitchEvent>,
    pub switches_rx: mpsc::UnboundedReceiver<SwitchEvent>,
}

impl ClientMailboxes {
    pub fn new() -> Self {
        let (notifications_tx, notifications_rx) = mpsc::unbounded_channel();
        let (switches_tx, switches_rx) = mpsc::unbounded_channel();
        Self {
            notifications_tx,
            notifications_rx,
            switches_tx,
            switches_rx,
        }
    }
}

impl Default for ClientMailboxes {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of every connected client's switch-event sender, so the one
/// process-wide Recognition/Switch pipeline can broadcast without coupling
/// to any single client's liveness.
#[derive(Clone, Default)]
pub struct Fanout {
    clients: std::sync::Arc<std::sync::Mutex<Vec<(PersonId, mpsc::UnboundedSender<SwitchEvent>)>>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client's switch mailbox under a unique client id.
    pub fn register(&self, client_id: PersonId, tx: mpsc::UnboundedSender<SwitchEvent>) {
        self.clients
            .lock()
            .expect("fanout lock poisoned")
            .push((client_id, tx));
    }

    /// Deregister a disconnected client (deterministic teardown, §4.6).
    pub fn deregister(&self, client_id: &PersonId) {
        self.clients
            .lock()
            .expect("fanout lock poisoned")
            .retain(|(id, _)| id != client_id);
    }

    /// Broadcast a switch event to every registered client. A full or
    /// closed mailbox for one client never blocks delivery to another.
    pub fn broadcast(&self, event: SwitchEvent) {
        let clients = self.clients.lock().expect("fanout lock poisoned");
        for (client_id, tx) in clients.iter() {
            if tx.send(event.clone()).is_err() {
                tracing::debug!(%client_id, "dropping switch event for disconnected client");
            }
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().expect("fanout lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event() -> SwitchEvent {
        SwitchEvent {
            from: None,
            to: Some("Unnamed_aaaaaaaa".to_owned()),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_client() {
        let fanout = Fanout::new();
        let mut boxes_a = ClientMailboxes::new();
        let mut boxes_b = ClientMailboxes::new();
        fanout.register("a".to_owned(), boxes_a.switches_tx.clone());
        fanout.register("b".to_owned(), boxes_b.switches_tx.clone());

        fanout.broadcast(event());

        assert!(boxes_a.switches_rx.try_recv().is_ok());
        assert!(boxes_b.switches_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dropped_client_does_not_block_others() {
        let fanout = Fanout::new();
        let boxes_a = ClientMailboxes::new();
        let mut boxes_b = ClientMailboxes::new();
        fanout.register("a".to_owned(), boxes_a.switches_tx.clone());
        fanout.register("b".to_owned(), boxes_b.switches_tx.clone());
        drop(boxes_a);

        fanout.broadcast(event());
        assert!(boxes_b.switches_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn deregister_removes_client_from_future_broadcasts() {
        let fanout = Fanout::new();
        let boxes = ClientMailboxes::new();
        fanout.register("a".to_owned(), boxes.switches_tx.clone());
        fanout.deregister(&"a".to_owned());
        assert_eq!(fanout.client_count(), 0);
    }
}
