//! Main server binary: wires the six components in the construction order
//! fixed by §9 — store → recognition worker → switch detector (broadcast
//! channel) → per-client coordinators — and serves the client WebSocket.

use std::sync::Arc;
use std::time::Duration;
use vxl_core::agent::HttpAgentClient;
use vxl_core::asr::WsAsrClient;
use vxl_core::config::CoreConfig;
use vxl_core::fanout::Fanout;
use vxl_core::frame_ingest::{self, FrameQueue};
use vxl_core::recognition::{FaceEmbedder, RecognitionWorker};
use vxl_core::store::Store;
use vxl_core::switch_detector::SwitchDetector;
use vxl_core::types::Embedding;
use vxl_core::ws::{self, ServerState};

/// Decode-only stand-in for the face-embedding model, which is an external
/// collaborator referenced only by interface (§1). Always reports "no
/// face" — a real deployment plugs in a model-backed [`FaceEmbedder`] here.
struct UnconfiguredEmbedder;

impl FaceEmbedder for UnconfiguredEmbedder {
    fn embed(&self, jpeg: &[u8]) -> Option<(Embedding, f32)> {
        if image::load_from_memory(jpeg).is_err() {
            tracing::debug!("frame failed to decode as JPEG");
        }
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vxl_core=info")),
        )
        .init();

    let config = CoreConfig::load_or_default()?;
    tracing::info!("vxl-core starting");

    let store = Store::open(&config.store)?;
    let recognition = Arc::new(RecognitionWorker::new(
        config.recognition.clone(),
        store.clone(),
        UnconfiguredEmbedder,
    ));
    let fanout = Fanout::new();

    let api_key = config.agent.api_key.resolve()?;
    let agent: Arc<dyn vxl_core::agent::AgentClient> = Arc::new(HttpAgentClient::new(
        config.agent.endpoint.clone(),
        api_key,
        config.agent.model.clone(),
        Duration::from_secs(config.agent.recap_timeout_secs),
    ));

    let asr: Arc<dyn vxl_core::asr::AsrClient> = Arc::new(WsAsrClient::new(config.asr.clone()));

    let queue = Arc::new(FrameQueue::new(config.frame_ingest.queue_capacity));
    tokio::spawn(frame_ingest::run(config.frame_ingest.clone(), Arc::clone(&queue)));
    tokio::spawn(recognition_and_switch_loop(
        Arc::clone(&queue),
        Arc::clone(&recognition),
        config.switch_detector.clone(),
        fanout.clone(),
    ));

    let state = ServerState {
        store,
        agent,
        fanout,
        recognition,
        asr,
    };
    let app = ws::router(state);

    let listener = tokio::net::TcpListener::bind(&config.websocket.bind_addr).await?;
    tracing::info!(addr = %config.websocket.bind_addr, "websocket server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// The process-wide Recognition Worker and Switch Detector: a pure
/// consumer of the frame queue that broadcasts [`SwitchEvent`]s to every
/// registered client (§5, three long-lived process-wide workers).
async fn recognition_and_switch_loop<E: FaceEmbedder + 'static>(
    queue: Arc<FrameQueue>,
    recognition: Arc<RecognitionWorker<E>>,
    switch_config: vxl_core::config::SwitchDetectorConfig,
    fanout: Fanout,
) {
    let mut detector = SwitchDetector::new(switch_config);
    loop {
        let frame = queue.get().await;
        let observation = recognition.process_frame(&frame.jpeg).await;
        if let Some(event) = detector.observe(observation.person_id, observation.timestamp) {
            tracing::info!(from = ?event.from, to = ?event.to, "switch event");
            fanout.broadcast(event);
        }
    }
}
