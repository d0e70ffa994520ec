//! Cloud ASR client: the ASR service is an external collaborator (§1) that
//! "emits finalized transcription strings with timestamps." This module
//! owns the one part of that boundary the core implements — the outbound
//! WebSocket connection audio is forwarded over, and the inbound stream of
//! finalized transcripts that feeds the Transcript Router.

use crate::config::AsrConfig;
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

/// A finalized transcript from the ASR service.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct AsrFrame {
    text: String,
    #[serde(default)]
    at: Option<DateTime<Utc>>,
}

/// A live connection's audio-send half.
#[async_trait]
pub trait AsrSender: Send + Sync {
    async fn send_audio(&self, pcm: &[u8]) -> Result<()>;
}

/// Connects to the cloud ASR endpoint, forwards audio, and yields
/// finalized transcripts on `on_transcript` until the connection closes.
#[async_trait]
pub trait AsrClient: Send + Sync {
    async fn connect(
        &self,
        on_transcript: mpsc::UnboundedSender<Transcript>,
    ) -> Result<Box<dyn AsrSender>>;
}

pub struct WsAsrClient {
    config: AsrConfig,
}

impl WsAsrClient {
    pub fn new(config: AsrConfig) -> Self {
        Self { config }
    }
}

struct TungsteniteAsrSender {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl AsrSender for TungsteniteAsrSender {
    async fn send_audio(&self, pcm: &[u8]) -> Result<()> {
        self.tx
            .send(pcm.to_vec())
            .map_err(|e| OrchestratorError::Ws(format!("asr sender closed: {e}")))
    }
}

#[async_trait]
impl AsrClient for WsAsrClient {
    async fn connect(
        &self,
        on_transcript: mpsc::UnboundedSender<Transcript>,
    ) -> Result<Box<dyn AsrSender>> {
        let (stream, _response) = tokio_tungstenite::connect_async(&self.config.endpoint)
            .await
            .map_err(|e| OrchestratorError::Ws(format!("asr connect failed: {e}")))?;
        let (mut sink, mut source) = stream.split();

        let (audio_tx, mut audio_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::spawn(async move {
            while let Some(pcm) = audio_rx.recv().await {
                if sink.send(TungsteniteMessage::Binary(pcm.into())).await.is_err() {
                    return;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(Ok(message)) = source.next().await {
                let TungsteniteMessage::Text(text) = message else {
                    continue;
                };
                if let Ok(frame) = serde_json::from_str::<AsrFrame>(&text) {
                    let transcript = Transcript {
                        text: frame.text,
                        at: frame.at.unwrap_or_else(Utc::now),
                    };
                    if on_transcript.send(transcript).is_err() {
                        return;
                    }
                }
            }
        });

        Ok(Box::new(TungsteniteAsrSender { tx: audio_tx }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asr_frame_parses_minimal_json() {
        let frame: AsrFrame = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(frame.text, "hello");
        assert!(frame.at.is_none());
    }
}
