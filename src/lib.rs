//! Interaction orchestration core for AR glasses.
//!
//! Maintains, for every connected client, a conversational context bound to
//! a physically-present person: a JPEG frame stream drives person
//! identification and switch detection, while an independent transcript
//! pipeline routes finalized speech through an LLM agent.
//!
//! # Architecture
//!
//! Six cooperating components, wired construction-order store → recognition
//! worker → switch detector → per-client coordinators (§9):
//! - [`frame_ingest`]: reads length-prefixed JPEG frames off a TCP socket
//! - [`recognition`]: matches frames against a cached gallery of embeddings
//! - [`switch_detector`]: smooths noisy per-frame observations into switches
//! - [`coordinator`]: owns each client's conversation state
//! - [`router`]: routes finalized transcripts through the agent
//! - [`fanout`]: delivers switch events to every connected client

pub mod agent;
pub mod asr;
pub mod config;
pub mod coordinator;
pub mod embedding;
pub mod error;
pub mod fanout;
pub mod frame_ingest;
pub mod recognition;
pub mod router;
pub mod store;
pub mod switch_detector;
pub mod types;
pub mod ws;

pub use config::CoreConfig;
pub use error::{OrchestratorError, Result};
