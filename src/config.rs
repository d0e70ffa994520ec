//! Configuration types for the interaction orchestration core.

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the orchestration core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Frame Ingest (component A) settings.
    pub frame_ingest: FrameIngestConfig,
    /// Recognition Worker (component B) settings.
    pub recognition: RecognitionConfig,
    /// Switch Detector (component C) settings.
    pub switch_detector: SwitchDetectorConfig,
    /// Persistent store settings.
    pub store: StoreConfig,
    /// Agent / LLM settings.
    pub agent: AgentConfig,
    /// Cloud ASR settings.
    pub asr: AsrConfig,
    /// WebSocket server settings.
    pub websocket: WebSocketConfig,
}

impl CoreConfig {
    /// Load configuration from a TOML file, falling back to defaults section
    /// by section (`#[serde(default)]`) for anything the file omits.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| OrchestratorError::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&text)
            .map_err(|e| OrchestratorError::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Resolve the config path: `VXL_CONFIG` env var override, else
    /// `<config_dir>/vxl-core/config.toml`.
    pub fn default_path() -> PathBuf {
        if let Some(over) = std::env::var_os("VXL_CONFIG") {
            return PathBuf::from(over);
        }
        dirs::config_dir()
            .map(|d| d.join("vxl-core").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("vxl-core.toml"))
    }

    /// Load from [`Self::default_path`], returning defaults if the file is
    /// absent (first run).
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Frame Ingest (§4.1): TCP reader for length-prefixed JPEG frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameIngestConfig {
    /// Address the frame TCP socket accepts on.
    pub bind_addr: String,
    /// Accept timeout before the ingest gives up waiting for a camera to connect.
    pub accept_timeout_secs: u64,
    /// Per-read timeout on the frame socket.
    pub read_timeout_secs: u64,
    /// Consecutive framing/read errors tolerated before the ingest loop dies.
    pub max_consecutive_errors: u32,
    /// Maximum accepted JPEG payload size in bytes.
    pub max_payload_bytes: usize,
    /// Capacity of the bounded drop-oldest queue feeding the Recognition Worker.
    pub queue_capacity: usize,
}

impl Default for FrameIngestConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9400".to_owned(),
            accept_timeout_secs: 10,
            read_timeout_secs: 5,
            max_consecutive_errors: 10,
            max_payload_bytes: 5 * 1024 * 1024,
            queue_capacity: 2,
        }
    }
}

/// Recognition Worker (§4.2) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Minimum face-detection confidence to consider a face present.
    pub detection_floor: f32,
    /// Minimum cosine similarity for a gallery match.
    ///
    /// The source mixed two thresholds (0.2 and 0.45) across files; the
    /// WebSocket path's lower value is the one the spec adopts, exposed here
    /// as a tunable rather than assumed load-bearing.
    pub match_threshold: f32,
    /// TTL for the in-memory gallery cache.
    pub gallery_cache_ttl_secs: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            detection_floor: 0.5,
            match_threshold: 0.2,
            gallery_cache_ttl_secs: 5,
        }
    }
}

/// Switch Detector (§4.3) settings: bounds for the FPS-adaptive window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchDetectorConfig {
    /// Minimum window size `N`.
    pub min_window: usize,
    /// Maximum window size `N`.
    pub max_window: usize,
    /// Default FPS assumed until at least two frame timestamps are observed.
    pub default_fps: f32,
    /// Number of recent frame timestamps kept for the FPS estimate.
    pub fps_sample_size: usize,
}

impl Default for SwitchDetectorConfig {
    fn default() -> Self {
        Self {
            min_window: 5,
            max_window: 30,
            default_fps: 10.0,
            fps_sample_size: 30,
        }
    }
}

/// Persistent store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Minimum pool size (always opened eagerly).
    pub min_connections: u32,
    /// Maximum concurrent pool connections.
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("vxl-core.db"),
            min_connections: 1,
            max_connections: 5,
        }
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(over) = std::env::var_os("VXL_DATA_DIR") {
        return PathBuf::from(over);
    }
    dirs::data_dir()
        .map(|d| d.join("vxl-core"))
        .unwrap_or_else(|| PathBuf::from("/tmp/vxl-core-data"))
}

/// Agent / LLM settings (§4.4, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the agent/LLM HTTP endpoint.
    pub endpoint: String,
    /// API key reference (never an inline secret written back to disk).
    pub api_key: SecretRef,
    /// Timeout for recap synthesis (§4.4 step 4).
    pub recap_timeout_secs: u64,
    /// Model identifier passed to the agent endpoint.
    pub model: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8090".to_owned(),
            api_key: SecretRef::None,
            recap_timeout_secs: 30,
            model: "default".to_owned(),
        }
    }
}

/// Cloud ASR settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    /// WebSocket URL of the cloud ASR endpoint audio is forwarded to.
    pub endpoint: String,
    /// Expected input sample rate in Hz (16 kHz mono PCM per §6).
    pub sample_rate: u32,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://localhost:8091/asr".to_owned(),
            sample_rate: 16_000,
        }
    }
}

/// WebSocket server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Address the client-facing WebSocket server binds to.
    pub bind_addr: String,
    /// Accept timeout for a new connection handshake.
    pub accept_timeout_secs: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9401".to_owned(),
            accept_timeout_secs: 10,
        }
    }
}

/// A reference to a secret value, resolved at startup rather than stored.
///
/// Mirrors the shape of external profile secret references in comparable
/// speech-pipeline codebases: a config file should never contain a literal
/// API key unless the operator explicitly opts in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecretRef {
    /// No credential configured.
    #[default]
    None,
    /// Inline literal value (discouraged; prefer `env`).
    Literal { value: String },
    /// Resolve from an environment variable.
    Env { var: String },
    /// Resolve by running a local command and taking trimmed stdout.
    Command { cmd: String },
}

impl SecretRef {
    /// Resolve the secret's current value, if any.
    pub fn resolve(&self) -> Result<Option<String>> {
        match self {
            Self::None => Ok(None),
            Self::Literal { value } => Ok(Some(value.clone())),
            Self::Env { var } => match std::env::var(var) {
                Ok(v) if !v.trim().is_empty() => Ok(Some(v)),
                Ok(_) => Err(OrchestratorError::Config(format!(
                    "secret env var is empty: {var}"
                ))),
                Err(_) => Err(OrchestratorError::Config(format!(
                    "secret env var is missing: {var}"
                ))),
            },
            Self::Command { cmd } => {
                if cmd.trim().is_empty() {
                    return Err(OrchestratorError::Config(
                        "secret command is empty".to_owned(),
                    ));
                }
                let output = std::process::Command::new("/bin/sh")
                    .arg("-lc")
                    .arg(cmd)
                    .output()
                    .map_err(|e| {
                        OrchestratorError::Config(format!("running secret command: {e}"))
                    })?;
                if !output.status.success() {
                    return Err(OrchestratorError::Config(format!(
                        "secret command exited with {}",
                        output.status
                    )));
                }
                let text = String::from_utf8_lossy(&output.stdout).trim().to_owned();
                if text.is_empty() {
                    return Err(OrchestratorError::Config(
                        "secret command produced no output".to_owned(),
                    ));
                }
                Ok(Some(text))
            }
        }
    }
}
