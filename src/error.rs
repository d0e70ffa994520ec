//! Error types for the interaction orchestration core.

/// Top-level error type shared across every pipeline component.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Frame ingest framing or socket error.
    #[error("frame ingest error: {0}")]
    Frame(String),

    /// Recognition worker error (decode, embedding, gallery lookup).
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Persistent store error.
    #[error("store error: {0}")]
    Store(String),

    /// Agent / LLM invocation error.
    #[error("agent error: {0}")]
    Agent(String),

    /// Client fanout delivery error.
    #[error("fanout error: {0}")]
    Fanout(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket protocol error.
    #[error("websocket error: {0}")]
    Ws(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
