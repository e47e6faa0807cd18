//! Error types for the streaming bridge

/// Result type alias using the crate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while routing signaling and streaming media
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed topic, payload JSON, or offer envelope
    #[error("Parse error: {0}")]
    Parse(String),

    /// Structurally invalid SDP
    #[error("SDP parse error: {0}")]
    SdpParse(String),

    /// Answer creation or local-description failure
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// Broker publish/subscribe failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Media source missing or unreadable
    #[error("Media source error: {0}")]
    MediaSource(String),

    /// Failed to send a unit on the outbound track
    #[error("Stream send error: {0}")]
    StreamSend(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
