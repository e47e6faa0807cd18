//! Configuration types for the streaming bridge

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Media engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Real WebRTC engine (requires the `webrtc-engine` cargo feature)
    WebRtc,
    /// No-op engine for development and tests
    Mock,
}

/// Main configuration for the streaming bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Signaling broker WebSocket URL (ws:// or wss://)
    pub broker_url: String,

    /// Topic namespace, i.e. the thing name prefixing every topic
    pub namespace: String,

    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// Explicit H.264 elementary stream file (preferred media source)
    pub media_file: Option<PathBuf>,

    /// Directory scanned for sequentially named stream files (fallback)
    pub media_dir: Option<PathBuf>,

    /// Media engine to construct per session
    pub engine: EngineKind,

    /// File-sourced pacing in frames per second (default: 30)
    pub file_fps: u32,

    /// Fallback-path pacing in frames per second (default: 20)
    pub fallback_fps: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            broker_url: "ws://localhost:9001".to_string(),
            namespace: "robocast".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            media_file: None,
            media_dir: None,
            engine: EngineKind::Mock,
            file_fps: 30,
            fallback_fps: 20,
        }
    }
}

impl StreamConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `broker_url` is not a WebSocket URL
    /// - `namespace` is empty or contains `/` or `+`
    /// - `stun_servers` is empty
    /// - either framerate is 0 or above 240
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.broker_url.starts_with("ws://") && !self.broker_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "broker_url must start with ws:// or wss://, got {}",
                self.broker_url
            )));
        }

        if self.namespace.is_empty() {
            return Err(Error::InvalidConfig(
                "namespace must not be empty".to_string(),
            ));
        }

        // The namespace is a single topic segment; separators or wildcards
        // in it would corrupt every derived topic.
        if self.namespace.contains('/') || self.namespace.contains('+') {
            return Err(Error::InvalidConfig(format!(
                "namespace must not contain '/' or '+', got {}",
                self.namespace
            )));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        // Above 240 fps the millisecond tick truncates toward zero and the
        // pump would spin unpaced.
        for (name, fps) in [("file_fps", self.file_fps), ("fallback_fps", self.fallback_fps)] {
            if fps == 0 || fps > 240 {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be between 1 and 240, got {fps}"
                )));
            }
        }

        Ok(())
    }

    /// Inter-unit delay for file-sourced NAL units
    pub fn file_tick(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.file_fps))
    }

    /// Inter-unit delay for the fallback paths
    pub fn fallback_tick(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fallback_fps))
    }
}
