//! Robot-side WebRTC video sender
//!
//! This crate streams H.264 video from a robot to remote viewers. Signaling
//! rides on a pub/sub broker under `<namespace>/robot-control/<peerId>/...`
//! topics; media goes out over a per-peer WebRTC connection.
//!
//! # Features
//!
//! - **Broker signaling**: offer/answer and ICE exchange over topic routing
//! - **Single-streamer policy**: a new viewer supersedes the active session
//! - **Annex-B handling**: NAL extraction with emulation prevention
//! - **Fixed-cadence pump**: loops the source, cancellable within one tick
//! - **Pluggable engine**: mock backend by default, native WebRTC behind the
//!   `webrtc-engine` feature
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Broker (WebSocket pub/sub)                          │
//! │  ↓ offers / candidates        ↑ answers / candidates │
//! │  BrokerClient ──→ StreamServer (event loop)          │
//! │                    ├─ router (topic → peer message)  │
//! │                    └─ SessionManager                 │
//! │                        └─ PeerSession                │
//! │                            ├─ MediaEngine            │
//! │                            └─ PumpHandle             │
//! │                                └─ MediaSource → NALs │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use robocast::{BrokerClient, StreamConfig, StreamServer};
//! use robocast::signaling::protocol::topics;
//!
//! let config = StreamConfig::default();
//! let filters = vec![
//!     topics::offer_filter(&config.namespace),
//!     topics::candidate_filter(&config.namespace),
//! ];
//!
//! let mut client = BrokerClient::new(&config.broker_url, filters);
//! let inbound = client.connect().await?;
//!
//! let mut server = StreamServer::new(config, client.publisher(), inbound);
//! server.run().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod nal;
pub mod server;
pub mod session;
pub mod signaling;
pub mod stream;

pub use config::{EngineKind, StreamConfig};
pub use error::{Error, Result};
pub use server::StreamServer;
pub use session::{PeerSession, SessionManager, SessionState};
pub use signaling::{BrokerClient, SignalPublisher};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
