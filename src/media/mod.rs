//! Media backends and sources
//!
//! The session drives a high-level engine API; ICE/DTLS/SRTP live behind it.
//! A mock engine and the real WebRTC engine satisfy the same trait, selected
//! at construction time from configuration.

pub mod engine;
pub mod source;

#[cfg(feature = "webrtc-engine")]
pub mod webrtc;

pub use engine::{
    build_engine, ConnState, EngineEvent, EngineEventSender, MediaEngine, MockEngine, TrackSink,
};
pub use source::{resolve_source, MediaSource};
