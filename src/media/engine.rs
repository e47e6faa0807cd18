//! Media engine trait, engine events, and the mock backend

use crate::config::{EngineKind, StreamConfig};
use crate::session::PeerId;
use crate::signaling::protocol::IceCandidate;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

/// High-level connection state reported by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Negotiation or ICE checks in progress
    Connecting,
    /// Peer connection established
    Connected,
    /// Transient connectivity loss; may recover
    Disconnected,
    /// Peer connection failed permanently
    Failed,
    /// Peer connection closed
    Closed,
}

/// Events an engine emits toward the server loop
///
/// All session mutation happens where these are consumed, so vendor callback
/// threads never touch session state directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A local ICE candidate was gathered
    LocalCandidate(IceCandidate),
    /// Local ICE gathering reached "complete"
    GatheringComplete,
    /// Peer connection state changed
    Connection(ConnState),
    /// The outbound media track is ready to accept samples
    TrackReady,
}

/// Channel on which engines report events, tagged with the owning peer
pub type EngineEventSender = mpsc::UnboundedSender<(PeerId, EngineEvent)>;

/// Outbound media track: "send bytes on track"
#[async_trait]
pub trait TrackSink: Send + Sync {
    /// Send one NAL unit with its display duration
    async fn send(&self, unit: Bytes, duration: Duration) -> Result<()>;
}

/// High-level WebRTC session API consumed by a peer session
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Apply the remote SDP offer
    async fn set_remote_description(&self, sdp: &str) -> Result<()>;

    /// Create the answer and set it as the local description
    ///
    /// Asynchronous: the underlying engine may suspend while negotiating
    /// codecs. Returns the answer SDP to publish.
    async fn create_answer(&self) -> Result<String>;

    /// Apply a remote ICE candidate; tolerated in any order
    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    /// The outbound media track for the streaming pump
    fn track(&self) -> Arc<dyn TrackSink>;

    /// Release the underlying peer connection
    async fn close(&self) -> Result<()>;

    /// Escape hatch to the concrete engine type
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Build the engine selected by configuration
pub async fn build_engine(
    peer_id: &str,
    config: &StreamConfig,
    events: EngineEventSender,
) -> Result<Arc<dyn MediaEngine>> {
    match config.engine {
        EngineKind::Mock => Ok(Arc::new(MockEngine::new(peer_id, events))),
        #[cfg(feature = "webrtc-engine")]
        EngineKind::WebRtc => Ok(Arc::new(
            crate::media::webrtc::WebRtcEngine::new(peer_id, config, events).await?,
        )),
        #[cfg(not(feature = "webrtc-engine"))]
        EngineKind::WebRtc => Err(Error::InvalidConfig(
            "webrtc engine requested but the webrtc-engine feature is not enabled".to_string(),
        )),
    }
}

/// Track sink that records every unit it is handed
pub struct MockTrackSink {
    units: Mutex<Vec<Bytes>>,
    sent: AtomicUsize,
}

impl MockTrackSink {
    fn new() -> Self {
        Self {
            units: Mutex::new(Vec::new()),
            sent: AtomicUsize::new(0),
        }
    }

    /// Number of units sent so far
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    /// Copies of all sent units
    pub async fn sent_units(&self) -> Vec<Bytes> {
        self.units.lock().await.clone()
    }
}

#[async_trait]
impl TrackSink for MockTrackSink {
    async fn send(&self, unit: Bytes, _duration: Duration) -> Result<()> {
        self.units.lock().await.push(unit);
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// No-op media backend
///
/// Validates SDP shape, answers with a canned description, and immediately
/// walks the happy path: host candidate, gathering complete, connected,
/// track ready. Lets the whole pipeline run without native WebRTC.
pub struct MockEngine {
    peer_id: PeerId,
    events: EngineEventSender,
    sink: Arc<MockTrackSink>,
    closed: AtomicBool,
    remote_candidates: AtomicUsize,
}

impl MockEngine {
    /// Create a mock engine for a peer
    pub fn new(peer_id: &str, events: EngineEventSender) -> Self {
        info!(peer_id, "mock media engine created");

        Self {
            peer_id: peer_id.to_string(),
            events,
            sink: Arc::new(MockTrackSink::new()),
            closed: AtomicBool::new(false),
            remote_candidates: AtomicUsize::new(0),
        }
    }

    /// The recording sink, for inspection in tests
    pub fn mock_sink(&self) -> Arc<MockTrackSink> {
        self.sink.clone()
    }

    /// Remote candidates applied so far
    pub fn remote_candidate_count(&self) -> usize {
        self.remote_candidates.load(Ordering::SeqCst)
    }

    fn emit(&self, event: EngineEvent) {
        // The receiver may already be gone during shutdown.
        let _ = self.events.send((self.peer_id.clone(), event));
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn set_remote_description(&self, sdp: &str) -> Result<()> {
        if !sdp.starts_with("v=") {
            return Err(Error::SdpParse(
                "offer does not start with a version line".to_string(),
            ));
        }
        debug!(peer_id = %self.peer_id, "mock remote description set");
        Ok(())
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = format!(
            "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n",
            uuid::Uuid::new_v4().as_u128() & 0xFFFF_FFFF
        );

        self.emit(EngineEvent::LocalCandidate(IceCandidate {
            candidate: "candidate:1 1 udp 2130706431 127.0.0.1 5000 typ host".to_string(),
            sdp_mid: "0".to_string(),
            sdp_mline_index: 0,
        }));
        self.emit(EngineEvent::GatheringComplete);
        self.emit(EngineEvent::Connection(ConnState::Connected));
        self.emit(EngineEvent::TrackReady);

        Ok(answer)
    }

    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        debug!(
            peer_id = %self.peer_id,
            candidate = %candidate.candidate,
            "mock remote candidate applied"
        );
        self.remote_candidates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn track(&self) -> Arc<dyn TrackSink> {
        self.sink.clone()
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(peer_id = %self.peer_id, "mock media engine closed");
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
