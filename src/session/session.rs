//! A single peer's negotiation and streaming lifecycle

use crate::config::StreamConfig;
use crate::media::{resolve_source, ConnState, EngineEvent, MediaEngine};
use crate::session::PeerId;
use crate::signaling::protocol::{topics, IceCandidate};
use crate::signaling::SignalPublisher;
use crate::stream::PumpHandle;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Lifecycle of a peer session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no remote description yet
    New,
    /// Remote offer applied
    HaveRemoteOffer,
    /// Answer created and set locally
    AnswerCreated,
    /// Peer connection established
    Connected,
    /// Transient connectivity loss
    Disconnected,
    /// Peer connection failed
    Failed,
    /// Session torn down
    Closed,
}

/// One remote viewer: engine, candidate buffer, and streaming pump
///
/// Candidates are buffered until gathering completes and published as a
/// single batch, and never before the answer has gone out.
pub struct PeerSession {
    peer_id: PeerId,
    config: StreamConfig,
    state: RwLock<SessionState>,
    engine: Arc<dyn MediaEngine>,
    publisher: Arc<dyn SignalPublisher>,
    local_candidates: Mutex<Vec<IceCandidate>>,
    answer_published: AtomicBool,
    flush_pending: AtomicBool,
    pump: Mutex<Option<PumpHandle>>,
    pump_started: AtomicBool,
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

impl PeerSession {
    /// Create a session in the `New` state
    pub fn new(
        peer_id: &str,
        config: StreamConfig,
        engine: Arc<dyn MediaEngine>,
        publisher: Arc<dyn SignalPublisher>,
    ) -> Self {
        info!(peer_id, "session created");

        Self {
            peer_id: peer_id.to_string(),
            config,
            state: RwLock::new(SessionState::New),
            engine,
            publisher,
            local_candidates: Mutex::new(Vec::new()),
            answer_published: AtomicBool::new(false),
            flush_pending: AtomicBool::new(false),
            pump: Mutex::new(None),
            pump_started: AtomicBool::new(false),
        }
    }

    /// The peer this session belongs to
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// The session's media engine, for in-crate inspection
    pub(crate) fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.engine
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    async fn set_state(&self, next: SessionState) {
        let mut state = self.state.write().await;
        if *state != next {
            debug!(peer_id = %self.peer_id, from = ?*state, to = ?next, "session state changed");
            *state = next;
        }
    }

    /// Apply the remote offer SDP
    pub async fn apply_remote_offer(&self, sdp: &str) -> Result<()> {
        if !sdp.trim_start().starts_with("v=") {
            return Err(Error::SdpParse(
                "offer does not start with a version line".to_string(),
            ));
        }

        self.engine.set_remote_description(sdp).await?;
        self.set_state(SessionState::HaveRemoteOffer).await;
        Ok(())
    }

    /// Create the answer and publish it on the peer's answer topic
    ///
    /// Answer creation failure is terminal for the session. A publish failure
    /// is only logged: the broker may redeliver the offer and the remote side
    /// will retry.
    pub async fn negotiate(&self) -> Result<()> {
        if self.state().await == SessionState::Closed {
            debug!(peer_id = %self.peer_id, "skipping negotiation on closed session");
            return Ok(());
        }

        let answer = match self.engine.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                self.set_state(SessionState::Failed).await;
                return Err(e);
            }
        };

        let topic = topics::answer(&self.config.namespace, &self.peer_id);
        if let Err(e) = self.publisher.publish(&topic, answer).await {
            warn!(peer_id = %self.peer_id, error = %e, "answer publish failed");
        } else {
            info!(peer_id = %self.peer_id, topic, "answer published");
        }
        self.set_state(SessionState::AnswerCreated).await;

        self.answer_published.store(true, Ordering::SeqCst);
        if self.flush_pending.swap(false, Ordering::SeqCst) {
            self.flush_local_candidates().await;
        }

        Ok(())
    }

    /// Handle an event reported by the media engine
    pub async fn on_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::LocalCandidate(candidate) => {
                debug!(peer_id = %self.peer_id, candidate = %candidate.candidate, "local candidate gathered");
                self.local_candidates.lock().await.push(candidate);
            }
            EngineEvent::GatheringComplete => {
                // Mark pending first, then flush only if the answer is out.
                // Whichever of this and `negotiate` observes both conditions
                // wins the swap, so the flush is neither lost nor doubled.
                self.flush_pending.store(true, Ordering::SeqCst);
                if self.answer_published.load(Ordering::SeqCst)
                    && self.flush_pending.swap(false, Ordering::SeqCst)
                {
                    self.flush_local_candidates().await;
                }
            }
            EngineEvent::Connection(conn) => self.on_connection_state(conn).await,
            EngineEvent::TrackReady => self.maybe_start_pump().await,
        }
    }

    async fn on_connection_state(&self, conn: ConnState) {
        match conn {
            ConnState::Connecting => {}
            ConnState::Connected => {
                self.set_state(SessionState::Connected).await;
                self.maybe_start_pump().await;
            }
            ConnState::Disconnected => {
                // Transient; the pump keeps running and the state recovers
                // if the connection comes back.
                self.set_state(SessionState::Disconnected).await;
            }
            ConnState::Failed => {
                warn!(peer_id = %self.peer_id, "peer connection failed");
                self.set_state(SessionState::Failed).await;
                self.stop_pump().await;
            }
            ConnState::Closed => {
                self.set_state(SessionState::Closed).await;
                self.stop_pump().await;
            }
        }
    }

    async fn maybe_start_pump(&self) {
        if self.pump_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let source = resolve_source(&self.config);
        let handle = PumpHandle::spawn(&self.peer_id, self.engine.track(), source);
        *self.pump.lock().await = Some(handle);
    }

    async fn stop_pump(&self) {
        if let Some(handle) = self.pump.lock().await.take() {
            handle.stop().await;
        }
    }

    /// Publish all buffered local candidates as one JSON array
    ///
    /// The buffer is cleared only on a successful publish, so a later
    /// flush can retry the full batch.
    pub async fn flush_local_candidates(&self) {
        let mut buffer = self.local_candidates.lock().await;
        if buffer.is_empty() {
            return;
        }

        let payload = match serde_json::to_string(&*buffer) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(peer_id = %self.peer_id, error = %e, "candidate batch serialization failed");
                return;
            }
        };

        let topic = topics::candidate_rmcs(&self.config.namespace, &self.peer_id);
        match self.publisher.publish(&topic, payload).await {
            Ok(()) => {
                info!(peer_id = %self.peer_id, count = buffer.len(), "candidate batch published");
                buffer.clear();
            }
            Err(e) => {
                warn!(peer_id = %self.peer_id, error = %e, "candidate batch publish failed");
            }
        }
    }

    /// Apply remote candidates; a bad candidate is skipped, not fatal
    pub async fn apply_remote_candidates(&self, candidates: &[IceCandidate]) {
        for candidate in candidates {
            if let Err(e) = self.engine.add_remote_candidate(candidate).await {
                warn!(
                    peer_id = %self.peer_id,
                    candidate = %candidate.candidate,
                    error = %e,
                    "remote candidate rejected"
                );
            }
        }
    }

    /// Tear the session down: stop the pump, close the engine
    ///
    /// Idempotent. Returns only after the pump task has exited, so no sample
    /// is written to the track after this call.
    pub async fn close(&self) {
        {
            let mut state = self.state.write().await;
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }

        self.stop_pump().await;

        if let Err(e) = self.engine.close().await {
            warn!(peer_id = %self.peer_id, error = %e, "engine close failed");
        }
        info!(peer_id = %self.peer_id, "session closed");
    }
}
