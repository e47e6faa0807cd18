//! At-most-one-active-session bookkeeping

use crate::config::StreamConfig;
use crate::media::{build_engine, EngineEventSender};
use crate::session::{PeerId, PeerSession, SessionState};
use crate::signaling::SignalPublisher;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Owns all live sessions and enforces the single-streamer policy
///
/// The sender has one video pipeline, so a new offer from a different peer
/// supersedes the current session: the old one is fully torn down, pump
/// joined, before the new one is created.
pub struct SessionManager {
    config: StreamConfig,
    publisher: Arc<dyn SignalPublisher>,
    engine_events: EngineEventSender,
    sessions: Mutex<HashMap<PeerId, Arc<PeerSession>>>,
}

impl SessionManager {
    /// Create a manager with no sessions
    pub fn new(
        config: StreamConfig,
        publisher: Arc<dyn SignalPublisher>,
        engine_events: EngineEventSender,
    ) -> Self {
        Self {
            config,
            publisher,
            engine_events,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a peer's offer
    ///
    /// Returns the session plus whether it was newly created. A repeated
    /// offer from the already-active peer is a no-op, unless that session
    /// has reached a terminal state (`Failed`/`Closed`): the fresh offer is
    /// the recovery path, so the stale session is replaced. An offer from
    /// anyone else supersedes the active session. If applying the offer
    /// fails, no session is registered.
    pub async fn admit(&self, peer_id: &str, sdp: &str) -> Result<(Arc<PeerSession>, bool)> {
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.get(peer_id) {
            match existing.state().await {
                SessionState::Failed | SessionState::Closed => {
                    info!(peer_id, "fresh offer replaces terminal session");
                }
                _ => {
                    info!(peer_id, "duplicate offer from active peer ignored");
                    return Ok((existing.clone(), false));
                }
            }
        }

        // The lock is held across teardown so a racing offer cannot see two
        // live sessions.
        for (old_peer, old) in sessions.drain() {
            info!(old_peer = %old_peer, new_peer = peer_id, "session superseded");
            old.close().await;
        }

        let engine = build_engine(peer_id, &self.config, self.engine_events.clone()).await?;
        let session = Arc::new(PeerSession::new(
            peer_id,
            self.config.clone(),
            engine,
            self.publisher.clone(),
        ));

        if let Err(e) = session.apply_remote_offer(sdp).await {
            warn!(peer_id, error = %e, "offer rejected");
            session.close().await;
            return Err(e);
        }

        sessions.insert(peer_id.to_string(), session.clone());
        Ok((session, true))
    }

    /// Look up a live session
    pub async fn get(&self, peer_id: &str) -> Option<Arc<PeerSession>> {
        self.sessions.lock().await.get(peer_id).cloned()
    }

    /// Close and remove one peer's session, if present
    pub async fn close(&self, peer_id: &str) {
        let session = self.sessions.lock().await.remove(peer_id);
        if let Some(session) = session {
            session.close().await;
        }
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Close every session
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.sessions.lock().await.drain().collect();
        for (_, session) in drained {
            session.close().await;
        }
        info!("all sessions closed");
    }
}
