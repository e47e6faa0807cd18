//! Server event loop
//!
//! Drives the whole sender from one task: broker messages are routed to
//! sessions and engine events are applied to session state, so offers,
//! candidates, and connection changes are serialized in arrival order.

use crate::config::StreamConfig;
use crate::media::{EngineEvent, EngineEventSender};
use crate::session::{PeerId, SessionManager};
use crate::signaling::client::InboundMessage;
use crate::signaling::router::{route, RoutedMessage};
use crate::signaling::SignalPublisher;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The robot-side stream sender
pub struct StreamServer {
    manager: Arc<SessionManager>,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
    engine_events: mpsc::UnboundedReceiver<(PeerId, EngineEvent)>,
}

impl StreamServer {
    /// Wire up the manager and the engine event channel
    pub fn new(
        config: StreamConfig,
        publisher: Arc<dyn SignalPublisher>,
        inbound: mpsc::UnboundedReceiver<InboundMessage>,
    ) -> Self {
        let (events_tx, events_rx): (EngineEventSender, _) = mpsc::unbounded_channel();
        let manager = Arc::new(SessionManager::new(config, publisher, events_tx));

        Self {
            manager,
            inbound,
            engine_events: events_rx,
        }
    }

    /// The session manager, shared for shutdown handling
    pub fn manager(&self) -> Arc<SessionManager> {
        self.manager.clone()
    }

    /// Run until the broker connection closes, then tear everything down
    pub async fn run(&mut self) {
        info!("stream server running");

        loop {
            tokio::select! {
                message = self.inbound.recv() => {
                    match message {
                        Some(message) => self.handle_broker_message(message).await,
                        None => {
                            info!("broker connection closed, stopping");
                            break;
                        }
                    }
                }
                event = self.engine_events.recv() => {
                    if let Some((peer_id, event)) = event {
                        self.handle_engine_event(&peer_id, event).await;
                    }
                }
            }
        }

        self.manager.shutdown().await;
    }

    async fn handle_broker_message(&self, message: InboundMessage) {
        match route(&message.topic, &message.payload) {
            Ok(RoutedMessage::Offer { peer_id, sdp }) => {
                match self.manager.admit(&peer_id, &sdp).await {
                    Ok((session, true)) => {
                        // Negotiation can suspend on the engine; it must not
                        // block candidate routing, so it runs alongside.
                        tokio::spawn(async move {
                            if let Err(e) = session.negotiate().await {
                                warn!(peer_id = %session.peer_id(), error = %e, "negotiation failed");
                            }
                        });
                    }
                    Ok((_, false)) => {}
                    Err(e) => {
                        warn!(peer_id = %peer_id, error = %e, "offer admission failed");
                    }
                }
            }
            Ok(RoutedMessage::RemoteCandidates {
                peer_id,
                candidates,
            }) => match self.manager.get(&peer_id).await {
                Some(session) => session.apply_remote_candidates(&candidates).await,
                None => {
                    debug!(peer_id = %peer_id, "candidates for unknown peer dropped");
                }
            },
            Ok(RoutedMessage::Unrelated) => {
                debug!(topic = %message.topic, "unrelated message ignored");
            }
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "broker message rejected");
            }
        }
    }

    async fn handle_engine_event(&self, peer_id: &str, event: EngineEvent) {
        match self.manager.get(peer_id).await {
            Some(session) => session.on_engine_event(event).await,
            None => {
                // Events from a superseded engine can trail its teardown.
                debug!(peer_id, ?event, "engine event for unknown peer dropped");
            }
        }
    }
}
