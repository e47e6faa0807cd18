//! Native WebRTC media engine
//!
//! Wraps an `RTCPeerConnection` carrying a single H.264 video track. Vendor
//! callbacks are translated into [`EngineEvent`]s so no session state is
//! touched on library threads.

use crate::config::StreamConfig;
use crate::media::engine::{ConnState, EngineEvent, EngineEventSender, MediaEngine, TrackSink};
use crate::session::PeerId;
use crate::signaling::protocol::IceCandidate;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine as RtcMediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Sink writing NAL units to the local video track as media samples
pub struct WebRtcTrackSink {
    track: Arc<TrackLocalStaticSample>,
}

#[async_trait]
impl TrackSink for WebRtcTrackSink {
    async fn send(&self, unit: Bytes, duration: Duration) -> Result<()> {
        self.track
            .write_sample(&Sample {
                data: unit,
                duration,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::StreamSend(format!("track write failed: {e}")))?;
        Ok(())
    }
}

/// Media engine backed by the `webrtc` crate
pub struct WebRtcEngine {
    peer_id: PeerId,
    pc: Arc<RTCPeerConnection>,
    sink: Arc<WebRtcTrackSink>,
}

impl WebRtcEngine {
    /// Build the peer connection, attach the H.264 track, and wire callbacks
    pub async fn new(
        peer_id: &str,
        config: &StreamConfig,
        events: EngineEventSender,
    ) -> Result<Self> {
        let mut media = RtcMediaEngine::default();
        media
            .register_default_codecs()
            .map_err(|e| Error::Negotiation(format!("codec registration failed: {e}")))?;

        let registry = register_default_interceptors(Registry::new(), &mut media)
            .map_err(|e| Error::Negotiation(format!("interceptor registration failed: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: config.stun_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::Negotiation(format!("peer connection setup failed: {e}")))?,
        );

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            "robocast".to_owned(),
        ));

        let sender = pc
            .add_track(track.clone())
            .await
            .map_err(|e| Error::Negotiation(format!("track attach failed: {e}")))?;

        // Drain RTCP so the interceptors keep running.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });

        let peer: PeerId = peer_id.to_string();

        let tx = events.clone();
        let p = peer.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let tx = tx.clone();
            let p = p.clone();
            Box::pin(async move {
                if let Some(c) = candidate {
                    match c.to_json() {
                        Ok(init) => {
                            let _ = tx.send((
                                p,
                                EngineEvent::LocalCandidate(IceCandidate {
                                    candidate: init.candidate,
                                    sdp_mid: init.sdp_mid.unwrap_or_else(|| "0".to_string()),
                                    sdp_mline_index: init.sdp_mline_index.unwrap_or(0),
                                }),
                            ));
                        }
                        Err(e) => warn!(peer_id = %p, error = %e, "dropping unserializable candidate"),
                    }
                }
            })
        }));

        let tx = events.clone();
        let p = peer.clone();
        pc.on_ice_gathering_state_change(Box::new(move |state| {
            if state == RTCIceGathererState::Complete {
                let _ = tx.send((p.clone(), EngineEvent::GatheringComplete));
            }
            Box::pin(async {})
        }));

        let tx = events;
        let p = peer.clone();
        let track_announced = Arc::new(AtomicBool::new(false));
        pc.on_peer_connection_state_change(Box::new(move |state| {
            debug!(peer_id = %p, ?state, "peer connection state changed");
            let conn = match state {
                RTCPeerConnectionState::New | RTCPeerConnectionState::Connecting => {
                    Some(ConnState::Connecting)
                }
                RTCPeerConnectionState::Connected => Some(ConnState::Connected),
                RTCPeerConnectionState::Disconnected => Some(ConnState::Disconnected),
                RTCPeerConnectionState::Failed => Some(ConnState::Failed),
                RTCPeerConnectionState::Closed => Some(ConnState::Closed),
                _ => None,
            };
            if let Some(conn) = conn {
                let _ = tx.send((p.clone(), EngineEvent::Connection(conn)));
                if conn == ConnState::Connected && !track_announced.swap(true, Ordering::SeqCst) {
                    let _ = tx.send((p.clone(), EngineEvent::TrackReady));
                }
            }
            Box::pin(async {})
        }));

        info!(peer_id, "webrtc media engine created");

        Ok(Self {
            peer_id: peer,
            pc,
            sink: Arc::new(WebRtcTrackSink { track }),
        })
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    async fn set_remote_description(&self, sdp: &str) -> Result<()> {
        let offer = RTCSessionDescription::offer(sdp.to_string())
            .map_err(|e| Error::SdpParse(format!("offer rejected: {e}")))?;
        self.pc
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::Negotiation(format!("set remote description failed: {e}")))?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::Negotiation(format!("answer creation failed: {e}")))?;
        let sdp = answer.sdp.clone();

        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| Error::Negotiation(format!("set local description failed: {e}")))?;

        Ok(sdp)
    }

    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate.clone(),
                sdp_mid: Some(candidate.sdp_mid.clone()),
                sdp_mline_index: Some(candidate.sdp_mline_index),
                username_fragment: None,
            })
            .await
            .map_err(|e| Error::Negotiation(format!("remote candidate rejected: {e}")))?;
        Ok(())
    }

    fn track(&self) -> Arc<dyn TrackSink> {
        self.sink.clone()
    }

    async fn close(&self) -> Result<()> {
        debug!(peer_id = %self.peer_id, "closing webrtc peer connection");
        self.pc
            .close()
            .await
            .map_err(|e| Error::Negotiation(format!("close failed: {e}")))?;
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
