//! End-to-end pipeline tests over the mock media engine
//!
//! Drives the server loop with synthetic broker messages and asserts on what
//! gets published back.

use async_trait::async_trait;
use robocast::signaling::client::InboundMessage;
use robocast::signaling::protocol::IceCandidate;
use robocast::signaling::SignalPublisher;
use robocast::{EngineKind, Result, StreamConfig, StreamServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

struct RecordingPublisher {
    published: Mutex<Vec<(String, String)>>,
}

impl RecordingPublisher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
        })
    }

    async fn published(&self) -> Vec<(String, String)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl SignalPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        self.published
            .lock()
            .await
            .push((topic.to_string(), payload));
        Ok(())
    }
}

struct Harness {
    inbound: mpsc::UnboundedSender<InboundMessage>,
    publisher: Arc<RecordingPublisher>,
    server: tokio::task::JoinHandle<()>,
}

fn start_server() -> Harness {
    let (tx, rx) = mpsc::unbounded_channel();
    let publisher = RecordingPublisher::new();
    let config = StreamConfig {
        namespace: "robot-7".to_string(),
        engine: EngineKind::Mock,
        ..Default::default()
    };

    let mut server = StreamServer::new(config, publisher.clone(), rx);
    let server = tokio::spawn(async move {
        server.run().await;
    });

    Harness {
        inbound: tx,
        publisher,
        server,
    }
}

fn offer(peer: &str, payload: &str) -> InboundMessage {
    InboundMessage {
        topic: format!("robot-7/robot-control/{peer}/offer"),
        payload: payload.as_bytes().to_vec(),
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_offer_produces_answer_and_candidate_batch() {
    let h = start_server();

    h.inbound.send(offer("viewer-1", "v=0\r\n")).unwrap();
    settle().await;

    let published = h.publisher.published().await;
    let answers: Vec<_> = published
        .iter()
        .filter(|(t, _)| t == "robot-7/robot-control/viewer-1/answer")
        .collect();
    assert_eq!(answers.len(), 1);
    assert!(answers[0].1.starts_with("v=0"));

    // The mock gathers one candidate then completes; exactly one batch.
    let batches: Vec<_> = published
        .iter()
        .filter(|(t, _)| t == "robot-7/robot-control/viewer-1/candidate/rmcs")
        .collect();
    assert_eq!(batches.len(), 1);
    let parsed: Vec<IceCandidate> = serde_json::from_str(&batches[0].1).unwrap();
    assert_eq!(parsed.len(), 1);

    drop(h.inbound);
    h.server.await.unwrap();
}

#[tokio::test]
async fn test_json_wrapped_offer_is_unwrapped() {
    let h = start_server();

    let payload = serde_json::json!({ "sdp": "v=0\r\n", "type": "offer" }).to_string();
    h.inbound.send(offer("viewer-1", &payload)).unwrap();
    settle().await;

    let published = h.publisher.published().await;
    assert!(published
        .iter()
        .any(|(t, p)| t.ends_with("/viewer-1/answer") && p.starts_with("v=0")));

    drop(h.inbound);
    h.server.await.unwrap();
}

#[tokio::test]
async fn test_duplicate_offer_answers_once() {
    let h = start_server();

    h.inbound.send(offer("viewer-1", "v=0\r\n")).unwrap();
    settle().await;
    h.inbound.send(offer("viewer-1", "v=0\r\n")).unwrap();
    settle().await;

    let answers = h
        .publisher
        .published()
        .await
        .into_iter()
        .filter(|(t, _)| t.ends_with("/viewer-1/answer"))
        .count();
    assert_eq!(answers, 1);

    drop(h.inbound);
    h.server.await.unwrap();
}

#[tokio::test]
async fn test_second_viewer_supersedes_first() {
    let h = start_server();

    h.inbound.send(offer("viewer-1", "v=0\r\n")).unwrap();
    settle().await;
    h.inbound.send(offer("viewer-2", "v=0\r\n")).unwrap();
    settle().await;

    let published = h.publisher.published().await;
    assert!(published.iter().any(|(t, _)| t.ends_with("/viewer-1/answer")));
    assert!(published.iter().any(|(t, _)| t.ends_with("/viewer-2/answer")));

    drop(h.inbound);
    h.server.await.unwrap();
}

#[tokio::test]
async fn test_unrelated_and_malformed_messages_are_tolerated() {
    let h = start_server();

    // Our own outbound topic echoed back by the broker.
    h.inbound
        .send(InboundMessage {
            topic: "robot-7/robot-control/viewer-1/candidate/rmcs".to_string(),
            payload: b"[]".to_vec(),
        })
        .unwrap();
    // Candidates that are not a JSON array.
    h.inbound
        .send(InboundMessage {
            topic: "robot-7/robot-control/viewer-1/candidate/robot".to_string(),
            payload: b"{}".to_vec(),
        })
        .unwrap();
    // A structurally invalid offer.
    h.inbound.send(offer("viewer-1", "not sdp")).unwrap();
    settle().await;

    // Nothing published, and the loop is still alive for a valid offer.
    assert!(h.publisher.published().await.is_empty());

    h.inbound.send(offer("viewer-1", "v=0\r\n")).unwrap();
    settle().await;
    assert!(h
        .publisher
        .published()
        .await
        .iter()
        .any(|(t, _)| t.ends_with("/viewer-1/answer")));

    drop(h.inbound);
    h.server.await.unwrap();
}

#[tokio::test]
async fn test_remote_candidates_reach_active_session_only() {
    let h = start_server();

    h.inbound.send(offer("viewer-1", "v=0\r\n")).unwrap();
    settle().await;

    let candidates = serde_json::json!([
        { "candidate": "candidate:1 1 udp 1 10.0.0.1 5000 typ host", "sdpMLineIndex": 0, "sdpMid": "0" }
    ])
    .to_string();

    // For the active peer and for a stranger; the stranger's are dropped.
    for peer in ["viewer-1", "stranger"] {
        h.inbound
            .send(InboundMessage {
                topic: format!("robot-7/robot-control/{peer}/candidate/robot"),
                payload: candidates.clone().into_bytes(),
            })
            .unwrap();
    }
    settle().await;

    drop(h.inbound);
    h.server.await.unwrap();
}
