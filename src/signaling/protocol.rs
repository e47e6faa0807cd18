//! Wire types for the signaling topic namespace
//!
//! Topics follow `<namespace>/robot-control/<peerId>/<action>`. Offers and
//! answers carry SDP text (raw or wrapped in a JSON `{"sdp": ...}` envelope);
//! candidates travel as JSON arrays.

use serde::{Deserialize, Serialize};

/// Topic segment that anchors peer-id extraction
pub const CONTROL_SEGMENT: &str = "/robot-control/";

/// An ICE candidate as exchanged over the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate line (`candidate:...`)
    pub candidate: String,

    /// Media stream identification tag; "0" for a single-m-line sender
    #[serde(rename = "sdpMid", default = "default_sdp_mid")]
    pub sdp_mid: String,

    /// Index of the media description this candidate belongs to
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u16,
}

fn default_sdp_mid() -> String {
    "0".to_string()
}

/// Frames exchanged with the broker over the WebSocket link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BrokerFrame {
    /// Register interest in a topic filter (`+` matches one segment)
    Subscribe {
        /// Topic filter
        topic: String,
    },
    /// A message published to a topic, in either direction
    Publish {
        /// Concrete topic
        topic: String,
        /// UTF-8 payload (SDP text or JSON)
        payload: String,
    },
}

/// Topic construction for the robot-control namespace
pub mod topics {
    /// Inbound offer filter: `<ns>/robot-control/+/offer`
    pub fn offer_filter(namespace: &str) -> String {
        format!("{namespace}/robot-control/+/offer")
    }

    /// Inbound remote-candidate filter: `<ns>/robot-control/+/candidate/robot`
    pub fn candidate_filter(namespace: &str) -> String {
        format!("{namespace}/robot-control/+/candidate/robot")
    }

    /// Outbound answer topic for a peer
    pub fn answer(namespace: &str, peer_id: &str) -> String {
        format!("{namespace}/robot-control/{peer_id}/answer")
    }

    /// Outbound local-candidate batch topic for a peer
    pub fn candidate_rmcs(namespace: &str, peer_id: &str) -> String {
        format!("{namespace}/robot-control/{peer_id}/candidate/rmcs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_builders() {
        assert_eq!(topics::offer_filter("ns"), "ns/robot-control/+/offer");
        assert_eq!(
            topics::candidate_filter("ns"),
            "ns/robot-control/+/candidate/robot"
        );
        assert_eq!(topics::answer("ns", "p1"), "ns/robot-control/p1/answer");
        assert_eq!(
            topics::candidate_rmcs("ns", "p1"),
            "ns/robot-control/p1/candidate/rmcs"
        );
    }

    #[test]
    fn test_candidate_wire_names() {
        let json = r#"{"candidate":"candidate:1 1 udp 2130706431 10.0.0.1 5000 typ host","sdpMid":"0","sdpMLineIndex":0}"#;
        let c: IceCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.sdp_mid, "0");
        assert_eq!(c.sdp_mline_index, 0);

        let round = serde_json::to_value(&c).unwrap();
        assert!(round.get("sdpMid").is_some());
        assert!(round.get("sdpMLineIndex").is_some());
    }

    #[test]
    fn test_candidate_sdp_mid_defaults() {
        let json = r#"{"candidate":"candidate:1","sdpMLineIndex":1}"#;
        let c: IceCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.sdp_mid, "0");
        assert_eq!(c.sdp_mline_index, 1);
    }

    #[test]
    fn test_candidate_requires_mline_index() {
        let json = r#"{"candidate":"candidate:1"}"#;
        assert!(serde_json::from_str::<IceCandidate>(json).is_err());
    }

    #[test]
    fn test_broker_frame_round_trip() {
        let frame = BrokerFrame::Publish {
            topic: "ns/robot-control/p1/answer".to_string(),
            payload: "v=0\r\n".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""op":"publish""#));
        let back: BrokerFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, back);
    }
}
