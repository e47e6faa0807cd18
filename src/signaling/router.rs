//! Topic router: classify-and-decode for inbound broker messages
//!
//! Pure functions, no I/O. Malformed input is either `Unrelated` (topic does
//! not concern us) or an `Error::Parse` (topic matched, payload unusable) -
//! never a panic.

use crate::signaling::protocol::{IceCandidate, CONTROL_SEGMENT};
use crate::{Error, Result};
use tracing::warn;

/// A classified inbound signaling message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutedMessage {
    /// SDP offer from a remote peer, normalized to raw SDP text
    Offer {
        /// Peer the offer came from
        peer_id: String,
        /// Raw SDP text
        sdp: String,
    },
    /// Batch of remote ICE candidates from a peer
    RemoteCandidates {
        /// Peer the candidates came from
        peer_id: String,
        /// Usable candidates (malformed elements already skipped)
        candidates: Vec<IceCandidate>,
    },
    /// Topic does not concern this bridge
    Unrelated,
}

/// Extract the peer id from a robot-control topic
///
/// The peer id is the single segment between the literal `robot-control`
/// segment and the action suffix. Returns `None` when the marker is absent,
/// the segment is unterminated, or the segment is empty.
pub fn peer_from_topic(topic: &str) -> Option<&str> {
    let start = topic.find(CONTROL_SEGMENT)? + CONTROL_SEGMENT.len();
    let rest = &topic[start..];
    let end = rest.find('/')?;
    let peer = &rest[..end];
    if peer.is_empty() {
        None
    } else {
        Some(peer)
    }
}

/// Classify a topic/payload pair
///
/// # Errors
///
/// `Error::Parse` when the topic matched an action but the payload could not
/// be decoded. The caller drops the message; the process keeps running.
pub fn route(topic: &str, payload: &[u8]) -> Result<RoutedMessage> {
    let Some(peer_id) = peer_from_topic(topic) else {
        return Ok(RoutedMessage::Unrelated);
    };

    if topic.ends_with("/offer") {
        let sdp = normalize_offer(payload)?;
        return Ok(RoutedMessage::Offer {
            peer_id: peer_id.to_string(),
            sdp,
        });
    }

    if topic.ends_with("/candidate/robot") {
        let candidates = parse_candidates(peer_id, payload)?;
        return Ok(RoutedMessage::RemoteCandidates {
            peer_id: peer_id.to_string(),
            candidates,
        });
    }

    Ok(RoutedMessage::Unrelated)
}

/// Normalize an offer payload to raw SDP text
///
/// Accepts either raw SDP or a JSON envelope with an `sdp` string field. The
/// JSON branch is taken when the first non-whitespace byte is `{`.
fn normalize_offer(payload: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| Error::Parse(format!("offer payload is not UTF-8: {e}")))?;

    if text.trim_start().starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| Error::Parse(format!("malformed offer envelope: {e}")))?;

        return match value.get("sdp").and_then(|v| v.as_str()) {
            Some(sdp) => Ok(sdp.to_string()),
            None => Err(Error::Parse("offer envelope has no sdp field".to_string())),
        };
    }

    Ok(text.to_string())
}

/// Parse a remote-candidate payload
///
/// The payload must be a JSON array. Elements missing `candidate` or
/// `sdpMLineIndex` are skipped with a warning rather than failing the batch.
fn parse_candidates(peer_id: &str, payload: &[u8]) -> Result<Vec<IceCandidate>> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(payload)
        .map_err(|e| Error::Parse(format!("candidate payload is not a JSON array: {e}")))?;

    let mut candidates = Vec::with_capacity(values.len());

    for value in values {
        match serde_json::from_value::<IceCandidate>(value) {
            Ok(c) => candidates.push(c),
            Err(e) => {
                warn!(peer_id, error = %e, "skipping malformed remote candidate");
            }
        }
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_extraction() {
        assert_eq!(
            peer_from_topic("thing/robot-control/peer-42/offer"),
            Some("peer-42")
        );
        assert_eq!(
            peer_from_topic("thing/robot-control/peer-42/candidate/robot"),
            Some("peer-42")
        );
    }

    #[test]
    fn test_peer_extraction_failures() {
        // No robot-control marker.
        assert_eq!(peer_from_topic("thing/telemetry/peer-42/offer"), None);
        // No trailing segment after the peer id.
        assert_eq!(peer_from_topic("thing/robot-control/peer-42"), None);
        // Empty peer segment.
        assert_eq!(peer_from_topic("thing/robot-control//offer"), None);
        assert_eq!(peer_from_topic(""), None);
    }

    #[test]
    fn test_route_raw_sdp_offer() {
        let msg = route("ns/robot-control/p1/offer", b"v=0\r\no=- 1 2 IN IP4 0.0.0.0\r\n").unwrap();
        assert_eq!(
            msg,
            RoutedMessage::Offer {
                peer_id: "p1".to_string(),
                sdp: "v=0\r\no=- 1 2 IN IP4 0.0.0.0\r\n".to_string(),
            }
        );
    }

    #[test]
    fn test_route_json_envelope_offer() {
        let msg = route(
            "ns/robot-control/p1/offer",
            br#"  {"type":"offer","sdp":"v=0\r\n"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            RoutedMessage::Offer {
                peer_id: "p1".to_string(),
                sdp: "v=0\r\n".to_string(),
            }
        );
    }

    #[test]
    fn test_route_malformed_envelope_is_parse_error() {
        let err = route("ns/robot-control/p1/offer", b"{not json").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));

        let err = route("ns/robot-control/p1/offer", br#"{"type":"offer"}"#).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_route_candidates() {
        let payload = br#"[
            {"candidate":"candidate:1","sdpMid":"0","sdpMLineIndex":0},
            {"candidate":"candidate:2","sdpMLineIndex":1}
        ]"#;
        let msg = route("ns/robot-control/p1/candidate/robot", payload).unwrap();
        match msg {
            RoutedMessage::RemoteCandidates { peer_id, candidates } => {
                assert_eq!(peer_id, "p1");
                assert_eq!(candidates.len(), 2);
                assert_eq!(candidates[1].sdp_mid, "0");
                assert_eq!(candidates[1].sdp_mline_index, 1);
            }
            other => panic!("expected candidates, got {other:?}"),
        }
    }

    #[test]
    fn test_route_candidates_skips_malformed_elements() {
        let payload = br#"[
            {"candidate":"candidate:1","sdpMLineIndex":0},
            {"sdpMLineIndex":3},
            {"candidate":"candidate:3"}
        ]"#;
        let msg = route("ns/robot-control/p1/candidate/robot", payload).unwrap();
        match msg {
            RoutedMessage::RemoteCandidates { candidates, .. } => {
                assert_eq!(candidates.len(), 1);
                assert_eq!(candidates[0].candidate, "candidate:1");
            }
            other => panic!("expected candidates, got {other:?}"),
        }
    }

    #[test]
    fn test_route_candidates_non_array_is_parse_error() {
        let err =
            route("ns/robot-control/p1/candidate/robot", br#"{"candidate":"x"}"#).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_route_unrelated() {
        assert_eq!(
            route("ns/telemetry/battery", b"{}").unwrap(),
            RoutedMessage::Unrelated
        );
        // Matching peer path but unknown action.
        assert_eq!(
            route("ns/robot-control/p1/answer", b"v=0\r\n").unwrap(),
            RoutedMessage::Unrelated
        );
        // Candidates we published ourselves must not loop back in.
        assert_eq!(
            route("ns/robot-control/p1/candidate/rmcs", b"[]").unwrap(),
            RoutedMessage::Unrelated
        );
    }
}
