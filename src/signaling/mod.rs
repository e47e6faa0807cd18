//! Signaling over the pub/sub broker
//!
//! The broker itself is an external collaborator; this module parses its
//! topic namespace, decodes payloads, and owns the WebSocket client used to
//! publish and subscribe.

pub mod client;
pub mod protocol;
pub mod router;

pub use client::{BrokerClient, PublisherHandle, SignalPublisher};
pub use protocol::{topics, BrokerFrame, IceCandidate};
pub use router::{route, RoutedMessage};
