//! Per-peer streaming sessions

pub mod manager;
pub mod session;

pub use manager::SessionManager;
pub use session::{PeerSession, SessionState};

/// Identifier of a remote peer, taken from the control topic
pub type PeerId = String;
