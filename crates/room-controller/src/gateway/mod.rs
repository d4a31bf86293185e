//! Signaling gateway: wire messages, per-peer protocol state machine, and
//! event fan-out.

pub mod events;
pub mod messages;
pub mod session;

pub use events::{EventPublisher, EventRouter};
pub use messages::{RemoteProducer, ServerEvent, SignalingRequest, SignalingResponse};
pub use session::{PeerSession, SessionState};
