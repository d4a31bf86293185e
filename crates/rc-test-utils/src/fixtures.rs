//! Pre-wired controller instances and capability documents for tests.

use crate::mock_engine::MockMediaEngine;
use room_controller::config::Config;
use room_controller::coordinator::SessionCoordinator;
use room_controller::engine::{DtlsParameters, MediaEngine, RtpCapabilities, RtpParameters};
use room_controller::gateway::{EventPublisher, EventRouter, PeerSession};
use room_controller::store::memory::MemorySessionStore;
use room_controller::store::SessionStore;
use room_controller::types::PeerId;
use serde_json::json;
use std::sync::Arc;

/// A controller instance wired to the in-memory store and the mock engine,
/// with every part reachable for assertions.
pub struct TestHarness {
    pub coordinator: Arc<SessionCoordinator>,
    pub events: Arc<EventRouter>,
    pub engine: Arc<MockMediaEngine>,
    pub store: Arc<MemorySessionStore>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(test_config("rc-test"))
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemorySessionStore::new()))
    }

    /// Share one store between harnesses to model several stateless
    /// controller processes against a single durable store.
    pub fn with_store(config: Config, store: Arc<MemorySessionStore>) -> Self {
        let events = Arc::new(EventRouter::new());
        let engine = Arc::new(MockMediaEngine::new());
        let coordinator = Arc::new(SessionCoordinator::new(
            config,
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::clone(&engine) as Arc<dyn MediaEngine>,
            Arc::clone(&events) as Arc<dyn EventPublisher>,
        ));
        Self {
            coordinator,
            events,
            engine,
            store,
        }
    }

    /// A fresh peer session against this controller.
    pub fn session(&self, peer_id: &str) -> PeerSession {
        PeerSession::new(
            PeerId::from(peer_id),
            Arc::clone(&self.coordinator),
            Arc::clone(&self.events),
        )
    }
}

/// Config with a fixed controller id and library defaults otherwise.
pub fn test_config(controller_id: &str) -> Config {
    Config {
        controller_id: controller_id.to_string(),
        ..Config::default()
    }
}

/// A plausible client capability document.
pub fn client_rtp_capabilities() -> RtpCapabilities {
    RtpCapabilities(json!({
        "codecs": [
            {"mimeType": "audio/opus", "clockRate": 48000, "channels": 2},
            {"mimeType": "video/VP8", "clockRate": 90000},
        ],
    }))
}

/// A plausible client RTP parameter document.
pub fn rtp_parameters() -> RtpParameters {
    RtpParameters(json!({
        "mid": "0",
        "codecs": [{"mimeType": "video/VP8", "payloadType": 96, "clockRate": 90000}],
    }))
}

/// A plausible client DTLS handshake document.
pub fn dtls_parameters() -> DtlsParameters {
    DtlsParameters(json!({
        "role": "client",
        "fingerprints": [{"algorithm": "sha-256", "value": "AA:BB:CC"}],
    }))
}
