//! Media engine adapter boundary.
//!
//! The engine that actually moves RTP (codec negotiation, ICE/DTLS, packet
//! forwarding) lives behind the [`MediaEngine`] trait as a pure
//! request/response collaborator. The coordinator issues create / produce /
//! consume / close calls, records the returned opaque handles, and relays
//! capability documents between peer and engine without interpreting them.
//!
//! All long-lived work (handshakes, media flow) happens entirely behind this
//! trait, outside the coordinator's critical sections.

use crate::errors::EngineError;
use crate::types::{ConsumerId, ProducerId, RouterId, TransportId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Media kind of a produced or consumed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Direction of a transport relative to the owning peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
}

impl fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportDirection::Send => write!(f, "send"),
            TransportDirection::Recv => write!(f, "recv"),
        }
    }
}

/// One codec a routing context can negotiate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecCapability {
    pub kind: MediaKind,
    pub mime_type: String,
    pub clock_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
}

/// Default codec set: Opus audio and VP8 video.
#[must_use]
pub fn default_media_codecs() -> Vec<CodecCapability> {
    vec![
        CodecCapability {
            kind: MediaKind::Audio,
            mime_type: "audio/opus".to_string(),
            clock_rate: 48_000,
            channels: Some(2),
        },
        CodecCapability {
            kind: MediaKind::Video,
            mime_type: "video/VP8".to_string(),
            clock_rate: 90_000,
            channels: None,
        },
    ]
}

/// Network settings applied to every transport the engine creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Local interface the engine listens on.
    pub listen_ip: String,
    /// Public address announced to peers, when it differs from `listen_ip`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub announced_ip: Option<String>,
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub prefer_udp: bool,
    /// Inclusive RTC port range handed to the engine worker.
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_ip: "127.0.0.1".to_string(),
            announced_ip: None,
            enable_udp: true,
            enable_tcp: true,
            prefer_udp: true,
            rtc_min_port: 2000,
            rtc_max_port: 2020,
        }
    }
}

macro_rules! opaque_doc {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub serde_json::Value);
    };
}

opaque_doc! {
    /// Router or client RTP capability set. Opaque to the controller; only
    /// the engine interprets it.
    RtpCapabilities
}

opaque_doc! {
    /// RTP parameters of one stream. Opaque to the controller.
    RtpParameters
}

opaque_doc! {
    /// DTLS handshake parameters. Opaque to the controller.
    DtlsParameters
}

opaque_doc! {
    /// ICE parameters of a transport. Opaque to the controller.
    IceParameters
}

opaque_doc! {
    /// One ICE candidate of a transport. Opaque to the controller.
    IceCandidate
}

/// Engine-private payload carried inside every live handle.
pub type RawHandle = Arc<dyn Any + Send + Sync>;

/// Live routing context for one room. Exists only in the process that
/// created it; never serialized.
#[derive(Clone)]
pub struct RouterHandle {
    pub id: RouterId,
    /// Capability set negotiated for the room, served to joining peers
    /// without an engine round trip.
    pub rtp_capabilities: RtpCapabilities,
    pub raw: RawHandle,
}

impl fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterHandle").field("id", &self.id).finish()
    }
}

/// Live transport handle, directional, owned by exactly one peer.
#[derive(Clone)]
pub struct TransportHandle {
    pub id: TransportId,
    pub direction: TransportDirection,
    pub raw: RawHandle,
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .finish()
    }
}

/// Live producer handle.
#[derive(Clone)]
pub struct ProducerHandle {
    pub id: ProducerId,
    pub kind: MediaKind,
    pub raw: RawHandle,
}

impl fmt::Debug for ProducerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Live consumer handle, bound to exactly one remote producer.
#[derive(Clone)]
pub struct ConsumerHandle {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub raw: RawHandle,
}

impl fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("id", &self.id)
            .field("producer_id", &self.producer_id)
            .finish()
    }
}

/// Connection descriptor returned to the client after transport creation.
/// Carries everything the client needs to complete the secure handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportDescriptor {
    pub id: TransportId,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

/// Descriptor returned to the client after consumer creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDescriptor {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// Request/response boundary to the media engine.
///
/// Implementations own all engine-side state; the controller records handles
/// in its [`ResourceRegistry`](crate::registry::ResourceRegistry) and never
/// shares one handle between two peers. Failed operations are surfaced to the
/// signaling client, never retried here.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Create a routing context negotiating the given codec set.
    async fn create_router(
        &self,
        media_codecs: &[CodecCapability],
    ) -> Result<RouterHandle, EngineError>;

    /// Create a directional transport against a router. Returns the live
    /// handle plus the connection descriptor for the client.
    async fn create_transport(
        &self,
        router: &RouterHandle,
        direction: TransportDirection,
        network: &NetworkConfig,
    ) -> Result<(TransportHandle, TransportDescriptor), EngineError>;

    /// Complete the DTLS handshake on a transport.
    async fn connect_transport(
        &self,
        transport: &TransportHandle,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), EngineError>;

    /// Create a producer on a send transport.
    async fn produce(
        &self,
        transport: &TransportHandle,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerHandle, EngineError>;

    /// Whether `rtp_capabilities` can consume the given producer.
    async fn can_consume(
        &self,
        router: &RouterHandle,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<bool, EngineError>;

    /// Create a consumer on a receive transport, bound to a producer.
    /// The consumer starts paused; it flows only after
    /// [`resume_consumer`](MediaEngine::resume_consumer).
    async fn consume(
        &self,
        transport: &TransportHandle,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<(ConsumerHandle, ConsumerDescriptor), EngineError>;

    /// Unpause a consumer.
    async fn resume_consumer(&self, consumer: &ConsumerHandle) -> Result<(), EngineError>;

    async fn close_router(&self, router: &RouterHandle) -> Result<(), EngineError>;

    async fn close_transport(&self, transport: &TransportHandle) -> Result<(), EngineError>;

    async fn close_producer(&self, producer: &ProducerHandle) -> Result<(), EngineError>;

    async fn close_consumer(&self, consumer: &ConsumerHandle) -> Result<(), EngineError>;

    /// Cancelled when the engine worker process dies unexpectedly. This is
    /// the sole unrecoverable condition: every room hosted by the worker is
    /// lost and the embedder must begin an orderly shutdown rather than
    /// continue half-broken.
    fn death_signal(&self) -> CancellationToken;
}
