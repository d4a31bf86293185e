//! Signaling wire messages.
//!
//! Requests and responses form a synchronous request/response contract per
//! RPC: every request gets exactly one typed result-or-error reply, and
//! broadcast effects travel separately as [`ServerEvent`]s. The wire format
//! is JSON with a `type` tag on requests and an `event` tag on pushed
//! events.

use crate::engine::{
    ConsumerDescriptor, DtlsParameters, MediaKind, RtpCapabilities, RtpParameters,
    TransportDescriptor,
};
use crate::errors::RcError;
use crate::types::{ConsumerId, PeerId, ProducerId, RoomId, TransportId};
use serde::{Deserialize, Serialize};

/// One remote producer visible to a joining peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProducer {
    pub producer_id: ProducerId,
    pub peer_id: PeerId,
}

/// A signaling RPC from the peer.
///
/// Example: `{"type": "join", "roomId": "alpha"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SignalingRequest {
    /// Create-only room creation; fails if the room already exists.
    CreateRoom { room_id: RoomId },
    /// Join a room, creating it when absent.
    Join { room_id: RoomId },
    GetRtpCapabilities { room_id: RoomId },
    CreateTransport { is_producer: bool },
    ConnectTransport {
        transport_id: TransportId,
        dtls_parameters: DtlsParameters,
    },
    Produce {
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    },
    Consume {
        transport_id: TransportId,
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
    },
    Resume { consumer_id: ConsumerId },
    Leave { room_id: RoomId },
}

impl SignalingRequest {
    /// RPC name for logging and state-error reporting.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SignalingRequest::CreateRoom { .. } => "create-room",
            SignalingRequest::Join { .. } => "join",
            SignalingRequest::GetRtpCapabilities { .. } => "get-rtp-capabilities",
            SignalingRequest::CreateTransport { .. } => "create-transport",
            SignalingRequest::ConnectTransport { .. } => "connect-transport",
            SignalingRequest::Produce { .. } => "produce",
            SignalingRequest::Consume { .. } => "consume",
            SignalingRequest::Resume { .. } => "resume",
            SignalingRequest::Leave { .. } => "leave",
        }
    }
}

/// Error reply carried in the `error` field of an RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Client-safe message; internal details stay in server logs.
    pub error: String,
    /// Numeric error code, see [`RcError::error_code`].
    pub code: i32,
}

/// Reply to one signaling request.
///
/// Untagged on the wire: the success payload shape identifies the RPC it
/// answers, exactly one reply per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum SignalingResponse {
    Error(ErrorResponse),
    /// `create-transport` reply.
    Transport(TransportDescriptor),
    /// `consume` reply.
    Consumer(ConsumerDescriptor),
    /// `create-room` / `get-rtp-capabilities` reply.
    RouterCapabilities {
        router_rtp_capabilities: RtpCapabilities,
    },
    /// `join` reply: the remote producers already in the room.
    Producers { producers_data: Vec<RemoteProducer> },
    /// `produce` reply.
    Produced { id: ProducerId },
    /// `connect-transport` / `resume` reply.
    Success { success: bool },
    /// `leave` reply (no body).
    Empty {},
}

impl SignalingResponse {
    /// Build the error reply for a failed request.
    #[must_use]
    pub fn from_error(error: &RcError) -> Self {
        SignalingResponse::Error(ErrorResponse {
            error: error.client_message(),
            code: error.error_code(),
        })
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, SignalingResponse::Error(_))
    }
}

/// Server-pushed notification, fanned out to every other member of a room.
///
/// Example: `{"event": "new-producer", "producerId": "prd-1", "peerId": "a"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    NewProducer {
        producer_id: ProducerId,
        peer_id: PeerId,
    },
    PeerLeft { peer_id: PeerId },
    ConsumerClosed { consumer_id: ConsumerId },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let json = r#"{"type": "join", "roomId": "alpha"}"#;
        let request: SignalingRequest = serde_json::from_str(json).unwrap();
        assert!(matches!(
            request,
            SignalingRequest::Join { ref room_id } if room_id.as_str() == "alpha"
        ));

        let json = r#"{"type": "create-transport", "isProducer": true}"#;
        let request: SignalingRequest = serde_json::from_str(json).unwrap();
        assert!(matches!(
            request,
            SignalingRequest::CreateTransport { is_producer: true }
        ));

        let json = r#"{
            "type": "consume",
            "transportId": "trn-2",
            "producerId": "prd-1",
            "rtpCapabilities": {"codecs": []}
        }"#;
        let request: SignalingRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.name(), "consume");
    }

    #[test]
    fn test_response_success_shapes() {
        let response = SignalingResponse::Producers {
            producers_data: vec![RemoteProducer {
                producer_id: ProducerId::from("prd-1"),
                peer_id: PeerId::from("peer-a"),
            }],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["producersData"][0]["producerId"], "prd-1");
        assert_eq!(json["producersData"][0]["peerId"], "peer-a");

        let response = SignalingResponse::Success { success: true };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);

        let response = SignalingResponse::Empty {};
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn test_response_error_shape() {
        let response = SignalingResponse::from_error(&RcError::RoomNotFound("alpha".to_string()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "Room not found: alpha");
        assert_eq!(json["code"], 4);
        assert!(response.is_error());
    }

    #[test]
    fn test_internal_details_never_reach_the_wire() {
        let error = RcError::Store(crate::errors::StoreError::Backend(
            "connection refused at 10.0.0.7:6379".to_string(),
        ));
        let response = SignalingResponse::from_error(&error);
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("10.0.0.7"));
    }

    #[test]
    fn test_event_wire_format() {
        let event = ServerEvent::NewProducer {
            producer_id: ProducerId::from("prd-1"),
            peer_id: PeerId::from("peer-a"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "new-producer");
        assert_eq!(json["producerId"], "prd-1");
        assert_eq!(json["peerId"], "peer-a");

        let event = ServerEvent::PeerLeft {
            peer_id: PeerId::from("peer-a"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "peer-left");

        let event = ServerEvent::ConsumerClosed {
            consumer_id: ConsumerId::from("cns-9"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "consumer-closed");
        assert_eq!(json["consumerId"], "cns-9");
    }

    #[test]
    fn test_event_round_trip() {
        let event = ServerEvent::ConsumerClosed {
            consumer_id: ConsumerId::from("cns-1"),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
