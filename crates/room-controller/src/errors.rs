//! Room Controller error types.
//!
//! Error types map to numeric signaling error codes for client responses.
//! Internal details (store backends, engine internals) are logged server-side
//! but not exposed to clients.

use thiserror::Error;

/// Room Controller error type.
///
/// Maps to signaling error codes:
/// - `InvalidState`: `INVALID_REQUEST` (1)
/// - `IncompatibleCapabilities`: `INCOMPATIBLE` (2)
/// - `ConnectionFailure`: `HANDSHAKE_FAILED` (3)
/// - `*NotFound`: `NOT_FOUND` (4)
/// - `RoomAlreadyExists`: `CONFLICT` (5)
/// - `Engine`, `Store`, `Internal`: `INTERNAL_ERROR` (6)
/// - `RoomFull`, `AtCapacity`, `RoomNotLocal`: `CAPACITY_EXCEEDED` (7)
#[derive(Debug, Error)]
pub enum RcError {
    /// Room id has no durable record.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Explicit create-only room creation hit an existing record.
    #[error("Room already exists: {0}")]
    RoomAlreadyExists(String),

    /// The room's routing context lives on another controller instance.
    #[error("Room is hosted on another controller: {pinned_to}")]
    RoomNotLocal { pinned_to: String },

    /// Room is at its configured peer limit.
    #[error("Room is full: {0}")]
    RoomFull(String),

    /// This controller instance is at its configured room limit.
    #[error("Controller at capacity")]
    AtCapacity,

    /// Peer id has no durable record.
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Transport id unknown, or not owned by the requesting peer.
    #[error("Transport not found: {0}")]
    TransportNotFound(String),

    /// Producer id unknown, or not visible from the requesting peer's room.
    #[error("Producer not found: {0}")]
    ProducerNotFound(String),

    /// Consumer id unknown, or not owned by the requesting peer.
    #[error("Consumer not found: {0}")]
    ConsumerNotFound(String),

    /// Resource id has no live handle in this process.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// The requesting peer's capabilities cannot consume the producer.
    #[error("Incompatible capabilities for producer {0}")]
    IncompatibleCapabilities(String),

    /// Transport handshake failed. Non-fatal; the client may retry with a
    /// fresh transport.
    #[error("Transport handshake failed: {0}")]
    ConnectionFailure(String),

    /// Request arrived in a protocol state that does not allow it.
    #[error("Request {request} not valid in state {state}")]
    InvalidState {
        state: &'static str,
        request: &'static str,
    },

    /// The media engine rejected an operation.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Durable store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure reported by the media engine adapter.
///
/// The coordinator never retries these; they surface to the signaling client.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine rejected the operation (malformed parameters, unknown
    /// handle, invalid state transition).
    #[error("Engine rejected operation: {0}")]
    Rejected(String),

    /// The engine ran out of a resource (ports, memory, worker slots).
    #[error("Engine resource exhausted: {0}")]
    Exhausted(String),

    /// The engine worker process is not running. Unrecoverable for every
    /// room hosted by it; the embedder must begin orderly shutdown.
    #[error("Engine worker is not running")]
    WorkerDown,
}

/// Failure in the durable session store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend (connection, script, command) failure.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// A stored document could not be encoded or decoded.
    #[error("Store serialization error: {0}")]
    Serialization(String),
}

impl RcError {
    /// Returns the numeric signaling error code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            RcError::InvalidState { .. } => 1, // INVALID_REQUEST
            RcError::IncompatibleCapabilities(_) => 2, // INCOMPATIBLE
            RcError::ConnectionFailure(_) => 3, // HANDSHAKE_FAILED
            RcError::RoomNotFound(_)
            | RcError::PeerNotFound(_)
            | RcError::TransportNotFound(_)
            | RcError::ProducerNotFound(_)
            | RcError::ConsumerNotFound(_)
            | RcError::ResourceNotFound(_) => 4, // NOT_FOUND
            RcError::RoomAlreadyExists(_) => 5, // CONFLICT
            RcError::Engine(_) | RcError::Store(_) | RcError::Internal(_) => 6, // INTERNAL_ERROR
            RcError::RoomFull(_) | RcError::AtCapacity | RcError::RoomNotLocal { .. } => 7, // CAPACITY_EXCEEDED
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RcError::Store(_) | RcError::Internal(_) => "An internal error occurred".to_string(),
            RcError::Engine(_) => "Media engine rejected the operation".to_string(),
            RcError::RoomNotLocal { pinned_to } => {
                format!("Room is hosted on another controller: {pinned_to}")
            }
            other => other.to_string(),
        }
    }
}
