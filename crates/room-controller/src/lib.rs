//! Room Controller
//!
//! Session and resource coordinator for multi-party SFU media rooms: tracks
//! which peers belong to which room and which transport/producer/consumer
//! resources belong to which peer, keeps that state consistent under
//! concurrent joins, negotiation, and abrupt disconnects - potentially
//! across several stateless controller processes sharing a durable store -
//! and drives the per-peer signaling state machine.
//!
//! # Architecture
//!
//! ```text
//! PeerSession (one per peer connection, protocol state machine)
//! └── SessionCoordinator (room/peer lifecycle, resource bookkeeping)
//!     ├── SessionStore     durable shared truth: memberships, resource ids
//!     │                    (in-memory or Redis with atomic Lua mutations)
//!     ├── ResourceRegistry process-local live native handles, never shared
//!     ├── MediaEngine      external engine behind a request/response trait
//!     └── EventRouter      ordered per-peer fan-out of pushed events
//! ```
//!
//! # Key Design Decisions
//!
//! - **Two consistency domains**: durable ids/memberships are shared through
//!   the store; live native handles exist only in the creating process and
//!   are never serialized.
//! - **Atomic store mutations**: every shared-record change is one
//!   read-modify-write, so concurrent joins and leaves never lose updates.
//! - **Room pinning**: a room's routing context lives on exactly one
//!   controller instance; other instances redirect instead of creating an
//!   unbridged duplicate.
//! - **Explicit fan-out**: cross-peer notifications are published as a
//!   first-class step of produce/remove handling, not hung off resource
//!   close callbacks.
//!
//! This crate is an SDK: the duplex message transport carrying signaling and
//! the media engine itself are supplied by the embedder.
//!
//! # Modules
//!
//! - [`coordinator`] - the session/resource coordinator core
//! - [`gateway`] - wire messages, per-peer state machine, event fan-out
//! - [`store`] - durable session store (memory and Redis implementations)
//! - [`engine`] - media engine adapter boundary
//! - [`registry`] - process-local live handle registry
//! - [`config`] - configuration from environment
//! - [`errors`] - error types with signaling error codes

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod errors;
pub mod gateway;
pub mod registry;
pub mod store;
pub mod types;
