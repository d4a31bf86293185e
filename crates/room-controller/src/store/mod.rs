//! Durable session store: the shared source of truth for room membership
//! and per-peer resource ids.
//!
//! Every mutation of a shared record is a single atomic read-modify-write so
//! two peers joining or leaving the same room concurrently can never lose
//! updates. Only plain JSON-serializable documents live here; native engine
//! handles never do.
//!
//! Two implementations ship with the crate: [`memory::MemorySessionStore`]
//! for single-process deployments and tests, and [`redis::RedisSessionStore`]
//! for fleets of stateless controller processes sharing one store.

pub mod memory;
pub mod redis;

pub(crate) mod lua_scripts;

use crate::errors::StoreError;
use crate::types::{ConsumerId, PeerId, ProducerId, RoomId, TransportId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Durable room document, keyed by room id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRecord {
    /// Current members. The room exists exactly while this is non-empty.
    pub member_peer_ids: Vec<PeerId>,
    /// Controller instance hosting the room's routing context. Rooms are
    /// pinned: peers landing on another instance are redirected rather than
    /// given a second, unbridged routing context.
    pub controller_id: String,
    /// Unix timestamp of room creation.
    pub created_at: i64,
}

impl RoomRecord {
    #[must_use]
    pub fn new(controller_id: String) -> Self {
        Self {
            member_peer_ids: Vec::new(),
            controller_id,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Durable peer document, keyed by peer id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub room_id: RoomId,
    pub producer_ids: Vec<ProducerId>,
    pub consumer_ids: Vec<ConsumerId>,
    pub producer_transport_ids: Vec<TransportId>,
    pub consumer_transport_ids: Vec<TransportId>,
}

impl PeerRecord {
    #[must_use]
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            producer_ids: Vec::new(),
            consumer_ids: Vec::new(),
            producer_transport_ids: Vec::new(),
            consumer_transport_ids: Vec::new(),
        }
    }
}

/// Which id list of a peer record an append/remove touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSlot {
    ProducerTransport,
    ConsumerTransport,
    Producer,
    Consumer,
}

impl ResourceSlot {
    /// Field name in the durable document / key suffix in Redis.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            ResourceSlot::ProducerTransport => "producer_transport_ids",
            ResourceSlot::ConsumerTransport => "consumer_transport_ids",
            ResourceSlot::Producer => "producer_ids",
            ResourceSlot::Consumer => "consumer_ids",
        }
    }
}

/// Outcome of [`SessionStore::create_room`].
#[derive(Debug)]
pub enum CreateRoomOutcome {
    Created,
    /// A record already existed; returned so the caller can check pinning.
    Exists(RoomRecord),
}

/// Outcome of [`SessionStore::add_member`].
#[derive(Debug, PartialEq, Eq)]
pub enum AddMemberOutcome {
    Added,
    /// The peer was already a member; the caller warns and moves on.
    AlreadyMember,
    RoomMissing,
    RoomFull,
}

/// Outcome of [`SessionStore::remove_peer`].
#[derive(Debug)]
pub enum RemovePeerOutcome {
    /// No record: the peer was already removed (duplicate disconnect/leave).
    NotFound,
    Removed {
        /// The record as it stood at removal.
        peer: PeerRecord,
        /// True when this removal emptied the room; the room record was
        /// deleted in the same atomic step and the caller must tear down
        /// the local routing context.
        room_deleted: bool,
    },
}

/// Durable, shared mapping from room id to members and peer id to owned
/// resource ids. Visible to and mutated by every controller process.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create the room record if absent; returns the existing record
    /// otherwise. Atomic: N concurrent calls for one unused room id create
    /// exactly one record.
    async fn create_room(
        &self,
        room_id: &RoomId,
        record: &RoomRecord,
    ) -> Result<CreateRoomOutcome, StoreError>;

    async fn get_room(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, StoreError>;

    /// Atomically add `peer_id` to the room's member list and create its
    /// empty peer record. `max_peers` of 0 means unlimited.
    async fn add_member(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
        max_peers: usize,
    ) -> Result<AddMemberOutcome, StoreError>;

    async fn get_peer(&self, peer_id: &PeerId) -> Result<Option<PeerRecord>, StoreError>;

    /// Atomically append a resource id to one of the peer's id lists.
    /// Returns false if the peer record no longer exists (the peer was
    /// removed while the resource was being created).
    async fn append_resource(
        &self,
        peer_id: &PeerId,
        slot: ResourceSlot,
        resource_id: &str,
    ) -> Result<bool, StoreError>;

    /// Atomically remove a resource id from one of the peer's id lists.
    /// Returns false if the peer record no longer exists.
    async fn remove_resource(
        &self,
        peer_id: &PeerId,
        slot: ResourceSlot,
        resource_id: &str,
    ) -> Result<bool, StoreError>;

    /// Atomically delete the peer record and pull it from its room's member
    /// list. When membership reaches zero the room record is deleted in the
    /// same step. Idempotent: a second call returns
    /// [`RemovePeerOutcome::NotFound`].
    async fn remove_peer(&self, peer_id: &PeerId) -> Result<RemovePeerOutcome, StoreError>;

    /// Current member ids of a room (empty if the room is absent).
    async fn members(&self, room_id: &RoomId) -> Result<Vec<PeerId>, StoreError>;

    /// Records of every current member of a room.
    async fn room_peers(
        &self,
        room_id: &RoomId,
    ) -> Result<Vec<(PeerId, PeerRecord)>, StoreError>;
}
