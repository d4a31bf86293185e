//! Session coordinator.
//!
//! Mediates between two consistency domains: the durable session store
//! (cross-process truth for ids and memberships) and the process-local
//! resource registry (live native handles that cannot leave this process).
//! Owns room/peer lifecycle and resource bookkeeping; the signaling gateway
//! calls in here and never touches the store or engine directly.
//!
//! # Room pinning
//!
//! A room's routing context exists in exactly one process. The durable room
//! record carries the `controller_id` of the instance that created it; a
//! peer landing on any other instance gets `RoomNotLocal` with the pinned
//! instance id so a fronting balancer can redirect, instead of silently
//! getting a second routing context that could never exchange media with
//! the first.

use crate::config::Config;
use crate::engine::{
    ConsumerDescriptor, ConsumerHandle, DtlsParameters, MediaEngine, MediaKind, ProducerHandle,
    RouterHandle, RtpCapabilities, RtpParameters, TransportDescriptor, TransportDirection,
    TransportHandle,
};
use crate::errors::RcError;
use crate::gateway::events::EventPublisher;
use crate::gateway::messages::{RemoteProducer, ServerEvent};
use crate::registry::{ResourceHandle, ResourceRegistry};
use crate::store::{
    AddMemberOutcome, CreateRoomOutcome, RemovePeerOutcome, ResourceSlot, RoomRecord, SessionStore,
};
use crate::types::{ConsumerId, PeerId, ProducerId, RoomId, TransportId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Result of a successful peer removal, for caller-side notification.
#[derive(Debug, Clone)]
pub struct RemovedPeer {
    pub room_id: RoomId,
    /// True when the removal emptied the room: its durable record and local
    /// routing context are both gone.
    pub room_closed: bool,
}

/// The session/resource coordinator.
///
/// All failures surface as typed [`RcError`]s; nothing is retried
/// internally. Retries, if any, belong to the signaling client.
pub struct SessionCoordinator {
    config: Config,
    store: Arc<dyn SessionStore>,
    engine: Arc<dyn MediaEngine>,
    events: Arc<dyn EventPublisher>,
    registry: ResourceRegistry,
}

impl SessionCoordinator {
    pub fn new(
        config: Config,
        store: Arc<dyn SessionStore>,
        engine: Arc<dyn MediaEngine>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        info!(
            target: "rc.coordinator",
            controller_id = %config.controller_id,
            max_rooms = config.max_rooms,
            max_peers_per_room = config.max_peers_per_room,
            "Session coordinator initialized"
        );
        Self {
            config,
            store,
            engine,
            events,
            registry: ResourceRegistry::new(),
        }
    }

    #[must_use]
    pub fn controller_id(&self) -> &str {
        &self.config.controller_id
    }

    #[must_use]
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Cancelled when the media engine's worker dies. Unrecoverable for
    /// every room hosted here; the embedder must begin orderly shutdown.
    #[must_use]
    pub fn engine_death(&self) -> CancellationToken {
        self.engine.death_signal()
    }

    /// Return the room's live routing context, creating the durable record
    /// and the local router as needed.
    ///
    /// Safe under concurrent calls for the same room id: the store creates
    /// at most one record, and a caller losing the local router race closes
    /// its surplus router and adopts the winner's.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn get_or_create_room(&self, room_id: &RoomId) -> Result<RouterHandle, RcError> {
        if let Some(router) = self.registry.router(room_id) {
            debug!(target: "rc.coordinator", room_id = %room_id, "Reusing live routing context");
            return Ok(router);
        }

        let record = RoomRecord::new(self.config.controller_id.clone());
        match self.store.create_room(room_id, &record).await? {
            CreateRoomOutcome::Created => {
                info!(target: "rc.coordinator", room_id = %room_id, "Created room record");
            }
            CreateRoomOutcome::Exists(existing) => {
                if existing.controller_id != self.config.controller_id {
                    return Err(RcError::RoomNotLocal {
                        pinned_to: existing.controller_id,
                    });
                }
                // Pinned here but no live router (e.g. first join after a
                // restart); fall through and create one.
            }
        }

        self.create_local_router(room_id).await
    }

    /// Create-only variant: fails with `RoomAlreadyExists` when a durable
    /// record exists, wherever it is pinned.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn create_room(&self, room_id: &RoomId) -> Result<RouterHandle, RcError> {
        let record = RoomRecord::new(self.config.controller_id.clone());
        match self.store.create_room(room_id, &record).await? {
            CreateRoomOutcome::Created => {
                info!(target: "rc.coordinator", room_id = %room_id, "Created room record");
                self.create_local_router(room_id).await
            }
            CreateRoomOutcome::Exists(_) => Err(RcError::RoomAlreadyExists(room_id.to_string())),
        }
    }

    async fn create_local_router(&self, room_id: &RoomId) -> Result<RouterHandle, RcError> {
        // Limit applies to new routing contexts only (0 = unlimited).
        if self.config.max_rooms > 0 && self.registry.router_count() >= self.config.max_rooms {
            warn!(
                target: "rc.coordinator",
                current_rooms = self.registry.router_count(),
                max_rooms = self.config.max_rooms,
                "Room limit reached"
            );
            return Err(RcError::AtCapacity);
        }

        let router = self.engine.create_router(&self.config.media_codecs).await?;
        let (winner, inserted) = self.registry.insert_router_if_absent(room_id, router.clone());
        if inserted {
            info!(
                target: "rc.coordinator",
                room_id = %room_id,
                router_id = %winner.id,
                total_rooms = self.registry.router_count(),
                "Created routing context"
            );
        } else {
            // Lost a concurrent creation race; discard the surplus router.
            if let Err(e) = self.engine.close_router(&router).await {
                warn!(
                    target: "rc.coordinator",
                    error = %e,
                    router_id = %router.id,
                    "Failed to close surplus routing context"
                );
            }
        }
        Ok(winner)
    }

    /// Add a peer to a room. No-ops with a warning when the peer is already
    /// a member (duplicate join).
    #[instrument(skip_all, fields(room_id = %room_id, peer_id = %peer_id))]
    pub async fn add_peer(&self, room_id: &RoomId, peer_id: &PeerId) -> Result<(), RcError> {
        match self
            .store
            .add_member(room_id, peer_id, self.config.max_peers_per_room)
            .await?
        {
            AddMemberOutcome::Added => {
                info!(
                    target: "rc.coordinator",
                    room_id = %room_id,
                    peer_id = %peer_id,
                    "Added peer to room"
                );
                Ok(())
            }
            AddMemberOutcome::AlreadyMember => {
                warn!(
                    target: "rc.coordinator",
                    room_id = %room_id,
                    peer_id = %peer_id,
                    "Peer is already a member, ignoring duplicate join"
                );
                Ok(())
            }
            AddMemberOutcome::RoomMissing => Err(RcError::RoomNotFound(room_id.to_string())),
            AddMemberOutcome::RoomFull => Err(RcError::RoomFull(room_id.to_string())),
        }
    }

    /// Every producer owned by every member of the room except the
    /// requesting peer. Complete and duplicate-free at the instant of the
    /// membership snapshot.
    pub async fn list_remote_producers(
        &self,
        room_id: &RoomId,
        requesting_peer: &PeerId,
    ) -> Result<Vec<RemoteProducer>, RcError> {
        let peers = self.store.room_peers(room_id).await?;
        let mut producers = Vec::new();
        for (peer_id, record) in peers {
            if peer_id == *requesting_peer {
                continue;
            }
            for producer_id in record.producer_ids {
                producers.push(RemoteProducer {
                    producer_id,
                    peer_id: peer_id.clone(),
                });
            }
        }
        Ok(producers)
    }

    /// Current member ids of a room.
    pub async fn room_members(&self, room_id: &RoomId) -> Result<Vec<PeerId>, RcError> {
        Ok(self.store.members(room_id).await?)
    }

    /// The capability set of the room's local routing context.
    pub fn room_rtp_capabilities(&self, room_id: &RoomId) -> Result<RtpCapabilities, RcError> {
        self.registry
            .router(room_id)
            .map(|router| router.rtp_capabilities)
            .ok_or_else(|| RcError::RoomNotFound(room_id.to_string()))
    }

    /// Owner of a live resource in this process.
    pub fn lookup_resource_owner(&self, resource_id: &str) -> Result<PeerId, RcError> {
        self.registry
            .owner_of(resource_id)
            .ok_or_else(|| RcError::ResourceNotFound(resource_id.to_string()))
    }

    /// Create a transport for a peer against its room's routing context and
    /// record it. Returns the connection descriptor for the client.
    #[instrument(skip_all, fields(peer_id = %peer_id, room_id = %room_id, direction = %direction))]
    pub async fn create_peer_transport(
        &self,
        peer_id: &PeerId,
        room_id: &RoomId,
        direction: TransportDirection,
    ) -> Result<TransportDescriptor, RcError> {
        let router = self
            .registry
            .router(room_id)
            .ok_or_else(|| RcError::RoomNotFound(room_id.to_string()))?;

        let (transport, descriptor) = self
            .engine
            .create_transport(&router, direction, &self.config.network)
            .await?;

        self.record_transport(peer_id, transport).await?;
        Ok(descriptor)
    }

    /// Record a transport against its owner: durable id append plus live
    /// handle registration. Closes the handle and fails with `PeerNotFound`
    /// when the peer record is already gone (disconnect won the race).
    pub async fn record_transport(
        &self,
        peer_id: &PeerId,
        transport: TransportHandle,
    ) -> Result<(), RcError> {
        let slot = match transport.direction {
            TransportDirection::Send => ResourceSlot::ProducerTransport,
            TransportDirection::Recv => ResourceSlot::ConsumerTransport,
        };
        if !self
            .store
            .append_resource(peer_id, slot, transport.id.as_str())
            .await?
        {
            if let Err(e) = self.engine.close_transport(&transport).await {
                warn!(
                    target: "rc.coordinator",
                    error = %e,
                    transport_id = %transport.id,
                    "Failed to close orphaned transport"
                );
            }
            return Err(RcError::PeerNotFound(peer_id.to_string()));
        }
        debug!(
            target: "rc.coordinator",
            peer_id = %peer_id,
            transport_id = %transport.id,
            direction = %transport.direction,
            "Recorded transport"
        );
        self.registry
            .insert(peer_id.clone(), ResourceHandle::Transport(transport));
        Ok(())
    }

    /// Record a producer against its owner. See [`record_transport`](Self::record_transport).
    pub async fn record_producer(
        &self,
        peer_id: &PeerId,
        producer: ProducerHandle,
    ) -> Result<(), RcError> {
        if !self
            .store
            .append_resource(peer_id, ResourceSlot::Producer, producer.id.as_str())
            .await?
        {
            if let Err(e) = self.engine.close_producer(&producer).await {
                warn!(
                    target: "rc.coordinator",
                    error = %e,
                    producer_id = %producer.id,
                    "Failed to close orphaned producer"
                );
            }
            return Err(RcError::PeerNotFound(peer_id.to_string()));
        }
        self.registry
            .insert(peer_id.clone(), ResourceHandle::Producer(producer));
        Ok(())
    }

    /// Record a consumer against its owner. See [`record_transport`](Self::record_transport).
    pub async fn record_consumer(
        &self,
        peer_id: &PeerId,
        consumer: ConsumerHandle,
    ) -> Result<(), RcError> {
        if !self
            .store
            .append_resource(peer_id, ResourceSlot::Consumer, consumer.id.as_str())
            .await?
        {
            if let Err(e) = self.engine.close_consumer(&consumer).await {
                warn!(
                    target: "rc.coordinator",
                    error = %e,
                    consumer_id = %consumer.id,
                    "Failed to close orphaned consumer"
                );
            }
            return Err(RcError::PeerNotFound(peer_id.to_string()));
        }
        self.registry
            .insert(peer_id.clone(), ResourceHandle::Consumer(consumer));
        Ok(())
    }

    /// Complete the secure handshake on a peer-owned transport. Failure is
    /// non-fatal: the client may retry with a fresh transport.
    #[instrument(skip_all, fields(peer_id = %peer_id, transport_id = %transport_id))]
    pub async fn connect_transport(
        &self,
        peer_id: &PeerId,
        transport_id: &TransportId,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), RcError> {
        let owner = self.lookup_resource_owner(transport_id.as_str())?;
        if owner != *peer_id {
            return Err(RcError::TransportNotFound(transport_id.to_string()));
        }
        let transport = self
            .registry
            .transport(transport_id)
            .ok_or_else(|| RcError::TransportNotFound(transport_id.to_string()))?;

        self.engine
            .connect_transport(&transport, dtls_parameters)
            .await
            .map_err(|e| {
                warn!(
                    target: "rc.coordinator",
                    error = %e,
                    transport_id = %transport_id,
                    "Transport handshake failed"
                );
                RcError::ConnectionFailure(e.to_string())
            })
    }

    /// Create a producer on the peer's send transport and announce it to the
    /// rest of the room.
    #[instrument(skip_all, fields(peer_id = %peer_id, transport_id = %transport_id, kind = %kind))]
    pub async fn produce(
        &self,
        peer_id: &PeerId,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId, RcError> {
        let record = self
            .store
            .get_peer(peer_id)
            .await?
            .ok_or_else(|| RcError::PeerNotFound(peer_id.to_string()))?;
        let transport = self.owned_transport(peer_id, transport_id, TransportDirection::Send)?;

        let producer = self.engine.produce(&transport, kind, rtp_parameters).await?;
        let producer_id = producer.id.clone();
        self.record_producer(peer_id, producer).await?;

        // Explicit fan-out, not a side effect of resource creation hooks.
        let members = self.store.members(&record.room_id).await?;
        let event = ServerEvent::NewProducer {
            producer_id: producer_id.clone(),
            peer_id: peer_id.clone(),
        };
        for member in &members {
            if member != peer_id {
                self.events.publish(member, event.clone());
            }
        }

        info!(
            target: "rc.coordinator",
            peer_id = %peer_id,
            producer_id = %producer_id,
            kind = %kind,
            "New producer"
        );
        Ok(producer_id)
    }

    /// Create a paused consumer on the peer's receive transport, bound to a
    /// producer from the same room.
    #[instrument(skip_all, fields(peer_id = %peer_id, producer_id = %producer_id))]
    pub async fn consume(
        &self,
        peer_id: &PeerId,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<ConsumerDescriptor, RcError> {
        let record = self
            .store
            .get_peer(peer_id)
            .await?
            .ok_or_else(|| RcError::PeerNotFound(peer_id.to_string()))?;
        let router = self
            .registry
            .router(&record.room_id)
            .ok_or_else(|| RcError::RoomNotFound(record.room_id.to_string()))?;

        // The producer must resolve to a peer of the same room; consumers
        // never cross rooms.
        let producer_owner = self
            .registry
            .owner_of(producer_id.as_str())
            .ok_or_else(|| RcError::ProducerNotFound(producer_id.to_string()))?;
        let owner_record = self
            .store
            .get_peer(&producer_owner)
            .await?
            .ok_or_else(|| RcError::ProducerNotFound(producer_id.to_string()))?;
        if owner_record.room_id != record.room_id {
            return Err(RcError::ProducerNotFound(producer_id.to_string()));
        }

        let transport = self.owned_transport(peer_id, transport_id, TransportDirection::Recv)?;

        if !self
            .engine
            .can_consume(&router, producer_id, rtp_capabilities)
            .await?
        {
            return Err(RcError::IncompatibleCapabilities(producer_id.to_string()));
        }

        // Created paused by policy; media flows only after the client
        // acknowledges readiness with a resume.
        let (consumer, descriptor) = self
            .engine
            .consume(&transport, producer_id, rtp_capabilities)
            .await?;
        self.record_consumer(peer_id, consumer).await?;

        debug!(
            target: "rc.coordinator",
            peer_id = %peer_id,
            consumer_id = %descriptor.id,
            producer_id = %producer_id,
            "New consumer (paused)"
        );
        Ok(descriptor)
    }

    /// Unpause a peer-owned consumer.
    pub async fn resume_consumer(
        &self,
        peer_id: &PeerId,
        consumer_id: &ConsumerId,
    ) -> Result<(), RcError> {
        let owner = self.registry.owner_of(consumer_id.as_str());
        if owner.as_ref() != Some(peer_id) {
            return Err(RcError::ConsumerNotFound(consumer_id.to_string()));
        }
        let consumer = self
            .registry
            .consumer(consumer_id)
            .ok_or_else(|| RcError::ConsumerNotFound(consumer_id.to_string()))?;
        self.engine.resume_consumer(&consumer).await?;
        Ok(())
    }

    /// Resolve a transport that must be owned by `peer_id` and point the
    /// required direction. Anything else reads as "transport not found" to
    /// the caller; one peer can never see another peer's handles.
    fn owned_transport(
        &self,
        peer_id: &PeerId,
        transport_id: &TransportId,
        direction: TransportDirection,
    ) -> Result<TransportHandle, RcError> {
        let transport = self
            .registry
            .transport(transport_id)
            .ok_or_else(|| RcError::TransportNotFound(transport_id.to_string()))?;
        let owner = self.registry.owner_of(transport_id.as_str());
        if owner.as_ref() != Some(peer_id) || transport.direction != direction {
            return Err(RcError::TransportNotFound(transport_id.to_string()));
        }
        Ok(transport)
    }

    /// Remove a peer and everything it owns.
    ///
    /// Idempotent: returns `None` when the peer has no record (duplicate
    /// disconnect/leave). Safe with any subset of the resource sets
    /// populated, including a half-created transport from a peer that
    /// disconnected mid-negotiation.
    #[instrument(skip_all, fields(peer_id = %peer_id))]
    pub async fn remove_peer(&self, peer_id: &PeerId) -> Result<Option<RemovedPeer>, RcError> {
        let Some(record) = self.store.get_peer(peer_id).await? else {
            debug!(
                target: "rc.coordinator",
                peer_id = %peer_id,
                "remove_peer: no record, nothing to do"
            );
            return Ok(None);
        };

        // Teardown order: consumers, then producers, then transports, so no
        // media callback can fire against an already-closed transport.
        for consumer_id in &record.consumer_ids {
            if let Some(ResourceHandle::Consumer(consumer)) =
                self.registry.remove(consumer_id.as_str())
            {
                if let Err(e) = self.engine.close_consumer(&consumer).await {
                    warn!(
                        target: "rc.coordinator",
                        error = %e,
                        consumer_id = %consumer_id,
                        "Failed to close consumer during peer removal"
                    );
                }
            }
        }

        for producer_id in &record.producer_ids {
            self.close_consumers_of(producer_id, peer_id).await;
            if let Some(ResourceHandle::Producer(producer)) =
                self.registry.remove(producer_id.as_str())
            {
                if let Err(e) = self.engine.close_producer(&producer).await {
                    warn!(
                        target: "rc.coordinator",
                        error = %e,
                        producer_id = %producer_id,
                        "Failed to close producer during peer removal"
                    );
                }
            }
        }

        for transport_id in record
            .consumer_transport_ids
            .iter()
            .chain(record.producer_transport_ids.iter())
        {
            if let Some(ResourceHandle::Transport(transport)) =
                self.registry.remove(transport_id.as_str())
            {
                if let Err(e) = self.engine.close_transport(&transport).await {
                    warn!(
                        target: "rc.coordinator",
                        error = %e,
                        transport_id = %transport_id,
                        "Failed to close transport during peer removal"
                    );
                }
            }
        }

        // The atomic store removal decides room teardown exactly once, even
        // under concurrent duplicate removals.
        match self.store.remove_peer(peer_id).await? {
            RemovePeerOutcome::NotFound => {
                debug!(
                    target: "rc.coordinator",
                    peer_id = %peer_id,
                    "remove_peer: lost removal race"
                );
                Ok(None)
            }
            RemovePeerOutcome::Removed { room_deleted, .. } => {
                if room_deleted {
                    if let Some(router) = self.registry.remove_router(&record.room_id) {
                        if let Err(e) = self.engine.close_router(&router).await {
                            warn!(
                                target: "rc.coordinator",
                                error = %e,
                                router_id = %router.id,
                                "Failed to close routing context"
                            );
                        }
                    }
                    info!(
                        target: "rc.coordinator",
                        room_id = %record.room_id,
                        "Room emptied, closed routing context"
                    );
                }
                info!(
                    target: "rc.coordinator",
                    peer_id = %peer_id,
                    room_id = %record.room_id,
                    "Removed peer"
                );
                Ok(Some(RemovedPeer {
                    room_id: record.room_id.clone(),
                    room_closed: room_deleted,
                }))
            }
        }
    }

    /// Close every other peer's consumer bound to a producer that is going
    /// away, and tell each owner synchronously. Failures are logged and
    /// teardown continues; cleanup must never wedge.
    async fn close_consumers_of(&self, producer_id: &ProducerId, leaving_peer: &PeerId) {
        for (owner, consumer) in self.registry.consumers_of_producer(producer_id) {
            if owner == *leaving_peer {
                // The leaving peer's own consumers are already closed.
                continue;
            }
            let consumer_id = consumer.id.clone();
            let _ = self.registry.remove(consumer_id.as_str());
            if let Err(e) = self.engine.close_consumer(&consumer).await {
                warn!(
                    target: "rc.coordinator",
                    error = %e,
                    consumer_id = %consumer_id,
                    "Failed to close dependent consumer"
                );
            }
            match self
                .store
                .remove_resource(&owner, ResourceSlot::Consumer, consumer_id.as_str())
                .await
            {
                Ok(_) => {}
                Err(e) => warn!(
                    target: "rc.coordinator",
                    error = %e,
                    peer_id = %owner,
                    consumer_id = %consumer_id,
                    "Failed to drop consumer id from owner record"
                ),
            }
            self.events
                .publish(&owner, ServerEvent::ConsumerClosed { consumer_id });
        }
    }
}
