//! In-process session store.
//!
//! Single mutex over the plain documents; every trait operation runs under
//! one lock acquisition, which gives the same atomicity the Redis store gets
//! from Lua scripts. This is the reference the Redis scripts must match, and
//! the store for single-process embedders and tests.

use super::{
    AddMemberOutcome, CreateRoomOutcome, PeerRecord, RemovePeerOutcome, ResourceSlot, RoomRecord,
    SessionStore,
};
use crate::errors::StoreError;
use crate::types::{ConsumerId, PeerId, ProducerId, RoomId, TransportId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    rooms: HashMap<RoomId, RoomRecord>,
    peers: HashMap<PeerId, PeerRecord>,
}

/// In-memory [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<Inner>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of room records currently stored.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }

    /// Number of peer records currently stored.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.inner.lock().peers.len()
    }
}

fn slot_list<'a>(record: &'a mut PeerRecord, slot: ResourceSlot) -> SlotList<'a> {
    match slot {
        ResourceSlot::ProducerTransport => SlotList::Transport(&mut record.producer_transport_ids),
        ResourceSlot::ConsumerTransport => SlotList::Transport(&mut record.consumer_transport_ids),
        ResourceSlot::Producer => SlotList::Producer(&mut record.producer_ids),
        ResourceSlot::Consumer => SlotList::Consumer(&mut record.consumer_ids),
    }
}

enum SlotList<'a> {
    Transport(&'a mut Vec<TransportId>),
    Producer(&'a mut Vec<ProducerId>),
    Consumer(&'a mut Vec<ConsumerId>),
}

impl SlotList<'_> {
    fn push(&mut self, id: &str) {
        match self {
            SlotList::Transport(v) => {
                if !v.iter().any(|x| x.as_str() == id) {
                    v.push(TransportId::from(id));
                }
            }
            SlotList::Producer(v) => {
                if !v.iter().any(|x| x.as_str() == id) {
                    v.push(ProducerId::from(id));
                }
            }
            SlotList::Consumer(v) => {
                if !v.iter().any(|x| x.as_str() == id) {
                    v.push(ConsumerId::from(id));
                }
            }
        }
    }

    fn remove(&mut self, id: &str) {
        match self {
            SlotList::Transport(v) => v.retain(|x| x.as_str() != id),
            SlotList::Producer(v) => v.retain(|x| x.as_str() != id),
            SlotList::Consumer(v) => v.retain(|x| x.as_str() != id),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_room(
        &self,
        room_id: &RoomId,
        record: &RoomRecord,
    ) -> Result<CreateRoomOutcome, StoreError> {
        let mut inner = self.inner.lock();
        match inner.rooms.get(room_id) {
            Some(existing) => Ok(CreateRoomOutcome::Exists(existing.clone())),
            None => {
                inner.rooms.insert(room_id.clone(), record.clone());
                Ok(CreateRoomOutcome::Created)
            }
        }
    }

    async fn get_room(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.inner.lock().rooms.get(room_id).cloned())
    }

    async fn add_member(
        &self,
        room_id: &RoomId,
        peer_id: &PeerId,
        max_peers: usize,
    ) -> Result<AddMemberOutcome, StoreError> {
        let mut inner = self.inner.lock();
        let Some(room) = inner.rooms.get_mut(room_id) else {
            return Ok(AddMemberOutcome::RoomMissing);
        };
        if room.member_peer_ids.contains(peer_id) {
            return Ok(AddMemberOutcome::AlreadyMember);
        }
        if max_peers > 0 && room.member_peer_ids.len() >= max_peers {
            return Ok(AddMemberOutcome::RoomFull);
        }
        room.member_peer_ids.push(peer_id.clone());
        inner
            .peers
            .insert(peer_id.clone(), PeerRecord::new(room_id.clone()));
        Ok(AddMemberOutcome::Added)
    }

    async fn get_peer(&self, peer_id: &PeerId) -> Result<Option<PeerRecord>, StoreError> {
        Ok(self.inner.lock().peers.get(peer_id).cloned())
    }

    async fn append_resource(
        &self,
        peer_id: &PeerId,
        slot: ResourceSlot,
        resource_id: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(record) = inner.peers.get_mut(peer_id) else {
            return Ok(false);
        };
        slot_list(record, slot).push(resource_id);
        Ok(true)
    }

    async fn remove_resource(
        &self,
        peer_id: &PeerId,
        slot: ResourceSlot,
        resource_id: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(record) = inner.peers.get_mut(peer_id) else {
            return Ok(false);
        };
        slot_list(record, slot).remove(resource_id);
        Ok(true)
    }

    async fn remove_peer(&self, peer_id: &PeerId) -> Result<RemovePeerOutcome, StoreError> {
        let mut inner = self.inner.lock();
        let Some(peer) = inner.peers.remove(peer_id) else {
            return Ok(RemovePeerOutcome::NotFound);
        };

        let mut room_deleted = false;
        if let Some(room) = inner.rooms.get_mut(&peer.room_id) {
            room.member_peer_ids.retain(|m| m != peer_id);
            if room.member_peer_ids.is_empty() {
                inner.rooms.remove(&peer.room_id);
                room_deleted = true;
                debug!(
                    target: "rc.store.memory",
                    room_id = %peer.room_id,
                    "Removed last member, deleted room record"
                );
            }
        }

        Ok(RemovePeerOutcome::Removed { peer, room_deleted })
    }

    async fn members(&self, room_id: &RoomId) -> Result<Vec<PeerId>, StoreError> {
        Ok(self
            .inner
            .lock()
            .rooms
            .get(room_id)
            .map(|r| r.member_peer_ids.clone())
            .unwrap_or_default())
    }

    async fn room_peers(
        &self,
        room_id: &RoomId,
    ) -> Result<Vec<(PeerId, PeerRecord)>, StoreError> {
        let inner = self.inner.lock();
        let Some(room) = inner.rooms.get(room_id) else {
            return Ok(Vec::new());
        };
        Ok(room
            .member_peer_ids
            .iter()
            .filter_map(|id| inner.peers.get(id).map(|rec| (id.clone(), rec.clone())))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn room_record() -> RoomRecord {
        RoomRecord::new("rc-test".to_string())
    }

    #[tokio::test]
    async fn test_create_room_is_create_if_absent() {
        let store = MemorySessionStore::new();
        let room = RoomId::from("alpha");

        let outcome = store.create_room(&room, &room_record()).await.unwrap();
        assert!(matches!(outcome, CreateRoomOutcome::Created));

        let outcome = store.create_room(&room, &room_record()).await.unwrap();
        match outcome {
            CreateRoomOutcome::Exists(existing) => {
                assert_eq!(existing.controller_id, "rc-test");
            }
            CreateRoomOutcome::Created => panic!("second create must observe the first"),
        }
        assert_eq!(store.room_count(), 1);
    }

    #[tokio::test]
    async fn test_add_member_outcomes() {
        let store = MemorySessionStore::new();
        let room = RoomId::from("alpha");
        let peer = PeerId::from("peer-1");

        // Missing room.
        let outcome = store.add_member(&room, &peer, 0).await.unwrap();
        assert_eq!(outcome, AddMemberOutcome::RoomMissing);

        store.create_room(&room, &room_record()).await.unwrap();

        let outcome = store.add_member(&room, &peer, 0).await.unwrap();
        assert_eq!(outcome, AddMemberOutcome::Added);
        assert!(store.get_peer(&peer).await.unwrap().is_some());

        // Duplicate join is reported, not an error.
        let outcome = store.add_member(&room, &peer, 0).await.unwrap();
        assert_eq!(outcome, AddMemberOutcome::AlreadyMember);

        // Peer limit.
        let outcome = store
            .add_member(&room, &PeerId::from("peer-2"), 1)
            .await
            .unwrap();
        assert_eq!(outcome, AddMemberOutcome::RoomFull);
    }

    #[tokio::test]
    async fn test_append_and_remove_resource() {
        let store = MemorySessionStore::new();
        let room = RoomId::from("alpha");
        let peer = PeerId::from("peer-1");
        store.create_room(&room, &room_record()).await.unwrap();
        store.add_member(&room, &peer, 0).await.unwrap();

        assert!(store
            .append_resource(&peer, ResourceSlot::Producer, "prd-1")
            .await
            .unwrap());
        // Appends are idempotent per id.
        assert!(store
            .append_resource(&peer, ResourceSlot::Producer, "prd-1")
            .await
            .unwrap());
        assert!(store
            .append_resource(&peer, ResourceSlot::ProducerTransport, "trn-1")
            .await
            .unwrap());

        let record = store.get_peer(&peer).await.unwrap().unwrap();
        assert_eq!(record.producer_ids.len(), 1);
        assert_eq!(record.producer_transport_ids.len(), 1);

        assert!(store
            .remove_resource(&peer, ResourceSlot::Producer, "prd-1")
            .await
            .unwrap());
        let record = store.get_peer(&peer).await.unwrap().unwrap();
        assert!(record.producer_ids.is_empty());

        // Unknown peer reports false so the caller can map PeerNotFound.
        assert!(!store
            .append_resource(&PeerId::from("ghost"), ResourceSlot::Consumer, "cns-1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_remove_peer_deletes_empty_room_atomically() {
        let store = MemorySessionStore::new();
        let room = RoomId::from("alpha");
        let a = PeerId::from("peer-a");
        let b = PeerId::from("peer-b");
        store.create_room(&room, &room_record()).await.unwrap();
        store.add_member(&room, &a, 0).await.unwrap();
        store.add_member(&room, &b, 0).await.unwrap();

        let outcome = store.remove_peer(&a).await.unwrap();
        match outcome {
            RemovePeerOutcome::Removed { room_deleted, .. } => assert!(!room_deleted),
            RemovePeerOutcome::NotFound => panic!("peer-a had a record"),
        }
        assert_eq!(store.members(&room).await.unwrap(), vec![b.clone()]);

        let outcome = store.remove_peer(&b).await.unwrap();
        match outcome {
            RemovePeerOutcome::Removed { room_deleted, .. } => assert!(room_deleted),
            RemovePeerOutcome::NotFound => panic!("peer-b had a record"),
        }
        assert_eq!(store.room_count(), 0);
        assert_eq!(store.peer_count(), 0);

        // Second removal is an idempotent no-op.
        let outcome = store.remove_peer(&b).await.unwrap();
        assert!(matches!(outcome, RemovePeerOutcome::NotFound));
    }

    #[tokio::test]
    async fn test_concurrent_create_room_single_record() {
        use std::sync::Arc;

        let store = Arc::new(MemorySessionStore::new());
        let room = RoomId::from("contested");

        let mut created = 0;
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let room = room.clone();
                tokio::spawn(async move {
                    store
                        .create_room(&room, &RoomRecord::new("rc-test".to_string()))
                        .await
                })
            })
            .collect();

        for handle in handles {
            if matches!(handle.await.unwrap().unwrap(), CreateRoomOutcome::Created) {
                created += 1;
            }
        }

        assert_eq!(created, 1, "exactly one task may create the record");
        assert_eq!(store.room_count(), 1);
    }

    #[tokio::test]
    async fn test_room_peers_snapshot() {
        let store = MemorySessionStore::new();
        let room = RoomId::from("alpha");
        let a = PeerId::from("peer-a");
        let b = PeerId::from("peer-b");
        store.create_room(&room, &room_record()).await.unwrap();
        store.add_member(&room, &a, 0).await.unwrap();
        store.add_member(&room, &b, 0).await.unwrap();
        store
            .append_resource(&a, ResourceSlot::Producer, "prd-1")
            .await
            .unwrap();

        let peers = store.room_peers(&room).await.unwrap();
        assert_eq!(peers.len(), 2);
        let a_record = peers.iter().find(|(id, _)| *id == a).unwrap();
        assert_eq!(a_record.1.producer_ids, vec![ProducerId::from("prd-1")]);

        // Absent room yields an empty snapshot.
        assert!(store.room_peers(&RoomId::from("ghost")).await.unwrap().is_empty());
    }
}
