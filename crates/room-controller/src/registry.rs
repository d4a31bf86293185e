//! Process-local registry of live engine handles.
//!
//! Maps resource ids to the native handles created by this process's media
//! engine. Never serialized and never consulted across process boundaries;
//! cross-process visibility goes only through the session store's id sets.
//! The registry is an explicit object owned by the coordinator (not ambient
//! module state) so tests can run several independent controller instances
//! side by side.

use crate::engine::{ConsumerHandle, ProducerHandle, RouterHandle, TransportHandle};
use crate::types::{ConsumerId, PeerId, ProducerId, RoomId, TransportId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A live peer-owned handle.
#[derive(Debug, Clone)]
pub enum ResourceHandle {
    Transport(TransportHandle),
    Producer(ProducerHandle),
    Consumer(ConsumerHandle),
}

impl ResourceHandle {
    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        match self {
            ResourceHandle::Transport(_) => "transport",
            ResourceHandle::Producer(_) => "producer",
            ResourceHandle::Consumer(_) => "consumer",
        }
    }
}

#[derive(Debug, Clone)]
struct Registered {
    owner: PeerId,
    handle: ResourceHandle,
}

/// Process-local, in-memory map from resource id to live native handle.
#[derive(Default)]
pub struct ResourceRegistry {
    /// Peer-owned resources (transports, producers, consumers).
    resources: RwLock<HashMap<String, Registered>>,
    /// Room routing contexts, at most one per room per process.
    routers: RwLock<HashMap<RoomId, RouterHandle>>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a peer-owned handle. Replaces any stale entry with the same id.
    pub fn insert(&self, owner: PeerId, handle: ResourceHandle) {
        let id = match &handle {
            ResourceHandle::Transport(t) => t.id.as_str().to_string(),
            ResourceHandle::Producer(p) => p.id.as_str().to_string(),
            ResourceHandle::Consumer(c) => c.id.as_str().to_string(),
        };
        self.resources
            .write()
            .insert(id, Registered { owner, handle });
    }

    /// Owner of a resource, if it is live in this process.
    #[must_use]
    pub fn owner_of(&self, resource_id: &str) -> Option<PeerId> {
        self.resources
            .read()
            .get(resource_id)
            .map(|r| r.owner.clone())
    }

    #[must_use]
    pub fn get(&self, resource_id: &str) -> Option<ResourceHandle> {
        self.resources
            .read()
            .get(resource_id)
            .map(|r| r.handle.clone())
    }

    /// Remove and return a peer-owned handle.
    #[must_use]
    pub fn remove(&self, resource_id: &str) -> Option<ResourceHandle> {
        self.resources.write().remove(resource_id).map(|r| r.handle)
    }

    #[must_use]
    pub fn transport(&self, id: &TransportId) -> Option<TransportHandle> {
        match self.get(id.as_str()) {
            Some(ResourceHandle::Transport(t)) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn producer(&self, id: &ProducerId) -> Option<ProducerHandle> {
        match self.get(id.as_str()) {
            Some(ResourceHandle::Producer(p)) => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub fn consumer(&self, id: &ConsumerId) -> Option<ConsumerHandle> {
        match self.get(id.as_str()) {
            Some(ResourceHandle::Consumer(c)) => Some(c),
            _ => None,
        }
    }

    /// Every live consumer bound to the given producer, with its owner.
    #[must_use]
    pub fn consumers_of_producer(&self, producer_id: &ProducerId) -> Vec<(PeerId, ConsumerHandle)> {
        self.resources
            .read()
            .values()
            .filter_map(|r| match &r.handle {
                ResourceHandle::Consumer(c) if c.producer_id == *producer_id => {
                    Some((r.owner.clone(), c.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// The room's routing context, if this process has one.
    #[must_use]
    pub fn router(&self, room_id: &RoomId) -> Option<RouterHandle> {
        self.routers.read().get(room_id).cloned()
    }

    /// Insert a router unless one is already present for the room.
    ///
    /// Returns the winning handle and whether `router` was the one inserted;
    /// a losing caller must close its extra router.
    pub fn insert_router_if_absent(
        &self,
        room_id: &RoomId,
        router: RouterHandle,
    ) -> (RouterHandle, bool) {
        let mut routers = self.routers.write();
        match routers.get(room_id) {
            Some(existing) => (existing.clone(), false),
            None => {
                routers.insert(room_id.clone(), router.clone());
                (router, true)
            }
        }
    }

    /// Remove and return the room's routing context.
    #[must_use]
    pub fn remove_router(&self, room_id: &RoomId) -> Option<RouterHandle> {
        self.routers.write().remove(room_id)
    }

    #[must_use]
    pub fn router_count(&self) -> usize {
        self.routers.read().len()
    }

    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty() && self.routers.read().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::engine::TransportDirection;
    use std::sync::Arc;

    fn transport(id: &str, direction: TransportDirection) -> TransportHandle {
        TransportHandle {
            id: TransportId::from(id),
            direction,
            raw: Arc::new(()),
        }
    }

    fn consumer(id: &str, producer: &str) -> ConsumerHandle {
        ConsumerHandle {
            id: ConsumerId::from(id),
            producer_id: ProducerId::from(producer),
            raw: Arc::new(()),
        }
    }

    #[test]
    fn test_insert_lookup_remove() {
        let registry = ResourceRegistry::new();
        let peer = PeerId::from("peer-1");

        registry.insert(
            peer.clone(),
            ResourceHandle::Transport(transport("trn-1", TransportDirection::Send)),
        );

        assert_eq!(registry.owner_of("trn-1"), Some(peer.clone()));
        assert!(registry.transport(&TransportId::from("trn-1")).is_some());
        assert!(registry.producer(&ProducerId::from("trn-1")).is_none());

        let removed = registry.remove("trn-1");
        assert_eq!(removed.map(|h| h.kind_str()), Some("transport"));
        assert_eq!(registry.owner_of("trn-1"), None);
        assert!(registry.remove("trn-1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_consumers_of_producer() {
        let registry = ResourceRegistry::new();
        let a = PeerId::from("peer-a");
        let b = PeerId::from("peer-b");

        registry.insert(a.clone(), ResourceHandle::Consumer(consumer("cns-1", "prd-1")));
        registry.insert(b.clone(), ResourceHandle::Consumer(consumer("cns-2", "prd-1")));
        registry.insert(b.clone(), ResourceHandle::Consumer(consumer("cns-3", "prd-2")));
        assert_eq!(registry.resource_count(), 3);

        let mut bound = registry.consumers_of_producer(&ProducerId::from("prd-1"));
        bound.sort_by(|(_, x), (_, y)| x.id.cmp(&y.id));

        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].1.id, ConsumerId::from("cns-1"));
        assert_eq!(bound[1].0, b);
    }

    #[test]
    fn test_router_insert_race() {
        let registry = ResourceRegistry::new();
        let room = RoomId::from("alpha");

        let first = RouterHandle {
            id: crate::types::RouterId::from("rtr-1"),
            rtp_capabilities: crate::engine::RtpCapabilities(serde_json::json!({})),
            raw: Arc::new(()),
        };
        let second = RouterHandle {
            id: crate::types::RouterId::from("rtr-2"),
            rtp_capabilities: crate::engine::RtpCapabilities(serde_json::json!({})),
            raw: Arc::new(()),
        };

        let (winner, inserted) = registry.insert_router_if_absent(&room, first);
        assert!(inserted);
        assert_eq!(winner.id.as_str(), "rtr-1");

        // The second caller lost the race and must keep the existing router.
        let (winner, inserted) = registry.insert_router_if_absent(&room, second);
        assert!(!inserted);
        assert_eq!(winner.id.as_str(), "rtr-1");
        assert_eq!(registry.router_count(), 1);

        assert!(registry.remove_router(&room).is_some());
        assert!(registry.router(&room).is_none());
    }
}
