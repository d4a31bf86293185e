//! Event fan-out to connected peers.
//!
//! Cross-peer notifications are a first-class, explicit step: the
//! coordinator and the sessions publish through [`EventPublisher`] rather
//! than hanging callbacks off native resource close hooks. One unbounded
//! queue per peer preserves per-peer delivery order; no order is promised
//! across peers.

use super::messages::ServerEvent;
use crate::types::PeerId;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Publishes one event onto one peer's ordered delivery queue.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, peer_id: &PeerId, event: ServerEvent);
}

/// Routes server-pushed events to connected peers.
///
/// Peers register at join time and get an ordered event stream back; events
/// for a peer that has already disconnected are dropped (its durable state
/// is cleaned up separately).
#[derive(Default)]
pub struct EventRouter {
    peers: RwLock<HashMap<PeerId, mpsc::UnboundedSender<ServerEvent>>>,
}

impl EventRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer and return its event stream. Replaces any previous
    /// registration for the same peer id.
    pub fn register(&self, peer_id: PeerId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.write().insert(peer_id, tx);
        rx
    }

    pub fn unregister(&self, peer_id: &PeerId) {
        self.peers.write().remove(peer_id);
    }

    /// Deliver an event to every listed member except `except`.
    pub fn broadcast(&self, members: &[PeerId], except: &PeerId, event: &ServerEvent) {
        for member in members {
            if member != except {
                self.publish(member, event.clone());
            }
        }
    }

    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.peers.read().len()
    }
}

impl EventPublisher for EventRouter {
    fn publish(&self, peer_id: &PeerId, event: ServerEvent) {
        let peers = self.peers.read();
        match peers.get(peer_id) {
            Some(tx) => {
                // A closed receiver means the peer is mid-disconnect; the
                // event is moot.
                let _ = tx.send(event);
            }
            None => {
                debug!(
                    target: "rc.gateway.events",
                    peer_id = %peer_id,
                    "Dropping event for unregistered peer"
                );
            }
        }
    }
}
