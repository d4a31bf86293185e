//! Coordinator-level lifecycle and race-safety tests, driven through the
//! in-memory store and the mock engine.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use rc_test_utils::{client_rtp_capabilities, dtls_parameters, rtp_parameters, test_config, TestHarness};
use room_controller::engine::{MediaKind, TransportDirection};
use room_controller::errors::RcError;
use room_controller::gateway::ServerEvent;
use room_controller::store::memory::MemorySessionStore;
use room_controller::store::SessionStore;
use room_controller::types::{PeerId, ProducerId, RoomId, TransportId};
use std::sync::Arc;

struct JoinedPeer {
    id: PeerId,
}

/// Join a peer and run the full negotiation dance for one send transport.
async fn join_and_produce(
    harness: &TestHarness,
    room: &RoomId,
    peer: &str,
) -> (JoinedPeer, TransportId, ProducerId) {
    let peer_id = PeerId::from(peer);
    harness.coordinator.get_or_create_room(room).await.unwrap();
    harness.coordinator.add_peer(room, &peer_id).await.unwrap();

    let descriptor = harness
        .coordinator
        .create_peer_transport(&peer_id, room, TransportDirection::Send)
        .await
        .unwrap();
    harness
        .coordinator
        .connect_transport(&peer_id, &descriptor.id, dtls_parameters())
        .await
        .unwrap();
    let producer_id = harness
        .coordinator
        .produce(&peer_id, &descriptor.id, MediaKind::Video, rtp_parameters())
        .await
        .unwrap();

    (JoinedPeer { id: peer_id }, descriptor.id, producer_id)
}

#[tokio::test]
async fn test_remove_peer_is_idempotent() {
    let harness = TestHarness::new();
    let room = RoomId::from("alpha");
    let (peer, _, _) = join_and_produce(&harness, &room, "peer-a").await;

    let removed = harness.coordinator.remove_peer(&peer.id).await.unwrap();
    assert!(removed.is_some());
    assert!(removed.unwrap().room_closed);

    // Same call again: no record, no error, same end state.
    let removed = harness.coordinator.remove_peer(&peer.id).await.unwrap();
    assert!(removed.is_none());
    assert_eq!(harness.store.room_count(), 0);
    assert_eq!(harness.engine.open_resource_count(), 0);
    assert_eq!(harness.engine.open_router_count(), 0);
}

#[tokio::test]
async fn test_teardown_order_consumers_then_producers_then_transports() {
    let harness = TestHarness::new();
    let room = RoomId::from("alpha");

    // B produces; A produces and also consumes B's stream.
    let (b, _, b_producer) = join_and_produce(&harness, &room, "peer-b").await;
    let (a, a_send, a_producer) = join_and_produce(&harness, &room, "peer-a").await;

    let a_recv = harness
        .coordinator
        .create_peer_transport(&a.id, &room, TransportDirection::Recv)
        .await
        .unwrap();
    harness
        .coordinator
        .connect_transport(&a.id, &a_recv.id, dtls_parameters())
        .await
        .unwrap();
    let a_consumer = harness
        .coordinator
        .consume(&a.id, &a_recv.id, &b_producer, &client_rtp_capabilities())
        .await
        .unwrap();

    harness.coordinator.remove_peer(&a.id).await.unwrap();

    let closed = harness.engine.closed_order();
    let position = |entry: String| {
        closed
            .iter()
            .position(|c| *c == entry)
            .unwrap_or_else(|| panic!("{entry} was never closed (closed: {closed:?})"))
    };

    let consumer_pos = position(format!("consumer:{}", a_consumer.id));
    let producer_pos = position(format!("producer:{a_producer}"));
    let send_pos = position(format!("transport:{a_send}"));
    let recv_pos = position(format!("transport:{}", a_recv.id));

    assert!(consumer_pos < producer_pos, "consumers close before producers");
    assert!(producer_pos < send_pos, "producers close before transports");
    assert!(producer_pos < recv_pos, "producers close before transports");

    // B's resources are untouched.
    assert!(harness.engine.producer_open(b_producer.as_str()));
    let b_record = harness.store.get_peer(&b.id).await.unwrap().unwrap();
    assert_eq!(b_record.producer_ids, vec![b_producer]);
}

#[tokio::test]
async fn test_half_created_transport_is_cleaned_up() {
    let harness = TestHarness::new();
    let room = RoomId::from("alpha");
    let peer = PeerId::from("peer-a");

    harness.coordinator.get_or_create_room(&room).await.unwrap();
    harness.coordinator.add_peer(&room, &peer).await.unwrap();

    // Transport created but never connected: the peer vanished
    // mid-negotiation.
    let descriptor = harness
        .coordinator
        .create_peer_transport(&peer, &room, TransportDirection::Send)
        .await
        .unwrap();
    assert!(harness.engine.transport_open(descriptor.id.as_str()));

    let removed = harness.coordinator.remove_peer(&peer).await.unwrap();
    assert!(removed.unwrap().room_closed);
    assert!(!harness.engine.transport_open(descriptor.id.as_str()));
    assert_eq!(harness.engine.open_resource_count(), 0);
    assert!(harness.coordinator.registry().is_empty());
}

#[tokio::test]
async fn test_concurrent_get_or_create_room_single_record_and_router() {
    let harness = TestHarness::new();
    let room = RoomId::from("contested");

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let coordinator = Arc::clone(&harness.coordinator);
            let room = room.clone();
            tokio::spawn(async move { coordinator.get_or_create_room(&room).await })
        })
        .collect();

    let mut router_ids = Vec::new();
    for handle in handles {
        router_ids.push(handle.await.unwrap().unwrap().id);
    }

    // Every caller got the same routing context, exactly one durable record
    // exists, and surplus routers were closed.
    router_ids.dedup();
    assert_eq!(router_ids.len(), 1);
    assert_eq!(harness.store.room_count(), 1);
    assert_eq!(harness.coordinator.registry().router_count(), 1);
    assert_eq!(harness.engine.open_router_count(), 1);
}

#[tokio::test]
async fn test_room_is_pinned_to_creating_controller() {
    let store = Arc::new(MemorySessionStore::new());
    let first = TestHarness::with_store(test_config("rc-1"), Arc::clone(&store));
    let second = TestHarness::with_store(test_config("rc-2"), Arc::clone(&store));

    let room = RoomId::from("alpha");
    first.coordinator.get_or_create_room(&room).await.unwrap();

    // The second process must not grow an unbridged duplicate context; it
    // learns where the room lives instead.
    let result = second.coordinator.get_or_create_room(&room).await;
    match result {
        Err(RcError::RoomNotLocal { pinned_to }) => assert_eq!(pinned_to, "rc-1"),
        other => panic!("expected RoomNotLocal, got {other:?}"),
    }
    assert_eq!(second.coordinator.registry().router_count(), 0);
    assert_eq!(second.engine.open_router_count(), 0);
}

#[tokio::test]
async fn test_recording_resources_for_removed_peer_fails() {
    let harness = TestHarness::new();
    let room = RoomId::from("alpha");
    let peer = PeerId::from("peer-a");

    harness.coordinator.get_or_create_room(&room).await.unwrap();
    harness.coordinator.add_peer(&room, &peer).await.unwrap();
    harness.coordinator.remove_peer(&peer).await.unwrap();

    // The room went away with its last member; a dangling transport create
    // for the removed peer must fail and leave nothing open.
    let result = harness
        .coordinator
        .create_peer_transport(&peer, &room, TransportDirection::Send)
        .await;
    assert!(matches!(result, Err(RcError::RoomNotFound(_))));
    assert_eq!(harness.engine.open_resource_count(), 0);
}

#[tokio::test]
async fn test_orphaned_transport_closed_when_peer_vanishes_mid_create() {
    let harness = TestHarness::new();
    let room = RoomId::from("alpha");
    let a = PeerId::from("peer-a");
    let b = PeerId::from("peer-b");

    harness.coordinator.get_or_create_room(&room).await.unwrap();
    harness.coordinator.add_peer(&room, &a).await.unwrap();
    harness.coordinator.add_peer(&room, &b).await.unwrap();

    // B's record disappears while its transport is being created; the
    // append fails, the orphan handle is closed, PeerNotFound surfaces.
    harness.coordinator.remove_peer(&b).await.unwrap();
    let result = harness
        .coordinator
        .create_peer_transport(&b, &room, TransportDirection::Send)
        .await;
    assert!(matches!(result, Err(RcError::PeerNotFound(_))));
    assert_eq!(harness.engine.open_resource_count(), 0);
}

#[tokio::test]
async fn test_lookup_resource_owner() {
    let harness = TestHarness::new();
    let room = RoomId::from("alpha");
    let (peer, transport_id, producer_id) = join_and_produce(&harness, &room, "peer-a").await;

    assert_eq!(
        harness
            .coordinator
            .lookup_resource_owner(transport_id.as_str())
            .unwrap(),
        peer.id
    );
    assert_eq!(
        harness
            .coordinator
            .lookup_resource_owner(producer_id.as_str())
            .unwrap(),
        peer.id
    );
    assert!(matches!(
        harness.coordinator.lookup_resource_owner("trn-999"),
        Err(RcError::ResourceNotFound(_))
    ));
}

#[tokio::test]
async fn test_list_remote_producers_is_complete_and_excludes_requester() {
    let harness = TestHarness::new();
    let room = RoomId::from("alpha");

    let (a, _, a_producer) = join_and_produce(&harness, &room, "peer-a").await;
    let (b, _, b_producer) = join_and_produce(&harness, &room, "peer-b").await;
    let c = PeerId::from("peer-c");
    harness.coordinator.add_peer(&room, &c).await.unwrap();

    // C sees both producers, each attributed to its owner.
    let mut seen = harness
        .coordinator
        .list_remote_producers(&room, &c)
        .await
        .unwrap();
    seen.sort_by(|x, y| x.producer_id.cmp(&y.producer_id));
    let mut expected = vec![
        (a_producer.clone(), a.id.clone()),
        (b_producer.clone(), b.id.clone()),
    ];
    expected.sort_by(|x, y| x.0.cmp(&y.0));
    assert_eq!(
        seen.iter()
            .map(|p| (p.producer_id.clone(), p.peer_id.clone()))
            .collect::<Vec<_>>(),
        expected
    );

    // A never sees its own producer.
    let seen = harness
        .coordinator
        .list_remote_producers(&room, &a.id)
        .await
        .unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].producer_id, b_producer);
}

#[tokio::test]
async fn test_dependent_consumers_closed_and_owners_notified() {
    let harness = TestHarness::new();
    let room = RoomId::from("alpha");

    let (a, _, a_producer) = join_and_produce(&harness, &room, "peer-a").await;
    let (b, _, _) = join_and_produce(&harness, &room, "peer-b").await;

    // B consumes A's stream, with an event stream registered.
    let mut b_events = harness.events.register(b.id.clone());
    let b_recv = harness
        .coordinator
        .create_peer_transport(&b.id, &room, TransportDirection::Recv)
        .await
        .unwrap();
    harness
        .coordinator
        .connect_transport(&b.id, &b_recv.id, dtls_parameters())
        .await
        .unwrap();
    let consumer = harness
        .coordinator
        .consume(&b.id, &b_recv.id, &a_producer, &client_rtp_capabilities())
        .await
        .unwrap();

    // A leaves: B's consumer is closed, its durable record cleaned, and B
    // is told synchronously.
    harness.coordinator.remove_peer(&a.id).await.unwrap();

    assert!(!harness.engine.consumer_open(consumer.id.as_str()));
    let b_record = harness.store.get_peer(&b.id).await.unwrap().unwrap();
    assert!(b_record.consumer_ids.is_empty());
    assert_eq!(
        b_events.try_recv().unwrap(),
        ServerEvent::ConsumerClosed {
            consumer_id: consumer.id,
        }
    );
}

#[tokio::test]
async fn test_consume_rejects_producer_from_another_room() {
    let harness = TestHarness::new();
    let alpha = RoomId::from("alpha");
    let beta = RoomId::from("beta");

    let (_, _, alpha_producer) = join_and_produce(&harness, &alpha, "peer-a").await;
    let (b, _, _) = join_and_produce(&harness, &beta, "peer-b").await;

    let b_recv = harness
        .coordinator
        .create_peer_transport(&b.id, &beta, TransportDirection::Recv)
        .await
        .unwrap();
    harness
        .coordinator
        .connect_transport(&b.id, &b_recv.id, dtls_parameters())
        .await
        .unwrap();

    // Consumers never cross rooms.
    let result = harness
        .coordinator
        .consume(&b.id, &b_recv.id, &alpha_producer, &client_rtp_capabilities())
        .await;
    assert!(matches!(result, Err(RcError::ProducerNotFound(_))));
}

#[tokio::test]
async fn test_engine_death_signal_reaches_embedder() {
    let harness = TestHarness::new();
    let death = harness.coordinator.engine_death();
    assert!(!death.is_cancelled());

    harness.engine.kill_worker();
    assert!(death.is_cancelled());
}
