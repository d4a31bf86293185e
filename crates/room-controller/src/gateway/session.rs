//! Per-peer signaling state machine.
//!
//! One [`PeerSession`] per peer connection. The embedding message transport
//! decodes requests off its ordered channel, feeds them to
//! [`PeerSession::handle`] one at a time, and forwards pushed
//! [`ServerEvent`]s from the stream returned by
//! [`PeerSession::take_events`]. Connection loss calls
//! [`PeerSession::disconnect`], which shares the idempotent close path with
//! the explicit `leave` RPC.

use super::events::EventRouter;
use super::messages::{ServerEvent, SignalingRequest, SignalingResponse};
use crate::coordinator::SessionCoordinator;
use crate::engine::TransportDirection;
use crate::errors::RcError;
use crate::types::{PeerId, RoomId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Protocol state of one peer connection.
///
/// `Closed` is reachable from every state, including mid-negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Joined,
    Negotiating,
    Active,
    Closed,
}

impl SessionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connected => "connected",
            SessionState::Joined => "joined",
            SessionState::Negotiating => "negotiating",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        }
    }
}

/// Per-peer protocol state machine over the coordinator.
pub struct PeerSession {
    peer_id: PeerId,
    state: SessionState,
    room_id: Option<RoomId>,
    coordinator: Arc<SessionCoordinator>,
    events: Arc<EventRouter>,
    event_rx: Option<mpsc::UnboundedReceiver<ServerEvent>>,
}

impl PeerSession {
    #[must_use]
    pub fn new(
        peer_id: PeerId,
        coordinator: Arc<SessionCoordinator>,
        events: Arc<EventRouter>,
    ) -> Self {
        Self {
            peer_id,
            state: SessionState::Connected,
            room_id: None,
            coordinator,
            events,
            event_rx: None,
        }
    }

    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn room_id(&self) -> Option<&RoomId> {
        self.room_id.as_ref()
    }

    /// Take the server-to-peer event stream. Available after a successful
    /// join; the embedding transport forwards these to the client.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ServerEvent>> {
        self.event_rx.take()
    }

    /// Handle one signaling request and return its reply. Requests on a
    /// connection arrive in order; errors never tear the session down.
    pub async fn handle(&mut self, request: SignalingRequest) -> SignalingResponse {
        let name = request.name();
        debug!(
            target: "rc.gateway",
            peer_id = %self.peer_id,
            request = name,
            state = self.state.as_str(),
            "Handling request"
        );

        match self.dispatch(request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    target: "rc.gateway",
                    peer_id = %self.peer_id,
                    request = name,
                    state = self.state.as_str(),
                    error = %error,
                    "Request failed"
                );
                SignalingResponse::from_error(&error)
            }
        }
    }

    /// Abrupt connection loss. Shares the idempotent close path with the
    /// `leave` RPC, so duplicate disconnect events are no-ops.
    pub async fn disconnect(&mut self) {
        let _ = self.close("connection loss").await;
    }

    async fn dispatch(&mut self, request: SignalingRequest) -> Result<SignalingResponse, RcError> {
        match request {
            SignalingRequest::CreateRoom { room_id } => self.join_room(room_id, true).await,
            SignalingRequest::Join { room_id } => self.join_room(room_id, false).await,

            SignalingRequest::GetRtpCapabilities { room_id } => {
                self.ensure(
                    &[
                        SessionState::Joined,
                        SessionState::Negotiating,
                        SessionState::Active,
                    ],
                    "get-rtp-capabilities",
                )?;
                if self.room_id.as_ref() != Some(&room_id) {
                    return Err(RcError::RoomNotFound(room_id.to_string()));
                }
                let router_rtp_capabilities = self.coordinator.room_rtp_capabilities(&room_id)?;
                Ok(SignalingResponse::RouterCapabilities {
                    router_rtp_capabilities,
                })
            }

            SignalingRequest::CreateTransport { is_producer } => {
                self.ensure(
                    &[SessionState::Joined, SessionState::Negotiating],
                    "create-transport",
                )?;
                let room_id = self.require_room()?.clone();
                let direction = if is_producer {
                    TransportDirection::Send
                } else {
                    TransportDirection::Recv
                };
                let descriptor = self
                    .coordinator
                    .create_peer_transport(&self.peer_id, &room_id, direction)
                    .await?;
                self.state = SessionState::Negotiating;
                Ok(SignalingResponse::Transport(descriptor))
            }

            SignalingRequest::ConnectTransport {
                transport_id,
                dtls_parameters,
            } => {
                self.ensure(
                    &[SessionState::Negotiating, SessionState::Active],
                    "connect-transport",
                )?;
                self.coordinator
                    .connect_transport(&self.peer_id, &transport_id, dtls_parameters)
                    .await?;
                Ok(SignalingResponse::Success { success: true })
            }

            SignalingRequest::Produce {
                transport_id,
                kind,
                rtp_parameters,
            } => {
                self.ensure(&[SessionState::Negotiating, SessionState::Active], "produce")?;
                let id = self
                    .coordinator
                    .produce(&self.peer_id, &transport_id, kind, rtp_parameters)
                    .await?;
                // At least one producer exists now.
                self.state = SessionState::Active;
                Ok(SignalingResponse::Produced { id })
            }

            SignalingRequest::Consume {
                transport_id,
                producer_id,
                rtp_capabilities,
            } => {
                self.ensure(&[SessionState::Negotiating, SessionState::Active], "consume")?;
                let descriptor = self
                    .coordinator
                    .consume(&self.peer_id, &transport_id, &producer_id, &rtp_capabilities)
                    .await?;
                Ok(SignalingResponse::Consumer(descriptor))
            }

            SignalingRequest::Resume { consumer_id } => {
                self.ensure(&[SessionState::Negotiating, SessionState::Active], "resume")?;
                self.coordinator
                    .resume_consumer(&self.peer_id, &consumer_id)
                    .await?;
                Ok(SignalingResponse::Success { success: true })
            }

            SignalingRequest::Leave { .. } => Ok(self.close("leave").await),
        }
    }

    async fn join_room(
        &mut self,
        room_id: RoomId,
        create_only: bool,
    ) -> Result<SignalingResponse, RcError> {
        self.ensure(
            &[SessionState::Connected],
            if create_only { "create-room" } else { "join" },
        )?;

        let router = if create_only {
            self.coordinator.create_room(&room_id).await?
        } else {
            self.coordinator.get_or_create_room(&room_id).await?
        };
        self.coordinator.add_peer(&room_id, &self.peer_id).await?;

        self.event_rx = Some(self.events.register(self.peer_id.clone()));
        self.room_id = Some(room_id.clone());
        self.state = SessionState::Joined;
        info!(
            target: "rc.gateway",
            peer_id = %self.peer_id,
            room_id = %room_id,
            "Peer joined room"
        );

        if create_only {
            Ok(SignalingResponse::RouterCapabilities {
                router_rtp_capabilities: router.rtp_capabilities,
            })
        } else {
            let producers_data = self
                .coordinator
                .list_remote_producers(&room_id, &self.peer_id)
                .await?;
            Ok(SignalingResponse::Producers { producers_data })
        }
    }

    /// Shared close path for `leave` and connection loss. Always leaves the
    /// session in `Closed`; cleanup failures are logged, never surfaced,
    /// because a stalled or broken peer must still be removable.
    async fn close(&mut self, reason: &str) -> SignalingResponse {
        if self.state == SessionState::Closed {
            return SignalingResponse::Empty {};
        }

        self.events.unregister(&self.peer_id);

        match self.coordinator.remove_peer(&self.peer_id).await {
            Ok(Some(removed)) => {
                if !removed.room_closed {
                    match self.coordinator.room_members(&removed.room_id).await {
                        Ok(members) => {
                            self.events.broadcast(
                                &members,
                                &self.peer_id,
                                &ServerEvent::PeerLeft {
                                    peer_id: self.peer_id.clone(),
                                },
                            );
                        }
                        Err(e) => warn!(
                            target: "rc.gateway",
                            error = %e,
                            peer_id = %self.peer_id,
                            "Failed to notify remaining members"
                        ),
                    }
                }
                info!(
                    target: "rc.gateway",
                    peer_id = %self.peer_id,
                    room_id = %removed.room_id,
                    reason = reason,
                    "Session closed"
                );
            }
            Ok(None) => {
                debug!(
                    target: "rc.gateway",
                    peer_id = %self.peer_id,
                    reason = reason,
                    "Session closed without room membership"
                );
            }
            Err(e) => {
                warn!(
                    target: "rc.gateway",
                    error = %e,
                    peer_id = %self.peer_id,
                    "Cleanup failed during session close"
                );
            }
        }

        self.state = SessionState::Closed;
        self.room_id = None;
        SignalingResponse::Empty {}
    }

    fn ensure(&self, allowed: &[SessionState], request: &'static str) -> Result<(), RcError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RcError::InvalidState {
                state: self.state.as_str(),
                request,
            })
        }
    }

    fn require_room(&self) -> Result<&RoomId, RcError> {
        self.room_id.as_ref().ok_or(RcError::InvalidState {
            state: self.state.as_str(),
            request: "create-transport",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(SessionState::Connected.as_str(), "connected");
        assert_eq!(SessionState::Joined.as_str(), "joined");
        assert_eq!(SessionState::Negotiating.as_str(), "negotiating");
        assert_eq!(SessionState::Active.as_str(), "active");
        assert_eq!(SessionState::Closed.as_str(), "closed");
    }
}
