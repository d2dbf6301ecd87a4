//! Pure negotiation state machine for one session attempt.
//!
//! The driver ([`super::peer_session`]) owns sockets and the peer
//! connection; this machine owns the rules. Every socket frame, channel
//! event, and command becomes a [`SessionEvent`]; the machine answers with
//! the [`SessionEffect`]s to execute. Transitions are plain functions of
//! (current state, event), which keeps the ordering rules and the
//! settle-once/teardown-once guards testable without any I/O.
//!
//! One machine instance lives exactly as long as one negotiation attempt.
//! After teardown it stays in `Disconnected` and drops everything, so late
//! events from resources that are already being released cannot re-enter.

use crate::protocol::SignalingMessage;
use thiserror::Error;
use tracing::{debug, info, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Lifecycle of the session, as observed by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
}

/// Terminal outcomes of a negotiation attempt.
///
/// All of these end the current attempt only; whether to retry is the
/// caller's decision.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Signaler connection failed: {0}")]
    Signaler(String),

    #[error("Signaler assigned no client id")]
    MissingClientId,

    #[error("Connection closed before the channel became ready")]
    ClosedBeforeReady,

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Superseded by a newer connect")]
    Superseded,

    #[error("Cancelled by disconnect")]
    Cancelled,
}

/// Everything that can happen to a live session.
#[derive(Debug)]
pub enum SessionEvent {
    /// The signaling socket finished its handshake.
    SignalingOpen,
    /// A parsed frame from the signaler.
    Signaling(SignalingMessage),
    /// The signaling socket closed or errored out.
    SignalingClosed,
    /// The local offer was created and applied as local description.
    OfferReady(RTCSessionDescription),
    /// A locally gathered ICE candidate to trickle to the host.
    LocalCandidate(RTCIceCandidateInit),
    /// The data channel became writable.
    ChannelOpen,
    /// The data channel closed.
    ChannelClosed,
    /// The peer connection reached failed / disconnected / closed.
    PeerFailed,
    /// A payload arrived on the data channel.
    InboundMessage(serde_json::Value),
    /// The driver hit a terminal error executing an effect.
    Fault(SessionError),
    /// Explicit `disconnect()` from the caller.
    DisconnectRequested,
}

/// Side effects the driver must execute, in order.
#[derive(Debug)]
pub enum SessionEffect {
    SendSignaling(SignalingMessage),
    /// Create the peer connection plus data channel and produce an offer.
    CreatePeer { client_id: String },
    ApplyAnswer(RTCSessionDescription),
    AddIceCandidate(RTCIceCandidateInit),
    /// Hand an inbound channel payload to subscribers, unmodified.
    ForwardMessage(serde_json::Value),
    NotifyConnected,
    ResolveConnect,
    RejectConnect(SessionError),
    /// Release socket / peer / channel and notify closed exactly once.
    Teardown,
}

/// State for one negotiation attempt.
#[derive(Debug)]
pub struct NegotiationMachine {
    state: ConnectionState,
    client_id: Option<String>,
    peer_created: bool,
    settled: bool,
}

impl NegotiationMachine {
    /// A fresh attempt; the caller has just initiated a connect.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
            client_id: None,
            peer_created: false,
            settled: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Dispatch one event.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionEffect> {
        if self.state == ConnectionState::Disconnected {
            debug!("Event after teardown ignored: {:?}", event);
            return Vec::new();
        }

        match event {
            SessionEvent::SignalingOpen => {
                debug!("Signaling socket open; sending hello");
                vec![SessionEffect::SendSignaling(SignalingMessage::ClientHello)]
            }
            SessionEvent::Signaling(message) => self.handle_signaling(message),
            SessionEvent::OfferReady(description) => match &self.client_id {
                Some(id) => vec![SessionEffect::SendSignaling(SignalingMessage::Offer {
                    client_id: id.clone(),
                    description,
                })],
                None => {
                    warn!("Offer ready without a client id; dropping");
                    Vec::new()
                }
            },
            SessionEvent::LocalCandidate(candidate) => match &self.client_id {
                Some(id) => vec![SessionEffect::SendSignaling(
                    SignalingMessage::IceCandidate {
                        client_id: id.clone(),
                        candidate,
                    },
                )],
                None => Vec::new(),
            },
            SessionEvent::ChannelOpen => {
                info!("Data channel open; session ready");
                self.state = ConnectionState::Ready;
                let mut effects = vec![SessionEffect::NotifyConnected];
                if !self.settled {
                    self.settled = true;
                    effects.push(SessionEffect::ResolveConnect);
                }
                effects
            }
            SessionEvent::InboundMessage(value) => {
                vec![SessionEffect::ForwardMessage(value)]
            }
            SessionEvent::ChannelClosed => {
                info!("Data channel closed");
                self.teardown(SessionError::ClosedBeforeReady)
            }
            SessionEvent::PeerFailed => {
                warn!("Peer connection failed");
                self.teardown(SessionError::Negotiation(
                    "peer connection failed".to_string(),
                ))
            }
            SessionEvent::SignalingClosed => {
                info!("Signaling socket closed");
                self.teardown(SessionError::ClosedBeforeReady)
            }
            SessionEvent::Fault(error) => {
                warn!("Session fault: {}", error);
                self.teardown(error)
            }
            SessionEvent::DisconnectRequested => {
                info!("Disconnect requested");
                self.teardown(SessionError::Cancelled)
            }
        }
    }

    fn handle_signaling(&mut self, message: SignalingMessage) -> Vec<SessionEffect> {
        match message {
            SignalingMessage::ClientWelcome { client_id, has_host } => {
                if self.peer_created {
                    debug!("Duplicate client-welcome ignored");
                    return Vec::new();
                }
                let id = client_id.trim().to_string();
                if id.is_empty() {
                    warn!("Signaler sent a welcome without a client id");
                    return self.teardown(SessionError::MissingClientId);
                }
                info!("Assigned client id {} (host present: {})", id, has_host);
                self.client_id = Some(id.clone());
                self.peer_created = true;
                vec![SessionEffect::CreatePeer { client_id: id }]
            }
            SignalingMessage::Answer { client_id, description } => {
                if !self.accepts(&client_id) {
                    debug!("Dropping answer for id {:?}", client_id);
                    return Vec::new();
                }
                if self.state == ConnectionState::Ready {
                    debug!("Answer after ready ignored");
                    return Vec::new();
                }
                vec![SessionEffect::ApplyAnswer(description)]
            }
            SignalingMessage::IceCandidate { client_id, candidate } => {
                if !self.accepts(&client_id) {
                    debug!("Dropping candidate for id {:?}", client_id);
                    return Vec::new();
                }
                vec![SessionEffect::AddIceCandidate(candidate)]
            }
            SignalingMessage::HostRegistered => {
                debug!("Host registered on the signaler");
                Vec::new()
            }
            SignalingMessage::HostDisconnected => {
                info!("Host disconnected");
                self.teardown(SessionError::ClosedBeforeReady)
            }
            // client-bound kinds echoed back are not for us
            other => {
                debug!("Ignoring unexpected signaling message: {:?}", other);
                Vec::new()
            }
        }
    }

    /// A signaling payload is accepted only when the peer connection
    /// exists and the embedded id matches the recorded one. Mismatches
    /// are stale or duplicated frames, never errors.
    fn accepts(&self, client_id: &str) -> bool {
        self.peer_created && self.client_id.as_deref() == Some(client_id)
    }

    /// Single teardown path. The state flips to `Disconnected` before the
    /// effects run, so concurrent triggers collapse into one teardown and
    /// one closed notification.
    fn teardown(&mut self, reason: SessionError) -> Vec<SessionEffect> {
        if self.state == ConnectionState::Disconnected {
            return Vec::new();
        }
        self.state = ConnectionState::Disconnected;
        self.client_id = None;
        self.peer_created = false;

        let mut effects = Vec::new();
        if !self.settled {
            self.settled = true;
            effects.push(SessionEffect::RejectConnect(reason));
        }
        effects.push(SessionEffect::Teardown);
        effects
    }
}

impl Default for NegotiationMachine {
    fn default() -> Self {
        Self::new()
    }
}
