//! Session driver: signaling socket, peer connection, data channel.
//!
//! One actor task owns every network resource of the live session and
//! runs the [`NegotiationMachine`] over the events they produce. Commands
//! arrive from [`PeerSessionHandle`]; webrtc callbacks and the socket
//! reader push into the same event queue, so everything is processed
//! sequentially and teardown can never race a handler.
//!
//! Late callbacks are a real hazard here: a superseded session's channel
//! can fire `close` after the next session already started negotiating.
//! Every event therefore carries the epoch it was wired under and the
//! actor drops events from past epochs.

use crate::protocol::SignalingMessage;
use crate::session::negotiation::{
    ConnectionState, NegotiationMachine, SessionEffect, SessionError, SessionEvent,
};
use futures_util::stream::{SplitSink, SplitStream, StreamExt};
use futures_util::SinkExt;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// What the session reports upward, in arrival order.
#[derive(Debug, Clone)]
pub enum SessionNotification {
    /// The data channel became writable.
    Connected,
    /// The session finished tearing down. Emitted once per teardown.
    Closed,
    /// An inbound data-channel payload, unmodified.
    Message(serde_json::Value),
}

enum Command {
    Connect {
        done: oneshot::Sender<Result<(), SessionError>>,
    },
    Disconnect,
    SendText(String),
}

/// Cheap-to-clone handle over the session actor.
#[derive(Debug, Clone)]
pub struct PeerSessionHandle {
    commands: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl PeerSessionHandle {
    /// Spawn the session actor. At most one negotiation is live at a
    /// time; a later `connect` forces teardown of the previous one.
    pub fn spawn(
        signaler_url: String,
        notifications: mpsc::Sender<SessionNotification>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            signaler_url,
            commands: command_rx,
            notifications,
            state_tx,
            event_tx,
            event_rx,
            machine: None,
            pending: None,
            signaling_sink: None,
            signaling_reader: None,
            peer: None,
            channel: None,
            epoch: 0,
        };
        tokio::spawn(actor.run());

        Self {
            commands: command_tx,
            state_rx,
        }
    }

    /// Start (or restart) a session. Resolves once the data channel is
    /// writable; rejects on any terminal failure before that point.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let (done, result) = oneshot::channel();
        self.commands
            .send(Command::Connect { done })
            .await
            .map_err(|_| SessionError::Signaler("session task terminated".to_string()))?;
        result
            .await
            .map_err(|_| SessionError::Signaler("session task terminated".to_string()))?
    }

    /// Always safe, any number of times, from any state.
    pub fn disconnect(&self) {
        if self.commands.try_send(Command::Disconnect).is_err() {
            debug!("Session task not accepting commands");
        }
    }

    /// Queue a data-channel text frame. Dropped silently while the
    /// channel is not open: state messages are latest-wins.
    pub fn send_text(&self, text: String) {
        if self.commands.try_send(Command::SendText(text)).is_err() {
            debug!("Session command queue full; dropping outbound message");
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Ready
    }
}

struct SessionActor {
    signaler_url: String,
    commands: mpsc::Receiver<Command>,
    notifications: mpsc::Sender<SessionNotification>,
    state_tx: watch::Sender<ConnectionState>,

    event_tx: mpsc::UnboundedSender<(u64, SessionEvent)>,
    event_rx: mpsc::UnboundedReceiver<(u64, SessionEvent)>,

    /// One machine per negotiation attempt; `None` while idle.
    machine: Option<NegotiationMachine>,
    pending: Option<oneshot::Sender<Result<(), SessionError>>>,

    signaling_sink: Option<WsSink>,
    signaling_reader: Option<JoinHandle<()>>,
    peer: Option<Arc<RTCPeerConnection>>,
    channel: Option<Arc<RTCDataChannel>>,

    /// Bumped on every connect and teardown; events from other epochs
    /// belong to resources that are already gone.
    epoch: u64,
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Connect { done }) => self.start_connect(done).await,
                    Some(Command::Disconnect) => {
                        self.dispatch(SessionEvent::DisconnectRequested).await;
                    }
                    Some(Command::SendText(text)) => self.send_channel_text(text).await,
                    None => {
                        // every handle dropped; shut the session down
                        self.dispatch(SessionEvent::DisconnectRequested).await;
                        break;
                    }
                },
                Some((epoch, event)) = self.event_rx.recv() => {
                    if epoch == self.epoch {
                        self.dispatch(event).await;
                    } else {
                        debug!("Dropping stale event from epoch {}: {:?}", epoch, event);
                    }
                }
            }
        }
        debug!("Session actor exited");
    }

    /// Begin a fresh negotiation, superseding any live one first.
    async fn start_connect(&mut self, done: oneshot::Sender<Result<(), SessionError>>) {
        if self.machine.is_some() {
            info!("Connect while a session is live; tearing the old one down");
            self.dispatch(SessionEvent::Fault(SessionError::Superseded)).await;
        }

        self.epoch += 1;
        self.machine = Some(NegotiationMachine::new());
        self.pending = Some(done);
        self.publish_state();

        info!("Connecting to signaler at {}", self.signaler_url);
        match connect_async(self.signaler_url.as_str()).await {
            Ok((stream, _response)) => {
                let (sink, reader) = stream.split();
                self.signaling_sink = Some(sink);
                self.signaling_reader = Some(self.spawn_signaling_reader(reader));
                self.dispatch(SessionEvent::SignalingOpen).await;
            }
            Err(e) => {
                warn!("Signaler connection failed: {}", e);
                self.dispatch(SessionEvent::Fault(SessionError::Signaler(e.to_string())))
                    .await;
            }
        }
    }

    fn spawn_signaling_reader(&self, mut reader: WsReader) -> JoinHandle<()> {
        let events = self.event_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if let Some(message) = SignalingMessage::parse(&text) {
                            let _ = events.send((epoch, SessionEvent::Signaling(message)));
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {} // ping/pong/binary are not part of the protocol
                    Err(e) => {
                        debug!("Signaling socket read error: {}", e);
                        break;
                    }
                }
            }
            let _ = events.send((epoch, SessionEvent::SignalingClosed));
        })
    }

    async fn dispatch(&mut self, event: SessionEvent) {
        let Some(machine) = self.machine.as_mut() else {
            debug!("No live session; ignoring {:?}", event);
            return;
        };
        let effects = machine.handle(event);
        if machine.state() == ConnectionState::Disconnected {
            self.machine = None;
        }
        self.execute(effects).await;
        self.publish_state();
    }

    async fn execute(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::SendSignaling(message) => self.send_signaling(message).await,
                SessionEffect::CreatePeer { client_id } => {
                    if let Err(e) = self.create_peer().await {
                        error!("Failed to create peer connection for {}: {}", client_id, e);
                        let _ = self.event_tx.send((self.epoch, SessionEvent::Fault(e)));
                    }
                }
                SessionEffect::ApplyAnswer(description) => {
                    if let Some(peer) = &self.peer {
                        if let Err(e) = peer.set_remote_description(description).await {
                            // the host may retry with a fresh answer
                            warn!("Failed to apply answer: {}", e);
                        }
                    }
                }
                SessionEffect::AddIceCandidate(candidate) => {
                    if let Some(peer) = &self.peer {
                        if let Err(e) = peer.add_ice_candidate(candidate).await {
                            // candidate loss is survivable; others may pair
                            warn!("Failed to add ICE candidate: {}", e);
                        }
                    }
                }
                SessionEffect::ForwardMessage(value) => {
                    if self
                        .notifications
                        .send(SessionNotification::Message(value))
                        .await
                        .is_err()
                    {
                        debug!("No notification subscriber; inbound payload dropped");
                    }
                }
                SessionEffect::NotifyConnected => {
                    let _ = self.notifications.send(SessionNotification::Connected).await;
                }
                SessionEffect::ResolveConnect => {
                    if let Some(pending) = self.pending.take() {
                        let _ = pending.send(Ok(()));
                    }
                }
                SessionEffect::RejectConnect(error) => {
                    if let Some(pending) = self.pending.take() {
                        let _ = pending.send(Err(error));
                    }
                }
                SessionEffect::Teardown => self.release_resources().await,
            }
        }
    }

    async fn send_signaling(&mut self, message: SignalingMessage) {
        let Some(sink) = self.signaling_sink.as_mut() else {
            debug!("No signaling socket; dropping outbound message");
            return;
        };
        match message.to_json() {
            Ok(text) => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!("Signaling send failed: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode signaling message: {}", e),
        }
    }

    /// Build the peer connection and the `controller` channel, wire their
    /// callbacks into the event queue, and produce the local offer.
    async fn create_peer(&mut self) -> Result<(), SessionError> {
        let negotiation = |e: webrtc::Error| SessionError::Negotiation(e.to_string());

        let mut media = MediaEngine::default();
        let registry =
            register_default_interceptors(Registry::new(), &mut media).map_err(negotiation)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        // Host-only ICE: the host lives on the local network, no STUN/TURN.
        let peer = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .map_err(negotiation)?,
        );

        let events = self.event_tx.clone();
        let epoch = self.epoch;
        peer.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let events = events.clone();
            Box::pin(async move {
                debug!("Peer connection state: {}", state);
                if matches!(
                    state,
                    RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Disconnected
                        | RTCPeerConnectionState::Closed
                ) {
                    let _ = events.send((epoch, SessionEvent::PeerFailed));
                }
            })
        }));

        let events = self.event_tx.clone();
        peer.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = events.clone();
            Box::pin(async move {
                if let Some(candidate) = candidate {
                    match candidate.to_json() {
                        Ok(init) => {
                            let _ = events.send((epoch, SessionEvent::LocalCandidate(init)));
                        }
                        Err(e) => warn!("Failed to serialize local candidate: {}", e),
                    }
                }
            })
        }));

        // We are the offerer, so we create the channel.
        let channel = peer
            .create_data_channel("controller", None)
            .await
            .map_err(negotiation)?;

        let events = self.event_tx.clone();
        channel.on_open(Box::new(move || {
            let events = events.clone();
            Box::pin(async move {
                let _ = events.send((epoch, SessionEvent::ChannelOpen));
            })
        }));

        let events = self.event_tx.clone();
        channel.on_close(Box::new(move || {
            let events = events.clone();
            Box::pin(async move {
                let _ = events.send((epoch, SessionEvent::ChannelClosed));
            })
        }));

        let events = self.event_tx.clone();
        channel.on_message(Box::new(move |message: DataChannelMessage| {
            let events = events.clone();
            Box::pin(async move {
                match serde_json::from_slice::<serde_json::Value>(&message.data) {
                    Ok(value) => {
                        let _ = events.send((epoch, SessionEvent::InboundMessage(value)));
                    }
                    Err(_) => debug!("Non-JSON data channel payload dropped"),
                }
            })
        }));

        let offer = peer.create_offer(None).await.map_err(negotiation)?;
        peer.set_local_description(offer).await.map_err(negotiation)?;
        let local = peer
            .local_description()
            .await
            .ok_or_else(|| SessionError::Negotiation("no local description".to_string()))?;

        let _ = self
            .event_tx
            .send((self.epoch, SessionEvent::OfferReady(local)));

        self.peer = Some(peer);
        self.channel = Some(channel);
        Ok(())
    }

    async fn send_channel_text(&self, text: String) {
        let Some(channel) = &self.channel else {
            debug!("No data channel; dropping outbound message");
            return;
        };
        if channel.ready_state() != RTCDataChannelState::Open {
            debug!("Data channel not open; dropping outbound message");
            return;
        }
        if let Err(e) = channel.send_text(text).await {
            warn!("Data channel send failed: {}", e);
        }
    }

    /// Release channel, peer connection, and socket, detaching handlers
    /// first so their close events cannot re-enter teardown. Closing an
    /// already-closed resource only earns a debug line.
    async fn release_resources(&mut self) {
        debug!("Releasing session resources");
        self.epoch += 1;

        if let Some(reader) = self.signaling_reader.take() {
            reader.abort();
        }

        if let Some(channel) = self.channel.take() {
            channel.on_open(Box::new(|| Box::pin(async {})));
            channel.on_close(Box::new(|| Box::pin(async {})));
            channel.on_message(Box::new(|_: DataChannelMessage| Box::pin(async {})));
            if let Err(e) = channel.close().await {
                debug!("Data channel close: {}", e);
            }
        }

        if let Some(peer) = self.peer.take() {
            peer.on_peer_connection_state_change(Box::new(|_: RTCPeerConnectionState| {
                Box::pin(async {})
            }));
            peer.on_ice_candidate(Box::new(|_: Option<RTCIceCandidate>| Box::pin(async {})));
            if let Err(e) = peer.close().await {
                debug!("Peer connection close: {}", e);
            }
        }

        if let Some(mut sink) = self.signaling_sink.take() {
            if let Err(e) = sink.close().await {
                debug!("Signaling socket close: {}", e);
            }
        }

        if self
            .notifications
            .send(SessionNotification::Closed)
            .await
            .is_err()
        {
            debug!("No notification subscriber for close");
        }
        info!("Session torn down");
    }

    fn publish_state(&self) {
        let state = self
            .machine
            .as_ref()
            .map(|m| m.state())
            .unwrap_or(ConnectionState::Disconnected);
        self.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
    }
}
