//! Transport façade for the UI layer.
//!
//! One object with the four calls a control surface needs — `connect`,
//! `disconnect`, `send`, `is_connected` — plus the press/release entry
//! points that route through the [`InputAggregator`]. Aggregated updates
//! become state messages immediately; there is no batching for discrete
//! button events. Inbound channel payloads and session lifecycle changes
//! fan out to the caller as [`TransportEvent`]s.

use crate::device::DeviceInfo;
use crate::input::aggregator::{Cardinal, InputAggregator, PadInput};
use crate::protocol::{ChannelMessage, StateMessage};
use crate::session::negotiation::{ConnectionState, SessionError};
use crate::session::peer_session::{PeerSessionHandle, SessionNotification};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Which shoulder a shoulder press belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShoulderSide {
    Left,
    Right,
}

/// Session lifecycle and inbound traffic, fanned out to the UI layer.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The data channel opened; the hello has already been sent.
    Connected,
    /// The session tore down. Emitted once per teardown.
    Closed,
    /// Inbound data-channel payload, unmodified.
    Message(serde_json::Value),
}

/// Cheap-to-clone handle bundling the session with the input aggregator.
#[derive(Debug, Clone)]
pub struct Transport {
    session: PeerSessionHandle,
    aggregator: Arc<Mutex<InputAggregator>>,
}

impl Transport {
    /// Spawn the session actor and the event pump. `events` receives the
    /// fan-out; drop the receiver if you only ever poll `is_connected`.
    pub fn spawn(
        signaler_url: String,
        device_tag: String,
        device_info: DeviceInfo,
        events: mpsc::Sender<TransportEvent>,
    ) -> Self {
        let (notify_tx, notify_rx) = mpsc::channel(64);
        let session = PeerSessionHandle::spawn(signaler_url, notify_tx);
        let transport = Self {
            session,
            aggregator: Arc::new(Mutex::new(InputAggregator::new())),
        };

        tokio::spawn(run_event_pump(
            notify_rx,
            events,
            transport.clone(),
            ChannelMessage::Hello {
                device_tag,
                device_info,
            },
        ));
        transport
    }

    /// Establish (or re-establish) the session. A connect while one is
    /// live tears the old one down first.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.session.connect().await
    }

    pub fn disconnect(&self) {
        self.session.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Queue an outbound channel message. Silently dropped while the
    /// channel is not open.
    pub fn send(&self, message: &ChannelMessage) {
        match message.to_json() {
            Ok(text) => self.session.send_text(text),
            Err(e) => warn!("Failed to encode channel message: {}", e),
        }
    }

    pub fn send_state(&self, state: StateMessage) {
        self.send(&ChannelMessage::State(state));
    }

    /// Named button press/release, passed through as-is.
    pub fn press_button(&self, name: &str, down: bool) {
        self.send_state(StateMessage::button(name, down));
    }

    /// Directional-pad claim; the aggregator resolves overlaps.
    pub fn press_pad(&self, input: PadInput, down: bool) {
        let patch = self.lock_aggregator().pad_input(input, down);
        self.send_state(patch);
    }

    /// Virtual-stick claim; the aggregator resolves overlaps.
    pub fn press_stick(&self, cardinal: Cardinal, down: bool) {
        let patch = self.lock_aggregator().stick_input(cardinal, down);
        self.send_state(patch);
    }

    /// Shoulder press: the first pair are plain buttons, the second pair
    /// the analog triggers driven digitally.
    pub fn press_shoulder(&self, side: ShoulderSide, which: u8, down: bool) {
        let value = if down { 1.0 } else { 0.0 };
        match (side, which) {
            (ShoulderSide::Left, 2) => self.send_state(StateMessage::left_trigger(value)),
            (ShoulderSide::Right, 2) => self.send_state(StateMessage::right_trigger(value)),
            (ShoulderSide::Left, _) => self.press_button("SHOULDER_LEFT", down),
            (ShoulderSide::Right, _) => self.press_button("SHOULDER_RIGHT", down),
        }
    }

    /// Direct axis patch, for proportional sources.
    pub fn set_axis(&self, patch: StateMessage) {
        self.send_state(patch);
    }

    /// Explicit input teardown; the one place counters are reset.
    pub fn clear_input(&self) {
        self.lock_aggregator().clear();
    }

    fn lock_aggregator(&self) -> std::sync::MutexGuard<'_, InputAggregator> {
        // a poisoned lock still holds valid counters
        self.aggregator.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Forward session notifications to the UI layer, sending the hello as
/// soon as the channel opens.
async fn run_event_pump(
    mut notifications: mpsc::Receiver<SessionNotification>,
    events: mpsc::Sender<TransportEvent>,
    transport: Transport,
    hello: ChannelMessage,
) {
    while let Some(notification) = notifications.recv().await {
        let event = match notification {
            SessionNotification::Connected => {
                info!("Session ready; sending hello");
                transport.send(&hello);
                TransportEvent::Connected
            }
            SessionNotification::Closed => TransportEvent::Closed,
            SessionNotification::Message(value) => TransportEvent::Message(value),
        };
        if events.send(event).await.is_err() {
            debug!("Transport event subscriber gone");
        }
    }
    debug!("Session notification stream ended");
}
