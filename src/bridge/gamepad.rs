//! Gamepad event collection for the reference client.
//!
//! Polls gilrs in a tight loop and replays every event through the
//! transport: dpad buttons become pad claims, face buttons become named
//! button presses, sticks become axis patches, triggers become lt/rt.
//! The machine moves through two states: `Initializing` while the
//! backend and an active gamepad are located, then `Collecting`.

use crate::input::aggregator::PadInput;
use crate::protocol::StateMessage;
use crate::session::transport::{ShoulderSide, Transport};
use chrono::Local;
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use tracing::{debug, error, info, warn};

/// Collector settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Analog stick deadzone as a fraction (0.0-1.0).
    pub stick_deadzone: f32,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            stick_deadzone: 0.05,
        }
    }
}

/// Collector errors.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to initialize gamepad backend: {0}")]
    InitializationError(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum BridgeState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct GamepadBridge<S: BridgeState> {
    // Gilrs context
    gilrs: Gilrs,

    // Active gamepad
    active_gamepad: Option<GamepadId>,

    settings: BridgeSettings,

    // Where translated events go
    transport: Transport,

    // Last seen stick values, per axis, post-deadzone
    last_left: (f32, f32),
    last_right: (f32, f32),
}

impl GamepadBridge<Initializing> {
    pub fn create(
        settings: Option<BridgeSettings>,
        transport: Transport,
    ) -> Result<Self, BridgeError> {
        let settings = settings.unwrap_or_default();
        debug!("Creating gamepad bridge with settings: {:?}", settings);

        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Gamepad backend initialized");
                g
            }
            Err(e) => {
                error!("Failed to initialize gamepad backend: {}", e);
                return Err(BridgeError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(
            gilrs,
            None,
            settings,
            transport,
            (0.0, 0.0),
            (0.0, 0.0),
        ))
    }

    /// Pick an active gamepad and transition to collecting.
    pub fn initialize(mut self) -> Result<GamepadBridge<Collecting>, BridgeError> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, continuing in idle mode");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
                info!("  [{}] ID: {}, Name: {}", idx, id, gamepad.name());
            }
            let (id, gamepad) = &gamepads[0];
            self.active_gamepad = Some(*id);
            info!("Selected gamepad: {} ({})", gamepad.name(), id);
        }

        info!("Gamepad bridge initialized, transitioning to Collecting state");
        Ok(self.transition())
    }
}

impl GamepadBridge<Collecting> {
    /// Drain one event from the queue, if any, and replay it.
    pub fn collect_next_event(&mut self) {
        if let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            if let Some(active_id) = self.active_gamepad {
                if id != active_id {
                    debug!("Skipping event from non-active gamepad: {:?}", id);
                    return;
                }
            }
            self.replay_event(event);
        }
    }

    /// Run the collector until the transport's session task goes away.
    /// Polling at sub-millisecond cadence keeps latency low without
    /// saturating a core.
    pub fn run_collection_loop(&mut self) {
        info!("Starting gamepad collection loop");

        let mut event_count: u64 = 0;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(10);

        loop {
            self.collect_next_event();
            event_count += 1;

            let now = Local::now();
            if now - last_log_time > log_interval {
                debug!(
                    "Gamepad bridge: {} polls in the last {} seconds",
                    event_count,
                    log_interval.num_seconds()
                );
                event_count = 0;
                last_log_time = now;
            }

            std::thread::sleep(std::time::Duration::from_micros(100));
        }
    }

    fn replay_event(&mut self, event: EventType) {
        match event {
            EventType::AxisChanged(axis, value, _) => {
                let value = apply_deadzone(value, self.settings.stick_deadzone);
                match axis {
                    Axis::LeftStickX => {
                        self.last_left.0 = value;
                        let (x, y) = self.last_left;
                        self.transport
                            .set_axis(StateMessage::left_axis(x as f64, y as f64));
                    }
                    Axis::LeftStickY => {
                        self.last_left.1 = value;
                        let (x, y) = self.last_left;
                        self.transport
                            .set_axis(StateMessage::left_axis(x as f64, y as f64));
                    }
                    Axis::RightStickX => {
                        self.last_right.0 = value;
                        let (x, y) = self.last_right;
                        self.transport
                            .set_axis(StateMessage::right_axis(x as f64, y as f64));
                    }
                    Axis::RightStickY => {
                        self.last_right.1 = value;
                        let (x, y) = self.last_right;
                        self.transport
                            .set_axis(StateMessage::right_axis(x as f64, y as f64));
                    }
                    Axis::LeftZ => {
                        self.transport
                            .set_axis(StateMessage::left_trigger(value as f64));
                    }
                    Axis::RightZ => {
                        self.transport
                            .set_axis(StateMessage::right_trigger(value as f64));
                    }
                    _ => debug!("Ignoring unsupported axis: {:?}", axis),
                }
            }
            EventType::ButtonPressed(button, _) => self.replay_button(button, true),
            EventType::ButtonReleased(button, _) => self.replay_button(button, false),
            EventType::ButtonRepeated(button, _) => {
                debug!("Button repeat ignored: {:?}", button);
            }
            EventType::Connected => {
                info!("Gamepad connected event detected");
            }
            EventType::Disconnected => {
                warn!("Gamepad disconnected event detected");
            }
            _ => debug!("Unhandled gamepad event: {:?}", event),
        }
    }

    fn replay_button(&mut self, button: Button, down: bool) {
        if let Some(pad) = map_dpad(button) {
            self.transport.press_pad(pad, down);
            return;
        }
        match button {
            Button::LeftTrigger => self.transport.press_shoulder(ShoulderSide::Left, 1, down),
            Button::RightTrigger => self.transport.press_shoulder(ShoulderSide::Right, 1, down),
            Button::LeftTrigger2 => self.transport.press_shoulder(ShoulderSide::Left, 2, down),
            Button::RightTrigger2 => self.transport.press_shoulder(ShoulderSide::Right, 2, down),
            other => match map_button(other) {
                Some(name) => self.transport.press_button(name, down),
                None => debug!("Unmapped button ignored: {:?}", other),
            },
        }
    }
}

/// Public interface for spawning and running the bridge.
pub struct GamepadBridgeHandle {}

impl GamepadBridgeHandle {
    /// Create the bridge and spawn its collection loop.
    pub fn spawn(
        settings: Option<BridgeSettings>,
        transport: Transport,
    ) -> Result<Self, BridgeError> {
        info!("Spawning gamepad bridge with settings: {:?}", settings);

        let bridge = GamepadBridge::create(settings, transport)?;

        tokio::spawn(async move {
            match bridge.initialize() {
                Ok(mut collecting) => collecting.run_collection_loop(),
                Err(e) => error!("Failed to initialize gamepad bridge: {}", e),
            }
        });

        Ok(Self {})
    }
}

/// Map a dpad button to its pad claim.
fn map_dpad(button: Button) -> Option<PadInput> {
    match button {
        Button::DPadUp => Some(PadInput::Up),
        Button::DPadDown => Some(PadInput::Down),
        Button::DPadLeft => Some(PadInput::Left),
        Button::DPadRight => Some(PadInput::Right),
        _ => None,
    }
}

/// Map a face/system button to its wire name.
fn map_button(button: Button) -> Option<&'static str> {
    match button {
        Button::South => Some("A"),
        Button::East => Some("B"),
        Button::North => Some("X"),
        Button::West => Some("Y"),
        Button::Start => Some("START"),
        Button::Select => Some("BACK"),
        Button::LeftThumb => Some("L3"),
        Button::RightThumb => Some("R3"),
        Button::Mode => Some("GUIDE"),
        _ => None,
    }
}

/// Rescale an analog value to the range outside the deadzone.
fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadzone_suppresses_and_rescales() {
        assert_eq!(apply_deadzone(0.02, 0.05), 0.0);
        assert_eq!(apply_deadzone(-0.04, 0.05), 0.0);
        assert!((apply_deadzone(1.0, 0.05) - 1.0).abs() < 1e-6);
        assert!((apply_deadzone(-1.0, 0.05) + 1.0).abs() < 1e-6);
        // halfway through the live range maps to roughly half deflection
        let mid = apply_deadzone(0.525, 0.05);
        assert!((mid - 0.5).abs() < 1e-6);
    }

    #[test]
    fn dpad_buttons_map_to_pad_claims() {
        assert_eq!(map_dpad(Button::DPadUp), Some(PadInput::Up));
        assert_eq!(map_dpad(Button::DPadLeft), Some(PadInput::Left));
        assert_eq!(map_dpad(Button::South), None);
    }

    #[test]
    fn face_buttons_map_to_wire_names() {
        assert_eq!(map_button(Button::South), Some("A"));
        assert_eq!(map_button(Button::Select), Some("BACK"));
        assert_eq!(map_button(Button::DPadUp), None);
        assert_eq!(map_button(Button::C), None);
    }
}
