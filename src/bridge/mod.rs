//! Reference client: bridge a local gamepad into the transport
//!
//! Lets the host side be exercised without a touchscreen device. The
//! collector polls a gamepad and replays its buttons, dpad, sticks, and
//! triggers through the same aggregator/transport pipeline the touch
//! surfaces use.

pub mod gamepad;

pub use gamepad::{BridgeError, BridgeSettings, GamepadBridgeHandle};
