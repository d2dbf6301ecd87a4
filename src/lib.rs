//! padlink — use a handheld device as a game controller for a remote host.
//!
//! Local input (touch-surface claims, device tilt, or a bridged gamepad)
//! becomes a compact JSON input-state protocol delivered over a WebRTC
//! data channel. The session is negotiated through a WebSocket signaler:
//! hello → welcome → offer/answer → trickled candidates → open channel.
//!
//! # Subsystems
//!
//! ```text
//! claims / samples ──► input ──► StateMessage ──► session ──► host
//!                                                   ▲
//!                            signaler ──────────────┘
//! ```
//!
//! - [`input`] resolves overlapping presses and shapes tilt samples
//! - [`session`] owns signaling, negotiation, and the data channel
//! - [`protocol`] holds the wire types both ends agree on
//! - [`bridge`] replays a local gamepad through the same pipeline
//! - [`config`] / [`device`] carry settings and device identity

pub mod bridge;
pub mod config;
pub mod device;
pub mod input;
pub mod protocol;
pub mod session;

pub use config::Settings;
pub use session::{ConnectionState, SessionError, Transport, TransportEvent};
