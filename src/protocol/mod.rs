//! Wire types for the two protocols the controller speaks
//!
//! 1. [`signaling`] - JSON messages exchanged with the signaling server
//!    while negotiating the peer connection
//! 2. [`channel`] - JSON messages carried over the established data channel
//!
//! Both are pure data layers: no I/O, no async. Everything here derives
//! serde and crosses a wire as a single JSON text frame.

pub mod channel;
pub mod signaling;

pub use channel::{ChannelMessage, HostReply, PadDirection, StateMessage};
pub use signaling::SignalingMessage;
