//! Session subsystem: signaling, negotiation, and the data channel
//!
//! 1. [`negotiation`] - Pure state machine for one session attempt
//! 2. [`peer_session`] - Actor owning the socket, peer connection, and
//!    data channel; executes the machine's effects
//! 3. [`transport`] - The façade the UI layer talks to
//!
//! # Architecture
//!
//! ```text
//! Transport ──commands──► PeerSession actor ──events──► NegotiationMachine
//!     ▲                        │   ▲                         │
//!     └──TransportEvent────────┘   └───────effects───────────┘
//! ```
//!
//! Exactly one session is live per process; a `connect` while one is
//! live forces teardown of the previous session before starting over.

pub mod negotiation;
pub mod peer_session;
pub mod transport;

pub use negotiation::{ConnectionState, SessionError};
pub use peer_session::{PeerSessionHandle, SessionNotification};
pub use transport::{ShoulderSide, Transport, TransportEvent};
