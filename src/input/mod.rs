//! Input pipeline turning local control events into state messages
//!
//! 1. [`aggregator`] - Merges overlapping press sources into one
//!    authoritative pad / stick value
//! 2. [`sensors`] - Raw motion and orientation sample types
//! 3. [`tilt`] - Calibrated, smoothed, deadzoned tilt vector
//!
//! # Architecture
//!
//! ```text
//! Touch / gamepad claims ──► Aggregator ──► StateMessage ──► Transport
//! Motion samples ──────────► TiltTracker ─► StateMessage ──► Transport
//! ```
//!
//! The aggregator is synchronous and allocation-light; the tilt pipeline
//! runs as its own task because samples arrive on sensor cadence and leave
//! on a rate-limited schedule.

pub mod aggregator;
pub mod sensors;
pub mod tilt;

pub use aggregator::{Cardinal, InputAggregator, PadInput, UsageCounters};
pub use sensors::{ScreenRotation, SensorError, TiltSample};
pub use tilt::{StickSide, TiltConfig, TiltProcessor, TiltTracker};
