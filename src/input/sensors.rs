//! Raw sample types delivered by platform sensor sources.
//!
//! The platform adapter (outside this crate's scope) owns the actual
//! sensor subscription and any user-gesture-gated permission request; it
//! pushes samples into the tilt pipeline's channel. A denied permission
//! simply means no samples ever arrive — tilt stays inactive and nothing
//! crashes.

use thiserror::Error;

/// One raw sample from a sensor source.
///
/// Motion samples (acceleration including gravity) are the primary source;
/// orientation angles are the fallback for platforms without them. Once
/// any motion sample has been seen, orientation samples are ignored for
/// the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TiltSample {
    /// Acceleration including gravity in device coordinates. Magnitude is
    /// irrelevant; the vector is normalized on ingest.
    Motion { x: f64, y: f64, z: f64 },
    /// Orientation angles in degrees: `beta` front-back, `gamma`
    /// left-right.
    Orientation { beta: f64, gamma: f64 },
}

/// Physical screen rotation, quantized to the four canonical angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenRotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl ScreenRotation {
    /// Quantize a reported angle. Anything that is not exactly one of the
    /// canonical rotations falls back to 0°.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => ScreenRotation::Deg90,
            180 => ScreenRotation::Deg180,
            270 => ScreenRotation::Deg270,
            _ => ScreenRotation::Deg0,
        }
    }
}

/// Errors a platform sensor adapter can report when asked to start
/// delivering samples.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The user (or platform policy) denied the sensor permission.
    #[error("Sensor permission denied: {0}")]
    PermissionDenied(String),

    /// No usable sensor source exists on this device.
    #[error("Sensor source unavailable: {0}")]
    Unavailable(String),
}
