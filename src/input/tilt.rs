//! Device-tilt to analog-stick pipeline.
//!
//! Raw gravity samples are noisy, arrive in device coordinates, and mean
//! different things depending on how the user holds the screen. This
//! module turns them into a calibrated 2-axis vector in `[-1, 1]`:
//!
//! ```text
//! sample ─► normalize ─► planar map ─► − baseline ─► scale by max angle
//!        ─► invert flags ─► radial deadzone ─► EMA ─► rate limit ─► send
//! ```
//!
//! [`TiltTracker`] is the pure per-sample pipeline; [`TiltProcessor`] owns
//! the task that feeds it from a sample channel and emits state messages
//! while the transport is connected.

use crate::input::sensors::{ScreenRotation, TiltSample};
use crate::protocol::{ChannelMessage, StateMessage};
use crate::session::transport::Transport;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which stick the tilt vector drives on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StickSide {
    Left,
    Right,
}

/// Tuning for one tilt session. Immutable once the session starts; a
/// restart picks up new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiltConfig {
    /// Stick the vector is reported as.
    pub axis: StickSide,
    /// Tilt angle (degrees) that maps to full deflection.
    pub max_deg: f64,
    /// Radial deadzone as a fraction of full deflection, in `[0, 1)`.
    pub deadzone: f64,
    /// EMA weight of the previous output, in `[0, 1)`. Zero disables
    /// smoothing entirely.
    pub smoothing: f64,
    /// Minimum time between emitted state messages.
    pub min_interval_ms: u64,
    pub invert_x: bool,
    pub invert_y: bool,
}

impl Default for TiltConfig {
    fn default() -> Self {
        Self {
            axis: StickSide::Right,
            max_deg: 28.0,
            deadzone: 0.07,
            smoothing: 0.3,
            min_interval_ms: 16,
            invert_x: false,
            invert_y: false,
        }
    }
}

/// Map a unit gravity vector into screen-planar coordinates for the
/// current rotation. Unknown rotations are quantized to 0° upstream.
pub fn planar_from_gravity(gx: f64, gy: f64, _gz: f64, rotation: ScreenRotation) -> (f64, f64) {
    match rotation {
        ScreenRotation::Deg0 => (gx, -gy),
        ScreenRotation::Deg90 => (-gy, -gx),
        ScreenRotation::Deg180 => (-gx, gy),
        ScreenRotation::Deg270 => (gy, gx),
    }
}

/// Derive a synthetic gravity vector from orientation angles (degrees).
pub fn synthesize_gravity(beta: f64, gamma: f64) -> (f64, f64, f64) {
    let x = gamma.to_radians().sin();
    let y = -beta.to_radians().sin();
    let z = (1.0 - x * x - y * y).max(0.0).sqrt();
    (x, y, z)
}

fn normalize(x: f64, y: f64) -> (f64, f64, f64) {
    let len = x.hypot(y);
    let divisor = if len == 0.0 { 1.0 } else { len };
    (x / divisor, y / divisor, len)
}

/// Suppress magnitudes below `deadzone` and rescale the rest so the
/// output still spans the full `[0, 1]` range beyond it.
pub fn radial_deadzone(x: f64, y: f64, deadzone: f64) -> (f64, f64) {
    let (nx, ny, len) = normalize(x, y);
    if len < deadzone {
        return (0.0, 0.0);
    }
    let scaled = (len - deadzone) / (1.0 - deadzone);
    (nx * scaled, ny * scaled)
}

/// One EMA step: weight `alpha` on the previous output.
pub fn ema(current: f64, previous: f64, alpha: f64) -> f64 {
    previous * alpha + current * (1.0 - alpha)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Pure per-sample tilt state. Owns the calibration baseline and the
/// smoothing accumulators; knows nothing about time or transports.
#[derive(Debug, Clone)]
pub struct TiltTracker {
    config: TiltConfig,
    last_gravity: Option<(f64, f64, f64)>,
    baseline: (f64, f64),
    ema_x: f64,
    ema_y: f64,
    motion_seen: bool,
}

impl TiltTracker {
    pub fn new(config: TiltConfig) -> Self {
        Self {
            config,
            last_gravity: None,
            baseline: (0.0, 0.0),
            ema_x: 0.0,
            ema_y: 0.0,
            motion_seen: false,
        }
    }

    /// Feed one sample and get the smoothed output vector.
    ///
    /// Returns `None` for orientation samples once a motion sample has
    /// been seen; motion is the better source and the two must not
    /// interleave.
    pub fn ingest(&mut self, sample: TiltSample, rotation: ScreenRotation) -> Option<(f64, f64)> {
        match sample {
            TiltSample::Motion { x, y, z } => {
                let len = (x * x + y * y + z * z).sqrt();
                let divisor = if len == 0.0 { 1.0 } else { len };
                self.last_gravity = Some((x / divisor, y / divisor, z / divisor));
                self.motion_seen = true;
            }
            TiltSample::Orientation { beta, gamma } => {
                if self.motion_seen {
                    return None;
                }
                self.last_gravity = Some(synthesize_gravity(beta, gamma));
            }
        }
        Some(self.advance(rotation))
    }

    /// Record the current raw planar vector as the neutral pose. No-op
    /// until the first sample has arrived.
    pub fn calibrate(&mut self, rotation: ScreenRotation) {
        let Some((gx, gy, gz)) = self.last_gravity else {
            debug!("Calibrate requested before any sample; ignoring");
            return;
        };
        self.baseline = planar_from_gravity(gx, gy, gz, rotation);
        info!(
            "Tilt baseline set to ({:.3}, {:.3})",
            self.baseline.0, self.baseline.1
        );
    }

    fn advance(&mut self, rotation: ScreenRotation) -> (f64, f64) {
        // ingest() always stores a gravity vector before calling here
        let (gx, gy, gz) = self.last_gravity.unwrap_or((0.0, 0.0, 1.0));
        let (px, py) = planar_from_gravity(gx, gy, gz, rotation);
        let dx = px - self.baseline.0;
        let dy = py - self.baseline.1;

        // Express displacement as a fraction of the configured maximum
        // tilt angle, direction and magnitude handled separately.
        let (nx, ny, len) = normalize(dx, dy);
        let full = self.config.max_deg.to_radians().sin().max(1e-6);
        let magnitude = (len / full).clamp(0.0, 1.0);
        let mut vx = nx * magnitude;
        let mut vy = ny * magnitude;

        if self.config.invert_x {
            vx = -vx;
        }
        if self.config.invert_y {
            vy = -vy;
        }

        let (zx, zy) = radial_deadzone(vx, vy, self.config.deadzone);
        self.ema_x = ema(zx, self.ema_x, self.config.smoothing);
        self.ema_y = ema(zy, self.ema_y, self.config.smoothing);
        (self.ema_x, self.ema_y)
    }
}

/// Emission throttle on a monotonic clock. The first sample always
/// passes.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval_ms: u64,
    last_emit: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            last_emit: None,
        }
    }

    pub fn should_emit(&mut self) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last).as_millis() < self.min_interval_ms as u128 {
                return false;
            }
        }
        self.last_emit = Some(now);
        true
    }
}

#[derive(Debug)]
enum TiltCommand {
    Calibrate,
}

struct TiltTask {
    cancel: CancellationToken,
    commands: mpsc::Sender<TiltCommand>,
}

/// Start/stop/calibrate façade over the tilt task.
///
/// `start` is a no-op while a session is running; `stop` is idempotent.
/// Tracker state never survives across sessions.
#[derive(Default)]
pub struct TiltProcessor {
    task: Option<TiltTask>,
}

impl TiltProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Spawn the tilt task reading `samples`, tracking `rotation`, and
    /// emitting state messages through `transport`.
    pub fn start(
        &mut self,
        config: TiltConfig,
        samples: mpsc::Receiver<TiltSample>,
        rotation: watch::Receiver<ScreenRotation>,
        transport: Transport,
    ) {
        if self.task.is_some() {
            debug!("Tilt already running; start ignored");
            return;
        }
        info!("Starting tilt pipeline: {:?}", config);

        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::channel(4);
        tokio::spawn(run_tilt_loop(
            config,
            samples,
            rotation,
            transport,
            command_rx,
            cancel.clone(),
        ));
        self.task = Some(TiltTask {
            cancel,
            commands: command_tx,
        });
    }

    /// Re-zero on the current pose. Ignored while not running.
    pub fn calibrate(&self) {
        if let Some(task) = &self.task {
            if task.commands.try_send(TiltCommand::Calibrate).is_err() {
                warn!("Tilt task not accepting commands");
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            info!("Stopping tilt pipeline");
            task.cancel.cancel();
        }
    }
}

async fn run_tilt_loop(
    config: TiltConfig,
    mut samples: mpsc::Receiver<TiltSample>,
    rotation: watch::Receiver<ScreenRotation>,
    transport: Transport,
    mut commands: mpsc::Receiver<TiltCommand>,
    cancel: CancellationToken,
) {
    let mut tracker = TiltTracker::new(config.clone());
    let mut limiter = RateLimiter::new(config.min_interval_ms);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => {
                match command {
                    Some(TiltCommand::Calibrate) => tracker.calibrate(*rotation.borrow()),
                    // handle dropped without stop(); shut down with it
                    None => break,
                }
            }
            sample = samples.recv() => {
                let Some(sample) = sample else {
                    info!("Tilt sample source ended");
                    break;
                };
                let Some((x, y)) = tracker.ingest(sample, *rotation.borrow()) else {
                    continue;
                };
                if !limiter.should_emit() {
                    continue;
                }
                if !transport.is_connected() {
                    continue;
                }
                let state = match config.axis {
                    StickSide::Right => StateMessage::right_axis(round3(x), round3(y)),
                    StickSide::Left => StateMessage::left_axis(round3(x), round3(y)),
                };
                transport.send(&ChannelMessage::State(state));
            }
        }
    }
    debug!("Tilt loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    fn unmap(px: f64, py: f64, rotation: ScreenRotation) -> (f64, f64) {
        match rotation {
            ScreenRotation::Deg0 => (px, -py),
            ScreenRotation::Deg90 => (-py, -px),
            ScreenRotation::Deg180 => (-px, py),
            ScreenRotation::Deg270 => (py, px),
        }
    }

    #[test]
    fn planar_mapping_round_trips_at_all_four_rotations() {
        let gravity = (0.31, -0.47, 0.82);
        for rotation in [
            ScreenRotation::Deg0,
            ScreenRotation::Deg90,
            ScreenRotation::Deg180,
            ScreenRotation::Deg270,
        ] {
            let (px, py) = planar_from_gravity(gravity.0, gravity.1, gravity.2, rotation);
            let (gx, gy) = unmap(px, py, rotation);
            assert_close(gx, gravity.0);
            assert_close(gy, gravity.1);
        }
    }

    #[test]
    fn deadzone_boundary_values() {
        let dz = 0.07;
        // exactly at the deadzone: zero output
        let (x, y) = radial_deadzone(dz, 0.0, dz);
        assert_close(x.hypot(y), 0.0);
        // full deflection: full output
        let (x, y) = radial_deadzone(1.0, 0.0, dz);
        assert_close(x.hypot(y), 1.0);
        // just inside: suppressed
        let (x, y) = radial_deadzone(dz - 1e-6, 0.0, dz);
        assert_close(x.hypot(y), 0.0);
    }

    #[test]
    fn deadzone_rescales_linearly_beyond_threshold() {
        let (x, _) = radial_deadzone(0.5, 0.0, 0.0);
        assert_close(x, 0.5);
        let (x, _) = radial_deadzone(0.55, 0.0, 0.1);
        assert_close(x, 0.5);
    }

    #[test]
    fn ema_weights_previous_by_alpha() {
        assert_close(ema(1.0, 0.0, 0.3), 0.7);
        assert_close(ema(0.0, 1.0, 0.3), 0.3);
        assert_close(ema(0.5, 0.5, 0.9), 0.5);
        // alpha zero passes the sample straight through
        assert_close(ema(0.42, 1.0, 0.0), 0.42);
    }

    #[test]
    fn synthetic_gravity_matches_flat_and_edge_poses() {
        let (x, y, z) = synthesize_gravity(0.0, 0.0);
        assert_close(x, 0.0);
        assert_close(y, 0.0);
        assert_close(z, 1.0);

        let (x, _, z) = synthesize_gravity(0.0, 90.0);
        assert_close(x, 1.0);
        assert_close(z, 0.0);

        let (_, y, _) = synthesize_gravity(90.0, 0.0);
        assert_close(y, -1.0);
    }

    #[test]
    fn motion_samples_shadow_orientation_for_the_session() {
        let mut tracker = TiltTracker::new(TiltConfig::default());
        let rot = ScreenRotation::Deg0;
        assert!(tracker
            .ingest(TiltSample::Orientation { beta: 5.0, gamma: 0.0 }, rot)
            .is_some());
        assert!(tracker
            .ingest(TiltSample::Motion { x: 0.0, y: 0.1, z: 9.8 }, rot)
            .is_some());
        // fallback source is dead from here on
        assert!(tracker
            .ingest(TiltSample::Orientation { beta: 45.0, gamma: 45.0 }, rot)
            .is_none());
        assert!(tracker
            .ingest(TiltSample::Motion { x: 0.0, y: 0.0, z: 9.8 }, rot)
            .is_some());
    }

    #[test]
    fn calibrate_before_first_sample_is_a_no_op() {
        let mut tracker = TiltTracker::new(TiltConfig::default());
        tracker.calibrate(ScreenRotation::Deg0);
        assert_eq!(tracker.baseline, (0.0, 0.0));
    }

    #[test]
    fn calibrate_zeroes_the_current_pose() {
        let config = TiltConfig {
            smoothing: 0.0,
            deadzone: 0.0,
            ..Default::default()
        };
        let mut tracker = TiltTracker::new(config);
        let rot = ScreenRotation::Deg0;
        let tilted = TiltSample::Motion { x: 0.2, y: -0.1, z: 0.97 };
        tracker.ingest(tilted, rot);
        tracker.calibrate(rot);
        let (x, y) = tracker.ingest(tilted, rot).unwrap();
        assert_close(x, 0.0);
        assert_close(y, 0.0);
    }

    #[test]
    fn full_tilt_at_max_angle_saturates_the_axis() {
        let config = TiltConfig {
            max_deg: 30.0,
            deadzone: 0.0,
            smoothing: 0.0,
            ..Default::default()
        };
        let mut tracker = TiltTracker::new(config);
        let angle = 30f64.to_radians();
        let sample = TiltSample::Motion {
            x: angle.sin(),
            y: 0.0,
            z: angle.cos(),
        };
        let (x, y) = tracker.ingest(sample, ScreenRotation::Deg0).unwrap();
        assert_close(x, 1.0);
        assert_close(y, 0.0);

        // past the maximum the magnitude clamps
        let steeper = TiltSample::Motion {
            x: 60f64.to_radians().sin(),
            y: 0.0,
            z: 60f64.to_radians().cos(),
        };
        let (x, _) = tracker.ingest(steeper, ScreenRotation::Deg0).unwrap();
        assert_close(x, 1.0);
    }

    #[test]
    fn inversion_flags_flip_their_axis() {
        let config = TiltConfig {
            max_deg: 30.0,
            deadzone: 0.0,
            smoothing: 0.0,
            invert_x: true,
            ..Default::default()
        };
        let mut tracker = TiltTracker::new(config);
        let angle = 30f64.to_radians();
        let sample = TiltSample::Motion {
            x: angle.sin(),
            y: 0.0,
            z: angle.cos(),
        };
        let (x, _) = tracker.ingest(sample, ScreenRotation::Deg0).unwrap();
        assert_close(x, -1.0);
    }

    #[test]
    fn rate_limiter_passes_first_then_throttles() {
        let mut throttled = RateLimiter::new(10_000);
        assert!(throttled.should_emit());
        assert!(!throttled.should_emit());

        let mut unthrottled = RateLimiter::new(0);
        assert!(unthrottled.should_emit());
        assert!(unthrottled.should_emit());
    }

    #[test]
    fn rounding_keeps_three_decimals() {
        assert_close(round3(0.123_456), 0.123);
        assert_close(round3(-0.999_9), -1.0);
        assert_close(round3(0.0005), 0.001);
    }
}
