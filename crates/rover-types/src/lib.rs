use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Lower bound of the head servo travel in degrees.
pub const HEAD_MIN_DEG: f32 = 0.0;
/// Upper bound of the head servo travel in degrees.
pub const HEAD_MAX_DEG: f32 = 180.0;
/// Neutral "looking ahead" head position.
pub const HEAD_CENTER_DEG: f32 = 90.0;

/// Clamp a head angle to the physical servo range `[0, 180]` degrees.
///
/// Out-of-range inputs are clamped to the nearest bound, never rejected,
/// so a slightly over-enthusiastic model answer still produces a safe
/// hardware command.  Non-finite inputs settle at the center position.
pub fn clamp_angle(degrees: f32) -> f32 {
    if !degrees.is_finite() {
        return HEAD_CENTER_DEG;
    }
    degrees.clamp(HEAD_MIN_DEG, HEAD_MAX_DEG)
}

/// Clamp a signed track velocity to `[-1, 1]`.
///
/// The sign carries the direction (positive = forward); the magnitude is the
/// speed fraction.  Non-finite inputs become an electrical stop.
pub fn clamp_velocity(velocity: f32) -> f32 {
    if !velocity.is_finite() {
        return 0.0;
    }
    velocity.clamp(-1.0, 1.0)
}

/// Rotation direction of one drive track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

/// One track's command: an unsigned speed fraction plus a direction bit.
///
/// Invariant: `speed == 0` means the channel is electrically stopped
/// regardless of the direction bit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackCommand {
    pub direction: Direction,
    /// Speed fraction in `[0, 1]`.
    pub speed: f32,
}

impl TrackCommand {
    /// The explicit stop command.
    pub fn stop() -> Self {
        Self {
            direction: Direction::Forward,
            speed: 0.0,
        }
    }

    /// Build a command from a signed velocity in `[-1, 1]`.
    pub fn from_velocity(velocity: f32) -> Self {
        let v = clamp_velocity(velocity);
        Self {
            direction: if v < 0.0 {
                Direction::Backward
            } else {
                Direction::Forward
            },
            speed: v.abs(),
        }
    }

    /// The signed velocity equivalent of this command.
    pub fn velocity(&self) -> f32 {
        match self.direction {
            Direction::Forward => self.speed,
            Direction::Backward => -self.speed,
        }
    }

    /// `true` if this command leaves the channel electrically stopped.
    pub fn is_stop(&self) -> bool {
        self.speed == 0.0
    }
}

/// One single-channel trajectory, consumed by the motion coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionRequest {
    /// Stable actuator channel identifier, e.g. `"head"` or `"left_track"`.
    pub channel_id: String,
    /// Starting value (degrees for servos, signed velocity for tracks).
    pub from: f32,
    /// Target value in the same unit as `from`.
    pub to: f32,
    /// Total trajectory time.  Zero completes in a single write.
    pub duration: Duration,
    /// Number of interpolation steps; values below 1 are raised to 1.
    pub steps: u32,
}

impl MotionRequest {
    pub fn new(
        channel_id: impl Into<String>,
        from: f32,
        to: f32,
        duration: Duration,
        steps: u32,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            from,
            to,
            duration,
            steps: steps.max(1),
        }
    }
}

/// Canonical movement block of a model answer.
///
/// The normalization layer folds every historical response shape
/// (`movement.head` as a bare number, `movement.tracks.left_track`,
/// direction-bit objects, ...) into this one struct so the coordinator and
/// the control loop never see raw heterogeneous JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    /// Requested head angle in degrees; clamped to `[0, 180]` on dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_angle: Option<f32>,
    /// Signed left track velocity in `[-1, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_track: Option<f32>,
    /// Signed right track velocity in `[-1, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_track: Option<f32>,
    /// How long the tracks hold their speed before ramping to a stop, in
    /// seconds.  A configured default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f32>,
}

impl Movement {
    /// `true` when the block requests no actuator motion at all.
    pub fn is_empty(&self) -> bool {
        self.head_angle.is_none()
            && self.left_track.unwrap_or(0.0) == 0.0
            && self.right_track.unwrap_or(0.0) == 0.0
    }
}

/// Canonical parsed model answer, produced once per inference round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feelings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech: Option<String>,
    #[serde(default)]
    pub movement: Movement,
}

/// Recoverable per-iteration failures of the inference path.
///
/// None of these terminate the queue worker or the control loop; they
/// resolve the submitting future and the loop skips one iteration.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// The caller-specified deadline elapsed before a response arrived.
    #[error("inference request timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint answered with a non-success status (0 = transport error).
    #[error("inference endpoint returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    /// The streamed response exceeded the configured byte ceiling.
    #[error("inference response exceeded {limit} bytes")]
    TooLarge { limit: usize },

    /// The accumulated text was not valid JSON even after cleanup.
    #[error("model returned invalid JSON: {raw}")]
    InvalidJson { raw: String },

    /// The queue worker was stopped while this request was in flight.
    #[error("inference request cancelled")]
    Cancelled,
}

/// Global error type spanning hardware faults, inference failures, speech
/// synthesis and configuration problems.
///
/// Only [`RoverError::HardwareWrite`] and [`RoverError::Config`] are fatal;
/// everything else is caught at the control-loop boundary and converted to a
/// skipped iteration plus a log entry.
#[derive(Error, Debug)]
pub enum RoverError {
    /// An actuator write failed.  Fatal: commanding hardware blind is unsafe.
    #[error("hardware write failed on {channel}: {details}")]
    HardwareWrite { channel: String, details: String },

    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// A motion request violated the coordinator's contract (unknown channel,
    /// or a track commanded without its partner).  Recoverable: the offending
    /// dispatch is skipped.
    #[error("invalid motion request: {0}")]
    InvalidMotion(String),

    /// Speech synthesis failed.  Logged, never escalated.
    #[error("speech synthesis failed: {0}")]
    Speech(String),

    /// Invalid configuration detected at startup.  Fatal.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RoverError {
    /// `true` if the control loop must halt on this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RoverError::HardwareWrite { .. } | RoverError::Config(_)
        )
    }
}
