//! In-process simulation drivers for headless tests and CI.
//!
//! Each sim driver records every command it receives behind a shared,
//! cloneable log handle, so tests can drive the full stack and assert on the
//! exact write sequence without any physical hardware.

use std::sync::{Arc, Mutex, PoisonError};

use rover_types::{RoverError, TrackCommand};
use tracing::trace;

use crate::camera::{Camera, CameraFrame};
use crate::servo::ServoChannel;
use crate::track::TrackChannel;

/// Shared log of every angle written to a [`SimServo`].
pub type ServoLog = Arc<Mutex<Vec<f32>>>;

/// Shared log of every command written to a [`SimTrack`].
pub type TrackLog = Arc<Mutex<Vec<TrackCommand>>>;

fn push<T>(log: &Arc<Mutex<Vec<T>>>, value: T) {
    log.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(value);
}

/// A simulated head servo that records commanded angles.  Always succeeds.
pub struct SimServo {
    id: String,
    log: ServoLog,
}

impl SimServo {
    /// Create a sim servo and a handle to its write log.
    pub fn new(id: impl Into<String>) -> (Box<Self>, ServoLog) {
        let log: ServoLog = Arc::default();
        (
            Box::new(Self {
                id: id.into(),
                log: Arc::clone(&log),
            }),
            log,
        )
    }
}

impl ServoChannel for SimServo {
    fn id(&self) -> &str {
        &self.id
    }

    fn write_angle(&mut self, degrees: f32) -> Result<(), RoverError> {
        trace!(channel = %self.id, degrees, "sim servo write");
        push(&self.log, degrees);
        Ok(())
    }
}

/// A simulated drive track that records commands.  Always succeeds.
pub struct SimTrack {
    id: String,
    log: TrackLog,
}

impl SimTrack {
    /// Create a sim track and a handle to its write log.
    pub fn new(id: impl Into<String>) -> (Box<Self>, TrackLog) {
        let log: TrackLog = Arc::default();
        (
            Box::new(Self {
                id: id.into(),
                log: Arc::clone(&log),
            }),
            log,
        )
    }
}

impl TrackChannel for SimTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn write_track(&mut self, command: TrackCommand) -> Result<(), RoverError> {
        trace!(channel = %self.id, speed = command.speed, "sim track write");
        push(&self.log, command);
        Ok(())
    }
}

/// A simulated track that fails every write.  Used to test failure isolation
/// in fan-out motion dispatch.
pub struct FaultyTrack {
    id: String,
}

impl FaultyTrack {
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self { id: id.into() })
    }
}

impl TrackChannel for FaultyTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn write_track(&mut self, _command: TrackCommand) -> Result<(), RoverError> {
        Err(RoverError::HardwareWrite {
            channel: self.id.clone(),
            details: "simulated driver fault".into(),
        })
    }
}

/// A simulated camera returning a fixed tiny frame.  Always succeeds.
pub struct SimCamera {
    id: String,
}

impl SimCamera {
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self { id: id.into() })
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, RoverError> {
        Ok(CameraFrame {
            width: 4,
            height: 4,
            data: vec![0u8; 16],
        })
    }
}

/// A simulated camera that fails on capture, for fatal-path tests.
pub struct BrokenCamera;

impl Camera for BrokenCamera {
    fn id(&self) -> &str {
        "broken"
    }

    fn capture(&mut self) -> Result<CameraFrame, RoverError> {
        Err(RoverError::HardwareWrite {
            channel: "broken".into(),
            details: "simulated capture failure".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::Direction;

    #[test]
    fn sim_servo_logs_writes_in_order() {
        let (mut servo, log) = SimServo::new("head");
        servo.write_angle(10.0).unwrap();
        servo.write_angle(20.0).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![10.0, 20.0]);
    }

    #[test]
    fn sim_track_logs_commands() {
        let (mut track, log) = SimTrack::new("left_track");
        track
            .write_track(TrackCommand {
                direction: Direction::Forward,
                speed: 0.5,
            })
            .unwrap();
        track.write_track(TrackCommand::stop()).unwrap();
        let writes = log.lock().unwrap();
        assert_eq!(writes.len(), 2);
        assert!(writes[1].is_stop());
    }

    #[test]
    fn faulty_track_always_fails() {
        let mut track = FaultyTrack::new("left_track");
        let err = track.write_track(TrackCommand::stop()).unwrap_err();
        assert!(matches!(err, RoverError::HardwareWrite { .. }));
    }

    #[test]
    fn sim_camera_returns_blank_frame() {
        let mut cam = SimCamera::new("front_rgb");
        let frame = cam.capture().unwrap();
        assert_eq!(frame.width, 4);
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn broken_camera_fails_capture() {
        let mut cam = BrokenCamera;
        assert!(cam.capture().is_err());
    }
}
