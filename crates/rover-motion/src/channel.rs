//! Scalar actuator channel adapters.
//!
//! The coordinator interpolates plain scalars; these adapters map a scalar
//! setpoint onto the HAL's typed write calls.  A servo channel carries
//! degrees, a track channel carries a signed velocity in `[-1, 1]` whose
//! sign selects the direction bit and whose zero is an explicit electrical
//! stop.

use rover_hal::{ServoChannel, TrackChannel};
use rover_types::{RoverError, TrackCommand, clamp_angle};

/// One independently controllable scalar output.
///
/// Owned exclusively by the coordinator while a trajectory is in progress;
/// nothing else writes to the underlying hardware.
pub trait ActuatorChannel: Send {
    /// Stable channel identifier.
    fn id(&self) -> &str;

    /// Write one interpolated setpoint.
    fn write(&mut self, value: f32) -> Result<(), RoverError>;

    /// Leave the channel in its safe settled state.
    ///
    /// For a track this is the mandatory explicit `speed = 0` command; a
    /// fractional leftover duty cycle on the motor driver risks uncontrolled
    /// creep.  For a servo, holding the last commanded angle is already safe.
    fn settle(&mut self) -> Result<(), RoverError>;
}

/// Adapter presenting a head servo as a degree-valued scalar channel.
pub struct HeadChannel {
    servo: Box<dyn ServoChannel>,
}

impl HeadChannel {
    pub fn new(servo: Box<dyn ServoChannel>) -> Self {
        Self { servo }
    }
}

impl ActuatorChannel for HeadChannel {
    fn id(&self) -> &str {
        self.servo.id()
    }

    fn write(&mut self, value: f32) -> Result<(), RoverError> {
        // Clamp at the last gate before hardware, whatever upstream did.
        self.servo.write_angle(clamp_angle(value))
    }

    fn settle(&mut self) -> Result<(), RoverError> {
        // A de-energized hold at the current angle is the safe state.
        Ok(())
    }
}

/// Adapter presenting a drive track as a velocity-valued scalar channel.
pub struct TrackDrive {
    track: Box<dyn TrackChannel>,
}

impl TrackDrive {
    pub fn new(track: Box<dyn TrackChannel>) -> Self {
        Self { track }
    }
}

impl ActuatorChannel for TrackDrive {
    fn id(&self) -> &str {
        self.track.id()
    }

    fn write(&mut self, value: f32) -> Result<(), RoverError> {
        self.track.write_track(TrackCommand::from_velocity(value))
    }

    fn settle(&mut self) -> Result<(), RoverError> {
        self.track.write_track(TrackCommand::stop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_hal::sim::{SimServo, SimTrack};
    use rover_types::Direction;

    #[test]
    fn head_channel_clamps_before_hardware() {
        let (servo, log) = SimServo::new("head");
        let mut head = HeadChannel::new(servo);
        head.write(250.0).unwrap();
        head.write(-10.0).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![180.0, 0.0]);
    }

    #[test]
    fn head_settle_writes_nothing() {
        let (servo, log) = SimServo::new("head");
        let mut head = HeadChannel::new(servo);
        head.settle().unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn track_drive_maps_sign_to_direction() {
        let (track, log) = SimTrack::new("left_track");
        let mut drive = TrackDrive::new(track);
        drive.write(0.5).unwrap();
        drive.write(-0.25).unwrap();
        let writes = log.lock().unwrap();
        assert_eq!(writes[0].direction, Direction::Forward);
        assert!((writes[0].speed - 0.5).abs() < f32::EPSILON);
        assert_eq!(writes[1].direction, Direction::Backward);
        assert!((writes[1].speed - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn track_settle_is_explicit_stop() {
        let (track, log) = SimTrack::new("left_track");
        let mut drive = TrackDrive::new(track);
        drive.write(0.9).unwrap();
        drive.settle().unwrap();
        let writes = log.lock().unwrap();
        assert!(writes.last().unwrap().is_stop());
    }
}
