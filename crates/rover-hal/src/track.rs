//! `TrackChannel` trait for the two drive tracks.

use rover_types::{RoverError, TrackCommand};

/// One drive track (PWM motor driver channel pair).
///
/// A command with `speed == 0` must leave the channel electrically stopped
/// regardless of the direction bit; drivers may not interpret a zero-speed
/// write as "hold previous duty cycle".
pub trait TrackChannel: Send {
    /// Stable identifier, e.g. `"left_track"` or `"right_track"`.
    fn id(&self) -> &str;

    /// Apply `command` to the motor driver.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareWrite`] if the command cannot be
    /// applied.
    fn write_track(&mut self, command: TrackCommand) -> Result<(), RoverError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::Direction;

    struct MockTrack {
        id: String,
        last: Option<TrackCommand>,
    }

    impl TrackChannel for MockTrack {
        fn id(&self) -> &str {
            &self.id
        }

        fn write_track(&mut self, command: TrackCommand) -> Result<(), RoverError> {
            self.last = Some(command);
            Ok(())
        }
    }

    #[test]
    fn mock_track_records_command() {
        let mut track = MockTrack {
            id: "left_track".into(),
            last: None,
        };
        track
            .write_track(TrackCommand {
                direction: Direction::Backward,
                speed: 0.4,
            })
            .unwrap();
        let cmd = track.last.unwrap();
        assert_eq!(cmd.direction, Direction::Backward);
        assert!((cmd.speed - 0.4).abs() < f32::EPSILON);
    }
}
