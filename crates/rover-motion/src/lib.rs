//! Actuator motion coordination.
//!
//! [`MotionCoordinator`] drives several independent actuator channels through
//! smooth, time-bounded trajectories using cooperative scheduling, so a
//! multi-second head move and a multi-second track ramp proceed together
//! without one starving the other.

pub mod channel;
pub mod coordinator;
pub mod easing;

pub use channel::{ActuatorChannel, HeadChannel, TrackDrive};
pub use coordinator::{ChannelState, MotionCoordinator};
pub use easing::ease;
