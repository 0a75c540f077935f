//! Hardware abstraction layer for the rover.
//!
//! Drivers implement the [`ServoChannel`], [`TrackChannel`] and [`Camera`]
//! traits; the motion coordinator and the control loop only ever talk to the
//! traits, so the physical I2C/CSI drivers can be swapped without touching
//! motion or inference logic.

pub mod camera;
pub mod servo;
pub mod sim;
pub mod track;

pub use camera::{Camera, CameraFrame};
pub use servo::ServoChannel;
pub use track::TrackChannel;
