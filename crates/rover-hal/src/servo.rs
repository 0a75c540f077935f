//! `ServoChannel` trait for angle-positioned hardware (the head servo).

use rover_types::RoverError;

/// A position-controlled servo output.
///
/// Writes are assumed synchronous and fast; any blocking bus traffic belongs
/// inside the driver, behind this trait.
pub trait ServoChannel: Send {
    /// Stable identifier for this channel, e.g. `"head"`.
    fn id(&self) -> &str;

    /// Command the servo to `degrees`.  The caller is responsible for
    /// clamping to the physical range first.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareWrite`] if the command cannot be
    /// applied (e.g. the I2C bus is gone).
    fn write_angle(&mut self, degrees: f32) -> Result<(), RoverError>;
}
