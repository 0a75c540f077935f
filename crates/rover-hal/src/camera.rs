//! `Camera` trait and frame type for image-capture hardware.

use rover_types::RoverError;

/// An encoded image frame returned by a camera driver.
///
/// `data` holds a ready-to-ship payload (typically JPEG); the inference
/// client base64-encodes it without re-examining the pixels.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Encoded image bytes.
    pub data: Vec<u8>,
}

/// A camera or image-capture device.
pub trait Camera: Send {
    /// Stable identifier, e.g. `"front_rgb"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::HardwareWrite`] if the frame cannot be
    /// captured.  Capture failures are fatal to the control loop: a blind
    /// robot must not keep moving.
    fn capture(&mut self) -> Result<CameraFrame, RoverError>;
}
