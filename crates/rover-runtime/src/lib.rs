//! The perception-action loop tying camera, inference and actuation together.

pub mod control_loop;

pub use control_loop::{ControlLoop, ControlLoopConfig};
