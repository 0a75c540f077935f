//! Inference, history and speech clients for the rover.
//!
//! The centerpiece is [`InferenceQueue`]: an unbounded FIFO with one
//! background worker that serializes access to a slow vision-language
//! endpoint (single-flight), so the control loop can keep driving actuators
//! while a request is in flight.

pub mod backend;
pub mod history;
pub mod parse;
pub mod prompt;
pub mod queue;
pub mod speech;

pub use backend::{OllamaBackend, VisionBackend};
pub use history::{ChatEntry, ChatHistory, ChatOutcome};
pub use parse::ResponseParser;
pub use prompt::PromptBuilder;
pub use queue::{InferenceQueue, PendingInference};
pub use speech::{SpeechSink, TtsClient};
