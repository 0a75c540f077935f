//! Prompt assembly: persona template plus rendered chat history.

use std::fs;
use std::path::Path;

use rover_types::RoverError;

use crate::history::ChatHistory;

/// Built-in persona and output contract, used when no template file is
/// configured.
pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"You are a small tracked rover with a camera mounted on a servo head.
You receive one camera frame per request. Look at the image, decide what to
do, and answer with a single JSON object and nothing else:

{
  "observation": "what you see in the image",
  "feelings": "how you feel about it",
  "thoughts": "your reasoning about what to do next",
  "speech": "a short sentence to say out loud, or empty",
  "movement": {
    "head_angle": 90,
    "left_track": 0.0,
    "right_track": 0.0,
    "duration": 1.0
  }
}

Rules:
- head_angle is in degrees, 0 to 180; 90 looks straight ahead.
- left_track and right_track are signed velocities from -1 to 1;
  positive is forward, negative is backward, 0 stops the track.
- duration is how many seconds to keep the tracks moving.
- Answer with plain JSON only. No markdown fences, no comments.
"#;

/// Builds the per-iteration prompt from a template and the chat history.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Load the template from a file, for operators who tune the persona
    /// without rebuilding.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Config`] if the file cannot be read.
    pub fn from_file(path: &Path) -> Result<Self, RoverError> {
        let template = fs::read_to_string(path).map_err(|e| {
            RoverError::Config(format!(
                "failed to read prompt template at {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self { template })
    }

    /// Assemble the full prompt: recent history first, then the persona.
    pub fn build(&self, history: &ChatHistory) -> String {
        format!(
            "# Your chat history is:\n{}\n# Your system prompt:\n{}",
            history.render(),
            self.template
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ChatOutcome;

    #[test]
    fn empty_history_still_builds() {
        let history = ChatHistory::new(2, "llava:34b");
        let prompt = PromptBuilder::default().build(&history);
        assert!(prompt.starts_with("# Your chat history is:\n[]"));
        assert!(prompt.contains("# Your system prompt:"));
        assert!(prompt.contains("head_angle"));
    }

    #[test]
    fn history_precedes_template() {
        let mut history = ChatHistory::new(2, "llava:34b");
        history.append(
            "frame 1",
            ChatOutcome::Error {
                error: "timed out".into(),
            },
        );
        let prompt = PromptBuilder::new("BE BRIEF").build(&history);
        let history_at = prompt.find("timed out").unwrap();
        let template_at = prompt.find("BE BRIEF").unwrap();
        assert!(history_at < template_at);
    }

    #[test]
    fn from_file_loads_custom_template() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("persona.txt");
        std::fs::write(&path, "You are a grumpy rover.").unwrap();
        let builder = PromptBuilder::from_file(&path).expect("load");
        let prompt = builder.build(&ChatHistory::new(1, "m"));
        assert!(prompt.contains("grumpy rover"));
    }

    #[test]
    fn from_file_missing_is_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = PromptBuilder::from_file(&dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, RoverError::Config(_)));
    }
}
