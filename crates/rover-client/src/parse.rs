//! Model-output cleanup and normalization.
//!
//! Vision-language models wrap their JSON in markdown fences, append `//`
//! comments, and drift between response shapes from one fine-tune to the
//! next (`movement.head` as a bare number or `{angle}`, track commands as
//! signed velocities or direction-bit objects, a nested `movement.tracks`
//! block).  [`ResponseParser`] strips the noise and folds every known shape
//! into the one canonical [`InferenceResponse`], so downstream code never
//! touches raw heterogeneous JSON.

use rover_types::{InferenceError, InferenceResponse, Movement};
use serde_json::Value;

/// Signed velocity assigned to legacy direction-bit track commands, which
/// carry no speed of their own.  Matches the cautious default the original
/// chassis shipped with.
pub const LEGACY_TRACK_SPEED: f32 = 0.07;

/// Strip a `//` line comment, ignoring slashes inside JSON strings.
fn strip_line_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'/' if !in_string && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Remove markdown code fences and trailing line comments from raw model
/// output, leaving (hopefully) plain JSON.
pub fn clean_model_output(raw: &str) -> String {
    raw.replace("```json", "")
        .replace("```", "")
        .lines()
        .map(strip_line_comment)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(k))
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

fn as_f32(value: &Value) -> Option<f32> {
    value.as_f64().map(|v| v as f32)
}

/// Normalizes cleaned model JSON into the canonical response shape.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    /// Velocity magnitude for direction-only legacy track commands.
    legacy_track_speed: f32,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self {
            legacy_track_speed: LEGACY_TRACK_SPEED,
        }
    }
}

impl ResponseParser {
    pub fn new(legacy_track_speed: f32) -> Self {
        Self { legacy_track_speed }
    }

    /// Clean `raw` and parse it into an [`InferenceResponse`].
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::InvalidJson`] when the text is not a JSON
    /// object even after cleanup.
    pub fn parse(&self, raw: &str) -> Result<InferenceResponse, InferenceError> {
        let cleaned = clean_model_output(raw);
        let value: Value =
            serde_json::from_str(&cleaned).map_err(|_| InferenceError::InvalidJson {
                raw: cleaned.clone(),
            })?;
        if !value.is_object() {
            return Err(InferenceError::InvalidJson { raw: cleaned });
        }
        Ok(self.normalize(&value))
    }

    fn normalize(&self, value: &Value) -> InferenceResponse {
        InferenceResponse {
            observation: first_string(value, &["observation", "observations"]),
            feelings: first_string(value, &["feelings"]),
            thoughts: first_string(value, &["thoughts"]),
            speech: first_string(value, &["speech"]),
            movement: value
                .get("movement")
                .map(|m| self.normalize_movement(m))
                .unwrap_or_default(),
        }
    }

    fn normalize_movement(&self, movement: &Value) -> Movement {
        // The nested `tracks` block predates flat track fields; flat fields
        // win when both are present.
        let tracks = movement.get("tracks");
        let pick = |key: &str| -> Option<&Value> {
            movement
                .get(key)
                .or_else(|| tracks.and_then(|t| t.get(key)))
        };

        Movement {
            head_angle: movement
                .get("head_angle")
                .and_then(as_f32)
                .or_else(|| movement.get("head").and_then(|h| self.head_angle(h))),
            left_track: pick("left_track").and_then(|v| self.track_velocity(v)),
            right_track: pick("right_track").and_then(|v| self.track_velocity(v)),
            duration: pick("duration").and_then(as_f32),
        }
    }

    fn head_angle(&self, head: &Value) -> Option<f32> {
        as_f32(head).or_else(|| head.get("angle").and_then(as_f32))
    }

    fn track_velocity(&self, track: &Value) -> Option<f32> {
        if let Some(v) = as_f32(track) {
            return Some(v);
        }
        // Legacy `{direction: 0|1}` object: 0 = forward, 1 = backward, at
        // the chassis default speed.  An explicit `speed` field overrides.
        let direction = track.get("direction").and_then(Value::as_i64)?;
        let speed = track
            .get("speed")
            .and_then(as_f32)
            .unwrap_or(self.legacy_track_speed);
        Some(if direction == 0 { speed } else { -speed })
    }
}
