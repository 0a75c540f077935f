//! [`ChatHistory`] – bounded sliding window of interaction snapshots.
//!
//! A derived, trimmed copy of each request/response pair, used to build the
//! next prompt.  This is not a full audit log; a file-per-interaction log,
//! if wanted, belongs to an external collaborator.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use rover_types::{InferenceResponse, RoverError};
use serde::{Deserialize, Serialize};

/// Outcome half of one history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatOutcome {
    Response { response: InferenceResponse },
    Error { error: String },
}

/// Timestamped snapshot of one request/response (or error) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub timestamp: DateTime<Utc>,
    /// Short summary of the request (not the full multi-kilobyte prompt).
    pub request: String,
    #[serde(flatten)]
    pub outcome: ChatOutcome,
}

/// On-disk shape of a persisted history window.
#[derive(Serialize, Deserialize)]
struct HistoryFile {
    entries: Vec<ChatEntry>,
    saved_at: DateTime<Utc>,
    model: String,
}

/// Bounded, ordered log of the most recent interactions.
pub struct ChatHistory {
    entries: VecDeque<ChatEntry>,
    max_entries: usize,
    model: String,
}

impl ChatHistory {
    pub fn new(max_entries: usize, model: impl Into<String>) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries),
            max_entries,
            model: model.into(),
        }
    }

    /// Append one entry, evicting from the front (oldest first) until the
    /// window is back within `max_entries`.
    pub fn append(&mut self, request_summary: impl Into<String>, outcome: ChatOutcome) {
        self.entries.push_back(ChatEntry {
            timestamp: Utc::now(),
            request: request_summary.into(),
            outcome,
        });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ChatEntry> {
        self.entries.iter()
    }

    /// Serialize the current window for inclusion in the next prompt.
    ///
    /// Deterministic for identical contents: entries render in insertion
    /// order, so prompts are reproducible in tests.
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(&self.entries).unwrap_or_else(|_| "[]".to_string())
    }

    /// Persist the window as `{entries, saved_at, model}` JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Config`] on I/O or serialization failure; the
    /// control loop treats persistence failures as log-only.
    pub fn save(&self, path: &Path) -> Result<(), RoverError> {
        let file = HistoryFile {
            entries: self.entries.iter().cloned().collect(),
            saved_at: Utc::now(),
            model: self.model.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| RoverError::Config(format!("failed to serialize history: {e}")))?;
        fs::write(path, json).map_err(|e| {
            RoverError::Config(format!("failed to write history at {}: {e}", path.display()))
        })
    }

    /// Load a previously saved window, trimming to `max_entries`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Config`] if the file exists but cannot be read
    /// or parsed.  A missing file yields an empty history (fresh session).
    pub fn load(path: &Path, max_entries: usize) -> Result<Self, RoverError> {
        if !path.exists() {
            return Ok(Self::new(max_entries, String::new()));
        }
        let raw = fs::read_to_string(path).map_err(|e| {
            RoverError::Config(format!("failed to read history at {}: {e}", path.display()))
        })?;
        let file: HistoryFile = serde_json::from_str(&raw)
            .map_err(|e| RoverError::Config(format!("failed to parse history: {e}")))?;
        let mut history = Self::new(max_entries, file.model);
        for entry in file.entries {
            history.entries.push_back(entry);
            while history.entries.len() > max_entries {
                history.entries.pop_front();
            }
        }
        Ok(history)
    }
}
