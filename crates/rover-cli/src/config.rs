//! Operator configuration – reads/writes `~/.rover/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persisted operator configuration stored in `~/.rover/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Full URL of the Ollama generate endpoint.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Vision-language model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request inference deadline, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Ceiling on one accumulated model answer, in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    /// How many past interactions feed the next prompt.
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,

    /// Stop the loop after this many iterations; absent means run until
    /// Ctrl-C.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u64>,

    /// Track hold time when the model omits `movement.duration`, in seconds.
    #[serde(default = "default_move_secs")]
    pub default_move_secs: f32,

    /// Total time for one head trajectory, in seconds.
    #[serde(default = "default_head_move_secs")]
    pub head_move_secs: f32,

    /// Interpolation steps per head trajectory.
    #[serde(default = "default_head_steps")]
    pub head_steps: u32,

    /// Total time for one track ramp (up or down), in seconds.
    #[serde(default = "default_track_ramp_secs")]
    pub track_ramp_secs: f32,

    /// Interpolation steps per track ramp.
    #[serde(default = "default_track_steps")]
    pub track_steps: u32,

    /// Base URL of the local TTS server.
    #[serde(default = "default_tts_url")]
    pub tts_url: String,

    /// TTS language code.
    #[serde(default = "default_tts_language")]
    pub tts_language: String,

    /// TTS voice/model name.
    #[serde(default = "default_tts_voice")]
    pub tts_voice: String,

    /// TTS playback speed multiplier.
    #[serde(default = "default_tts_speed")]
    pub tts_speed: f32,

    /// Optional path to a custom persona/prompt template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<PathBuf>,
}

fn default_ollama_url() -> String {
    "http://localhost:11434/api/generate".to_string()
}
fn default_model() -> String {
    "llava:34b".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_max_response_bytes() -> usize {
    1024 * 1024
}
fn default_max_history_size() -> usize {
    2
}
fn default_move_secs() -> f32 {
    1.0
}
fn default_head_move_secs() -> f32 {
    1.0
}
fn default_head_steps() -> u32 {
    200
}
fn default_track_ramp_secs() -> f32 {
    0.5
}
fn default_track_steps() -> u32 {
    50
}
fn default_tts_url() -> String {
    "http://localhost:8020".to_string()
}
fn default_tts_language() -> String {
    "en".to_string()
}
fn default_tts_voice() -> String {
    "default".to_string()
}
fn default_tts_speed() -> f32 {
    1.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
            max_response_bytes: default_max_response_bytes(),
            max_history_size: default_max_history_size(),
            max_iterations: None,
            default_move_secs: default_move_secs(),
            head_move_secs: default_head_move_secs(),
            head_steps: default_head_steps(),
            track_ramp_secs: default_track_ramp_secs(),
            track_steps: default_track_steps(),
            tts_url: default_tts_url(),
            tts_language: default_tts_language(),
            tts_voice: default_tts_voice(),
            tts_speed: default_tts_speed(),
            prompt_template: None,
        }
    }
}

/// Return the path to `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover").join("config.toml")
}

/// Default location for the persisted chat history, next to the config.
pub fn history_path() -> PathBuf {
    config_path()
        .with_file_name("chat_history.json")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_OLLAMA_URL` | `ollama_url` |
/// | `ROVER_MODEL` | `model` |
/// | `ROVER_TTS_URL` | `tts_url` |
/// | `ROVER_TIMEOUT_SECS` | `request_timeout_secs` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROVER_OLLAMA_URL") {
        cfg.ollama_url = v;
    }
    if let Ok(v) = std::env::var("ROVER_MODEL") {
        cfg.model = v;
    }
    if let Ok(v) = std::env::var("ROVER_TTS_URL") {
        cfg.tts_url = v;
    }
    if let Ok(v) = std::env::var("ROVER_TIMEOUT_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.request_timeout_secs = secs;
    }
}

/// Save the config to disk, creating `~/.rover/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
