//! [`SpeechSink`] – fire-and-forget text-to-speech boundary.
//!
//! The control loop never awaits speech inline; it spawns `speak` and moves
//! on, so a slow or dead TTS server cannot stall actuation.  Audio playback
//! itself is an external collaborator; this client only submits the text.

use std::time::Duration;

use async_trait::async_trait;
use rover_types::RoverError;
use serde::Serialize;
use tracing::debug;

/// Anything that can voice a line of text.
#[async_trait]
pub trait SpeechSink: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), RoverError>;
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    language: &'a str,
    model: &'a str,
    speed: f32,
}

/// HTTP client for a local TTS server's `/inference` endpoint.
pub struct TtsClient {
    endpoint: String,
    language: String,
    voice: String,
    speed: f32,
    client: reqwest::Client,
}

impl TtsClient {
    /// # Errors
    ///
    /// Returns [`RoverError::Config`] if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        language: impl Into<String>,
        voice: impl Into<String>,
        speed: f32,
        request_timeout: Duration,
    ) -> Result<Self, RoverError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RoverError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            language: language.into(),
            voice: voice.into(),
            speed,
            client,
        })
    }
}

#[async_trait]
impl SpeechSink for TtsClient {
    async fn speak(&self, text: &str) -> Result<(), RoverError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let body = TtsRequest {
            text,
            language: &self.language,
            model: &self.voice,
            speed: self.speed,
        };
        let url = format!("{}/inference", self.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RoverError::Speech(format!("TTS request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RoverError::Speech(format!(
                "TTS server answered {status}"
            )));
        }
        // The audio body is consumed by the playback sidecar, not by us.
        debug!(bytes = response.content_length().unwrap_or(0), "speech submitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_constructs_without_panic() {
        let client = TtsClient::new(
            "http://localhost:8020",
            "en",
            "default",
            1.0,
            Duration::from_secs(10),
        );
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn blank_text_is_a_no_op() {
        let client = TtsClient::new(
            "http://localhost:1", // nothing listens here
            "en",
            "default",
            1.0,
            Duration::from_millis(50),
        )
        .unwrap();
        // No request is issued, so a dead endpoint does not matter.
        client.speak("   ").await.unwrap();
    }
}
