//! [`VisionBackend`] – the external inference endpoint boundary.
//!
//! [`OllamaBackend`] talks to an Ollama-style `/api/generate` endpoint that
//! answers with an incremental NDJSON stream of `{response, done}` chunks.
//! The backend accumulates chunks until the terminal `done` marker, honoring
//! a configurable total-bytes ceiling, and hands the raw accumulated text to
//! the response parser.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use rover_types::{InferenceError, RoverError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A vision-language inference endpoint.
///
/// Implementations perform exactly one blocking external call per
/// `generate` invocation and return the raw (uncleaned) model text.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn generate(&self, image_b64: &str, prompt: &str) -> Result<String, InferenceError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<&'a str>,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// Ingest one NDJSON line into the accumulated response.
///
/// Returns `Ok(true)` when the line carried the terminal `done` marker.
fn ingest_line(line: &str, accumulated: &mut String, limit: usize) -> Result<bool, InferenceError> {
    let chunk: GenerateChunk =
        serde_json::from_str(line).map_err(|_| InferenceError::InvalidJson {
            raw: line.to_string(),
        })?;
    accumulated.push_str(&chunk.response);
    if accumulated.len() > limit {
        return Err(InferenceError::TooLarge { limit });
    }
    Ok(chunk.done)
}

/// Incremental NDJSON assembly with a total-bytes ceiling.
///
/// The ceiling covers buffered-but-unparsed bytes as well as the accumulated
/// response, so a server streaming one giant line with no newline is cut off
/// at the ceiling instead of being buffered whole.
struct ChunkAssembler {
    line_buf: String,
    accumulated: String,
    limit: usize,
}

impl ChunkAssembler {
    fn new(limit: usize) -> Self {
        Self {
            line_buf: String::new(),
            accumulated: String::new(),
            limit,
        }
    }

    /// Feed one transport chunk.  Returns the full response text once the
    /// terminal `done` marker has been seen.
    fn push(&mut self, bytes: &[u8]) -> Result<Option<String>, InferenceError> {
        self.line_buf.push_str(&String::from_utf8_lossy(bytes));
        if self.line_buf.len() + self.accumulated.len() > self.limit {
            return Err(InferenceError::TooLarge { limit: self.limit });
        }
        while let Some(pos) = self.line_buf.find('\n') {
            let line = self.line_buf[..pos].trim().to_string();
            self.line_buf.drain(..=pos);
            if line.is_empty() {
                continue;
            }
            if ingest_line(&line, &mut self.accumulated, self.limit)? {
                return Ok(Some(std::mem::take(&mut self.accumulated)));
            }
        }
        Ok(None)
    }

    /// Drain any trailing line after the stream ended without a done marker
    /// and return what accumulated; the parser decides whether it is usable.
    fn finish(mut self) -> Result<String, InferenceError> {
        let trailing = self.line_buf.trim().to_string();
        if !trailing.is_empty() {
            ingest_line(&trailing, &mut self.accumulated, self.limit)?;
        }
        Ok(self.accumulated)
    }
}

/// HTTP client for an Ollama-compatible streaming generate endpoint.
///
/// Construct once and reuse across control-loop iterations.
pub struct OllamaBackend {
    endpoint: String,
    model: String,
    request_timeout: Duration,
    max_response_bytes: usize,
    client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a backend pointing at `endpoint` (e.g.
    /// `"http://localhost:11434/api/generate"`).
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::Config`] if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        request_timeout: Duration,
        max_response_bytes: usize,
    ) -> Result<Self, RoverError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RoverError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            model: model.into(),
            request_timeout,
            max_response_bytes,
            client,
        })
    }

    fn map_transport(&self, err: reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout(self.request_timeout)
        } else {
            InferenceError::BadStatus {
                status: 0,
                body: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl VisionBackend for OllamaBackend {
    async fn generate(&self, image_b64: &str, prompt: &str) -> Result<String, InferenceError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            images: vec![image_b64],
            stream: true,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let mut stream = response.bytes_stream();
        let mut assembler = ChunkAssembler::new(self.max_response_bytes);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_transport(e))?;
            if let Some(text) = assembler.push(&chunk)? {
                debug!(bytes = text.len(), "inference stream complete");
                return Ok(text);
            }
        }
        assembler.finish()
    }
}
