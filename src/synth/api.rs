use async_trait::async_trait;
use bytes::Bytes;
use std::error::Error;
use tracing::{debug, instrument, warn};

const LOG_TARGET: &str = "slidecast::synth::api";

/// Error types for the speech-synthesis service boundary.
#[derive(Debug)]
pub enum SynthesisError {
    Network(reqwest::Error),
    Service { status: u16, message: String },
    InvalidResponse(String),
}

impl std::fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SynthesisError::Network(e) => write!(f, "Network error: {}", e),
            SynthesisError::Service { status, message } => {
                write!(f, "Synthesis service error (status {}): {}", status, message)
            }
            SynthesisError::InvalidResponse(s) => write!(f, "Invalid synthesis response: {}", s),
        }
    }
}

impl Error for SynthesisError {}

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        SynthesisError::Network(e)
    }
}

/// Contract for turning narration text into raw speech audio bytes.
///
/// The engine treats the implementation as an opaque service call with
/// unspecified latency and a possible failure outcome.
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    async fn synthesize(&self, text: &str, voice_name: &str) -> Result<Bytes, SynthesisError>;
}

/// HTTP client for a speech-synthesis service returning raw PCM bytes.
pub struct HttpSynthesisClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSynthesisClient {
    pub fn new(endpoint: &str) -> Self {
        HttpSynthesisClient {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl SynthesisClient for HttpSynthesisClient {
    #[instrument(skip(self, text), fields(voice = %voice_name, text_len = text.len()))]
    async fn synthesize(&self, text: &str, voice_name: &str) -> Result<Bytes, SynthesisError> {
        debug!(target: LOG_TARGET, "Requesting narration synthesis from {}", self.endpoint);

        let body = serde_json::json!({
            "text": text,
            "voice": voice_name,
        });

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(target: LOG_TARGET, status = status.as_u16(), "Synthesis service returned an error status.");
            return Err(SynthesisError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let raw = response.bytes().await?;
        if raw.is_empty() {
            return Err(SynthesisError::InvalidResponse("empty audio payload".to_string()));
        }
        debug!(target: LOG_TARGET, bytes = raw.len(), "Received synthesized audio payload.");
        Ok(raw)
    }
}
