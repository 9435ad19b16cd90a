//! Optional speech-to-text collaborator.
//!
//! A spoken description recorded during intake is turned into a text hint
//! for the oracle. Transcription is best effort: any failure means "no hint".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::SpeechConfig;
use crate::error::{ModelError, ModelResult};

/// Turns an audio clip into text.
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    /// Transcribe `audio`. `None` when nothing usable came back.
    async fn transcribe(&self, audio: &[u8]) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Client for an OpenAI-compatible `/v1/audio/transcriptions` endpoint.
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    language: String,
    timeout: Duration,
}

impl HttpTranscriber {
    pub fn new(config: &SpeechConfig) -> ModelResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ModelError::transport(&config.url, e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1/audio/transcriptions",
                config.url.trim_end_matches('/')
            ),
            model: config.model.clone(),
            language: config.language.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn request(&self, audio: &[u8]) -> ModelResult<String> {
        let file = Part::bytes(audio.to_vec())
            .file_name("clip.wav")
            .mime_str("audio/wav")
            .map_err(|e| ModelError::transport(&self.endpoint, e.to_string()))?;

        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ModelError::from_reqwest(&self.endpoint, self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::RemoteStatus {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::from_reqwest(&self.endpoint, self.timeout, e))?;
        Ok(parsed.text)
    }
}

#[async_trait]
impl SpeechTranscriber for HttpTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Option<String> {
        if audio.is_empty() {
            return None;
        }

        match self.request(audio).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    warn!("No text transcribed from audio");
                    None
                } else {
                    info!("Audio transcribed: {} characters", text.chars().count());
                    Some(text.to_string())
                }
            }
            Err(e) => {
                warn!("Transcription failed: {}", e);
                None
            }
        }
    }
}
