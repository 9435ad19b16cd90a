//! Configuration types for brecho-model.
//!
//! These are the canonical types for the embedding model, the vision oracle
//! and the speech collaborator. `brecho-core` embeds them in its global
//! config rather than defining duplicates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model_locator::{extract_model_name, ModelLocator, EMBEDDINGS_SUBDIR};
use crate::DEFAULT_CLIP_MODEL_ID;

// ============================================================================
// DevicePreference
// ============================================================================

/// Preference for compute device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Auto-select best device (GPU if available, else CPU).
    #[default]
    Auto,
    /// Force GPU (Metal on macOS, CUDA on Linux).
    Gpu,
    /// Force CPU only.
    Cpu,
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gpu" | "metal" | "cuda" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            _ => Err(format!(
                "Unknown device: '{}'. Use 'auto', 'gpu', or 'cpu'.",
                s
            )),
        }
    }
}

// ============================================================================
// EmbeddingProviderKind
// ============================================================================

/// Image embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// CLIP vision tower through Candle.
    #[default]
    Clip,
    /// Joint RGB color histogram. Needs no model files.
    Histogram,
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clip => write!(f, "clip"),
            Self::Histogram => write!(f, "histogram"),
        }
    }
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clip" | "candle" | "embedded" => Ok(Self::Clip),
            "histogram" | "color" => Ok(Self::Histogram),
            _ => Err(format!(
                "Unknown provider: '{}'. Use 'clip' or 'histogram'.",
                s
            )),
        }
    }
}

// ============================================================================
// ModelInfo
// ============================================================================

/// Information about a loaded image model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Model identifier.
    pub model_id: String,
    /// Embedding dimension.
    pub dimension: usize,
    /// Square input resolution the model resizes views to.
    pub input_size: u32,
}

impl ModelInfo {
    pub fn new(model_id: impl Into<String>, dimension: usize, input_size: u32) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            input_size,
        }
    }
}

// ============================================================================
// EmbeddingConfig
// ============================================================================

/// Configuration for the image embedding model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Provider type.
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    /// Model ID (e.g., "openai/clip-vit-base-patch32").
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Device preference.
    #[serde(default)]
    pub device: DevicePreference,

    /// Local path to model files. If None, the model locator decides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

fn default_model_id() -> String {
    DEFAULT_CLIP_MODEL_ID.to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model_id: default_model_id(),
            device: DevicePreference::default(),
            local_path: None,
        }
    }
}

impl EmbeddingConfig {
    /// Resolve the effective model path.
    ///
    /// Priority:
    /// 1. Explicit `local_path` if set
    /// 2. ModelLocator search order ($BRECHO_MODELS_DIR → ~/.brecho/models → {exe}/models)
    ///
    /// Returns the path even if it doesn't exist (caller should validate).
    pub fn effective_model_path(&self) -> PathBuf {
        if let Some(ref path) = self.local_path {
            return path.clone();
        }

        match ModelLocator::new().embedding_model_path(&self.model_id) {
            Ok(path) => path,
            Err(_) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".brecho")
                .join("models")
                .join(EMBEDDINGS_SUBDIR)
                .join(extract_model_name(&self.model_id)),
        }
    }

    pub fn with_provider(mut self, provider: EmbeddingProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }
}

// ============================================================================
// OracleConfig
// ============================================================================

/// Connection settings for the vision/text inference oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleConfig {
    /// Base URL of the Ollama-compatible server.
    #[serde(default = "default_oracle_url")]
    pub base_url: String,

    /// Model name sent with every request.
    #[serde(default = "default_oracle_model")]
    pub model: String,

    /// Sampling temperature for the multimodal intake call.
    #[serde(default = "default_multimodal_temperature")]
    pub multimodal_temperature: f32,

    /// Sampling temperature for text-only calls (fallback, price).
    #[serde(default = "default_text_temperature")]
    pub text_temperature: f32,

    /// Language the oracle is asked to answer in.
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_oracle_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_oracle_model() -> String {
    "gemma3:4b".to_string()
}

fn default_multimodal_temperature() -> f32 {
    0.3
}

fn default_text_temperature() -> f32 {
    0.2
}

fn default_language() -> String {
    "Brazilian Portuguese".to_string()
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_oracle_url(),
            model: default_oracle_model(),
            multimodal_temperature: default_multimodal_temperature(),
            text_temperature: default_text_temperature(),
            language: default_language(),
        }
    }
}

// ============================================================================
// SpeechConfig
// ============================================================================

/// Settings for the optional speech-to-text collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    /// Whether audio clips are transcribed at all.
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of an OpenAI-compatible transcription server.
    #[serde(default = "default_speech_url")]
    pub url: String,

    /// Transcription model name.
    #[serde(default = "default_speech_model")]
    pub model: String,

    /// ISO 639-1 language hint.
    #[serde(default = "default_speech_language")]
    pub language: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_speech_timeout")]
    pub timeout_secs: u64,
}

fn default_speech_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_speech_model() -> String {
    "whisper-1".to_string()
}

fn default_speech_language() -> String {
    "pt".to_string()
}

fn default_speech_timeout() -> u64 {
    120
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_speech_url(),
            model: default_speech_model(),
            language: default_speech_language(),
            timeout_secs: default_speech_timeout(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_preference_parse() {
        assert_eq!("cuda".parse::<DevicePreference>(), Ok(DevicePreference::Gpu));
        assert_eq!("CPU".parse::<DevicePreference>(), Ok(DevicePreference::Cpu));
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(
            "histogram".parse::<EmbeddingProviderKind>(),
            Ok(EmbeddingProviderKind::Histogram)
        );
        assert_eq!(
            "candle".parse::<EmbeddingProviderKind>(),
            Ok(EmbeddingProviderKind::Clip)
        );
    }

    #[test]
    fn test_oracle_defaults_from_empty_yaml_object() {
        let cfg: OracleConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, OracleConfig::default());
        assert_eq!(cfg.model, "gemma3:4b");
        assert!((cfg.multimodal_temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_explicit_local_path_wins() {
        let cfg = EmbeddingConfig::default().with_local_path("/opt/clip");
        assert_eq!(cfg.effective_model_path(), PathBuf::from("/opt/clip"));
    }
}
