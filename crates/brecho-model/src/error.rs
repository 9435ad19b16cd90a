//! Error types for brecho-model.
//!
//! Model discovery errors explain where weights are expected and how to fix
//! a missing installation. Oracle and speech errors stay short: the intake
//! pipeline logs them and moves to the next stage.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

/// Failures of the embedding models and the remote collaborators.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The bytes could not be decoded as an image.
    #[error("Failed to decode image: {message}")]
    ImageDecode { message: String },

    /// The image decoded to zero width or height.
    #[error("Image is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("{}", format_models_dir_not_found(.searched))]
    ModelsDirectoryNotFound { searched: Vec<PathBuf> },

    #[error("{}", format_model_not_found(.model_id, .path))]
    ModelNotFound { model_id: String, path: PathBuf },

    /// Weights found but unusable.
    #[error("Failed to load model '{model_id}': {message}")]
    ModelLoad { model_id: String, message: String },

    #[error("Embedding failed for model '{model_id}': {message}")]
    EmbeddingFailed { model_id: String, message: String },

    /// Selected provider is not compiled in or cannot run.
    #[error("Provider '{provider}' not available: {reason}")]
    ProviderNotAvailable { provider: String, reason: String },

    #[error("Compute device not available: {reason}\n\nSet embedding.device to 'cpu' in ~/.brecho/config.yaml to use CPU-only inference.")]
    DeviceNotAvailable { reason: String },

    /// The oracle or speech service could not be reached.
    #[error("Request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    /// The call did not finish within its deadline.
    #[error("Request to {endpoint} timed out after {}s", .after.as_secs())]
    Timeout { endpoint: String, after: Duration },

    /// The remote service answered with a non-success status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    RemoteStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_models_dir_not_found(searched: &[PathBuf]) -> String {
    let list = searched
        .iter()
        .enumerate()
        .map(|(i, p)| format!("  {}. {}", i + 1, p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Models directory not found.\n\n\
        Brecho searched these locations:\n\
        {list}\n\n\
        To fix:\n\
        1. Set $BRECHO_MODELS_DIR to your models directory, OR\n\
        2. Copy models to ~/.brecho/models/, OR\n\
        3. Set embedding.provider to 'histogram' to run without model files."
    )
}

fn format_model_not_found(model_id: &str, path: &std::path::Path) -> String {
    format!(
        "Model not found: {model_id}\n\n\
        Expected at: {}\n\n\
        The directory must contain model.safetensors with the CLIP weights.",
        path.display()
    )
}

impl ModelError {
    pub fn model_load(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    pub fn embedding_failed(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingFailed {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    pub fn image_decode(message: impl Into<String>) -> Self {
        Self::ImageDecode {
            message: message.into(),
        }
    }

    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Map a reqwest failure, keeping timeouts distinct.
    pub fn from_reqwest(endpoint: &str, after: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
                after,
            }
        } else {
            Self::transport(endpoint, err.to_string())
        }
    }

    /// Whether the error concerns the input image rather than the model.
    pub fn is_bad_image(&self) -> bool {
        matches!(self, Self::ImageDecode { .. } | Self::EmptyImage { .. })
    }

    /// Whether the error came from a remote collaborator.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::RemoteStatus { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ModelError::image_decode("bad header").is_bad_image());
        assert!(ModelError::EmptyImage {
            width: 0,
            height: 10
        }
        .is_bad_image());
        assert!(ModelError::transport("http://x", "refused").is_remote());
        assert!(!ModelError::model_load("clip", "boom").is_remote());
    }

    #[test]
    fn test_timeout_message() {
        let err = ModelError::Timeout {
            endpoint: "http://localhost:11434/api/generate".into(),
            after: Duration::from_secs(300),
        };
        assert!(err.to_string().contains("timed out after 300s"));
    }
}
