//! Adapter layer for brecho-model infrastructure.
//!
//! Bridges the inference crate with brecho-core:
//!
//! - Error conversion from `ModelError` to `BrechoError`
//! - Construction of the process-wide model, oracle and speech handles

use std::sync::Arc;

use brecho_model::{
    create_image_embedding_model, EmbeddingConfig, HttpTranscriber, ImageEmbeddingModel,
    InferenceOracle, OllamaOracle, OracleConfig, SpeechConfig, SpeechTranscriber,
};

use crate::db_adapter::IntoBrechoResult;
use crate::errors::BrechoError;

// ============================================================================
// Error Conversion
// ============================================================================

/// Convert a brecho-model error to a brecho-core error.
pub fn from_model_error(err: brecho_model::ModelError) -> BrechoError {
    use brecho_model::ModelError;

    match err {
        ModelError::ImageDecode { message } => BrechoError::Extraction { message },

        ModelError::EmptyImage { width, height } => {
            BrechoError::extraction(format!("image is empty ({}x{})", width, height))
        }

        ModelError::ModelsDirectoryNotFound { .. } => {
            BrechoError::EmbeddingProviderUnavailable {
                provider: "model-locator".to_string(),
                reason: err.to_string(),
            }
        }

        ModelError::ModelNotFound { ref model_id, .. } => {
            BrechoError::EmbeddingProviderUnavailable {
                provider: model_id.clone(),
                reason: err.to_string(),
            }
        }

        ModelError::ModelLoad { model_id, message }
        | ModelError::EmbeddingFailed { model_id, message } => {
            BrechoError::EmbeddingProviderUnavailable {
                provider: model_id,
                reason: message,
            }
        }

        ModelError::ProviderNotAvailable { provider, reason } => {
            BrechoError::EmbeddingProviderUnavailable { provider, reason }
        }

        ModelError::DeviceNotAvailable { reason } => BrechoError::EmbeddingProviderUnavailable {
            provider: "device".to_string(),
            reason,
        },

        ModelError::Transport { .. } | ModelError::Timeout { .. } | ModelError::RemoteStatus { .. } => {
            BrechoError::Upstream {
                message: err.to_string(),
            }
        }

        ModelError::Io(io_err) => BrechoError::Io(io_err),

        ModelError::Json(json_err) => BrechoError::Json(json_err),
    }
}

impl<T> IntoBrechoResult<T> for brecho_model::ModelResult<T> {
    fn into_brecho_result(self) -> Result<T, BrechoError> {
        self.map_err(from_model_error)
    }
}

// ============================================================================
// Handle construction
// ============================================================================

/// Load the image embedding model once for the whole process.
pub fn create_embedding_model(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn ImageEmbeddingModel>, BrechoError> {
    let model = create_image_embedding_model(config).into_brecho_result()?;
    tracing::info!(
        "Image embedding model ready: {} (dim={})",
        model.model_id(),
        model.dimension()
    );
    Ok(Arc::from(model))
}

/// Create the oracle client.
pub fn create_oracle(config: &OracleConfig) -> Result<Arc<dyn InferenceOracle>, BrechoError> {
    let oracle = OllamaOracle::new(config).into_brecho_result()?;
    tracing::debug!("Oracle endpoint: {}", oracle.endpoint());
    Ok(Arc::new(oracle))
}

/// Create the speech collaborator, or `None` when it is disabled.
pub fn create_transcriber(
    config: &SpeechConfig,
) -> Result<Option<Arc<dyn SpeechTranscriber>>, BrechoError> {
    if !config.enabled {
        return Ok(None);
    }
    let transcriber = HttpTranscriber::new(config).into_brecho_result()?;
    Ok(Some(Arc::new(transcriber)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use brecho_model::{EmbeddingProviderKind, ModelError};
    use std::time::Duration;

    #[test]
    fn test_bad_images_become_extraction_errors() {
        let err = from_model_error(ModelError::image_decode("bad magic"));
        assert!(matches!(err, BrechoError::Extraction { .. }));

        let err = from_model_error(ModelError::EmptyImage {
            width: 0,
            height: 3,
        });
        assert!(err.to_string().contains("0x3"));
    }

    #[test]
    fn test_remote_errors_become_upstream() {
        let err = from_model_error(ModelError::Timeout {
            endpoint: "http://oracle".into(),
            after: Duration::from_secs(5),
        });
        assert_eq!(err.code(), "upstream_failed");
    }

    #[test]
    fn test_create_histogram_model() {
        let config = EmbeddingConfig::default().with_provider(EmbeddingProviderKind::Histogram);
        let model = create_embedding_model(&config).unwrap();
        assert_eq!(model.dimension(), 64);
    }

    #[test]
    fn test_disabled_speech_has_no_transcriber() {
        assert!(create_transcriber(&SpeechConfig::default())
            .unwrap()
            .is_none());
        let enabled = SpeechConfig {
            enabled: true,
            ..SpeechConfig::default()
        };
        assert!(create_transcriber(&enabled).unwrap().is_some());
    }
}
